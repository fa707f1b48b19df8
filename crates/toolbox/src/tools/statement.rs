//! Positional placeholder handling for tool statements.
//!
//! Statements are written with `$1..$n` placeholders that refer to the
//! declared parameters by position. Both MySQL and SQLite take `?` markers,
//! so each `$n` is rewritten to `?` and the bind list is built in order of
//! appearance; a parameter may be referenced more than once. Text inside
//! quoted literals, quoted identifiers and comments is left as written, so
//! `'costs $5'` stays a literal.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use super::models::{ParamType, ParameterConfig};
use crate::{database::SqlValue, Error, Result};

lazy_static! {
    // Literals and comments match first and are copied through unchanged
    static ref PLACEHOLDER: Regex = Regex::new(
        r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|`[^`]*`|--[^\n]*|/\*(?s:.*?)\*/|\$(\d+)"#
    )
    .expect("valid placeholder regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL with `?` markers
    pub sql: String,
    /// 1-based parameter position for each marker, in order
    pub positions: Vec<usize>,
}

impl Statement {
    pub fn parse(template: &str) -> Self {
        let mut positions = Vec::new();
        let sql = PLACEHOLDER
            .replace_all(template, |caps: &regex::Captures<'_>| match caps.get(1) {
                Some(digits) => {
                    // Digits only, so parsing can only fail on overflow
                    positions.push(digits.as_str().parse::<usize>().unwrap_or(usize::MAX));
                    "?".to_string()
                }
                None => caps[0].to_string(),
            })
            .into_owned();

        Self { sql, positions }
    }

    /// Highest placeholder index referenced
    pub fn max_position(&self) -> usize {
        self.positions.iter().copied().max().unwrap_or(0)
    }

    /// Build the ordered bind values from named arguments.
    ///
    /// Mismatches between declared parameters, placeholders and supplied
    /// arguments are reported here, at invocation time.
    pub fn bind(
        &self,
        parameters: &[ParameterConfig],
        args: &Map<String, JsonValue>,
    ) -> Result<Vec<SqlValue>> {
        if let Some(&bad) = self
            .positions
            .iter()
            .find(|&&p| p == 0 || p > parameters.len())
        {
            return Err(Error::Validation(format!(
                "Placeholder ${} has no matching parameter ({} declared)",
                bad,
                parameters.len()
            )));
        }

        if let Some(extra) = args
            .keys()
            .find(|name| !parameters.iter().any(|p| &p.name == *name))
        {
            return Err(Error::Validation(format!("Unexpected argument: {}", extra)));
        }

        let mut values = Vec::with_capacity(parameters.len());
        for param in parameters {
            let arg = args
                .get(&param.name)
                .ok_or_else(|| Error::Validation(format!("Missing argument: {}", param.name)))?;
            values.push(coerce(param, arg)?);
        }

        Ok(self
            .positions
            .iter()
            .map(|&p| values[p - 1].clone())
            .collect())
    }
}

/// Convert a JSON argument to the declared parameter type
pub fn coerce(param: &ParameterConfig, value: &JsonValue) -> Result<SqlValue> {
    let mismatch = || {
        Error::Validation(format!(
            "Argument {} expects {}, got {}",
            param.name,
            param.param_type().json_type(),
            value
        ))
    };

    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let bound = match param.param_type() {
        ParamType::String => match value {
            JsonValue::String(s) => SqlValue::Text(s.clone()),
            JsonValue::Number(_) | JsonValue::Bool(_) => SqlValue::Text(value.to_string()),
            _ => return Err(mismatch()),
        },
        ParamType::Integer => match value {
            JsonValue::Number(n) => SqlValue::Int(n.as_i64().ok_or_else(mismatch)?),
            JsonValue::String(s) => SqlValue::Int(s.trim().parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        ParamType::Float => match value {
            JsonValue::Number(n) => SqlValue::Float(n.as_f64().ok_or_else(mismatch)?),
            JsonValue::String(s) => SqlValue::Float(s.trim().parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        ParamType::Boolean => match value {
            JsonValue::Bool(b) => SqlValue::Bool(*b),
            JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => SqlValue::Bool(true),
                "false" | "0" => SqlValue::Bool(false),
                _ => return Err(mismatch()),
            },
            JsonValue::Number(n) => match n.as_i64() {
                Some(1) => SqlValue::Bool(true),
                Some(0) => SqlValue::Bool(false),
                _ => return Err(mismatch()),
            },
            _ => return Err(mismatch()),
        },
        ParamType::Object => match value {
            JsonValue::Object(_) => SqlValue::Text(value.to_string()),
            _ => return Err(mismatch()),
        },
        ParamType::Array => match value {
            JsonValue::Array(_) => SqlValue::Text(value.to_string()),
            _ => return Err(mismatch()),
        },
    };

    Ok(bound)
}
