//! Environment variable references in configuration values.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::{Error, Result};

lazy_static! {
    // ${VAR} or ${VAR:-fallback}
    static ref ENV_REF: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env reference regex");
}

/// Resolve every `${VAR}` / `${VAR:-default}` reference from the process environment.
pub fn interpolate(value: &str) -> Result<String> {
    interpolate_with(value, |name| std::env::var(name).ok())
}

/// Resolve references using `lookup` instead of the process environment
pub fn interpolate_with<F>(value: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = None;
    let resolved = ENV_REF.replace_all(value, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(v), _) => v,
            (None, Some(fallback)) => fallback.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(Error::Config(format!(
            "environment variable {} is not set",
            name
        ))),
        None => Ok(resolved.into_owned()),
    }
}

/// Interpolate an optional value, substituting `default` when absent
pub fn resolve_or(value: Option<&str>, default: &str) -> Result<String> {
    match value {
        Some(v) => interpolate(v),
        None => Ok(default.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "MYSQL_HOST" => Some("db.internal".to_string()),
            "MYSQL_PORT" => Some("3307".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_resolves_references() {
        assert_eq!(interpolate_with("${MYSQL_HOST}", lookup).unwrap(), "db.internal");
        assert_eq!(
            interpolate_with("tcp://${MYSQL_HOST}:${MYSQL_PORT}", lookup).unwrap(),
            "tcp://db.internal:3307"
        );
    }

    #[test]
    fn test_default_used_when_unset() {
        assert_eq!(interpolate_with("${MYSQL_USER:-root}", lookup).unwrap(), "root");
        assert_eq!(interpolate_with("${MYSQL_PASSWORD:-}", lookup).unwrap(), "");
    }

    #[test]
    fn test_missing_variable_is_config_error() {
        let err = interpolate_with("${MYSQL_DATABASE}", lookup).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("MYSQL_DATABASE"));
    }

    #[test]
    fn test_positional_placeholders_untouched() {
        assert_eq!(
            interpolate_with("SELECT * FROM t WHERE id = $1", lookup).unwrap(),
            "SELECT * FROM t WHERE id = $1"
        );
    }
}
