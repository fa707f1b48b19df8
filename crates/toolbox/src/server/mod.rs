mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{config::Config, tools::Toolbox, Result};

pub struct Server {
    toolbox: Arc<Toolbox>,
}

impl Server {
    pub fn new(_config: &Config, toolbox: Arc<Toolbox>) -> Self {
        Self { toolbox }
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    pub fn build_router(self) -> Router {
        let state = Arc::new(self);

        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .route("/tools", get(routes::list_tools))
            .route("/tools/{name}", post(routes::invoke_tool))
            .route("/toolsets", get(routes::list_toolsets))
            .route("/query", post(routes::run_query))
            .route("/dispatch", post(routes::dispatch))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn start(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}
