mod error;
mod handlers;
mod types;

pub use error::ApiError;
pub use types::{ExportRequest, PageRequest, RefreshResponse, RunResponse, ToggleResponse};

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

use crate::core::JunctionError;
use crate::service::JunctionService;

pub struct JunctionApi {
    service: Arc<JunctionService>,
}

impl JunctionApi {
    pub fn new(service: JunctionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/v1/catalog", get(handlers::list_catalog))
            .route(
                "/api/v1/catalog/{connection}/refresh",
                post(handlers::refresh_connection),
            )
            .route("/api/v1/selection", get(handlers::list_selection))
            .route("/api/v1/selection/toggle", post(handlers::toggle_selection))
            .route("/api/v1/selection/page", post(handlers::load_page))
            .route("/api/v1/join", post(handlers::join))
            .route(
                "/api/v1/pipeline/steps",
                get(handlers::list_steps)
                    .post(handlers::add_step)
                    .delete(handlers::clear_steps),
            )
            .route("/api/v1/pipeline/steps/{id}", delete(handlers::remove_step))
            .route("/api/v1/pipeline/run", post(handlers::run_pipeline))
            .route("/api/v1/dataset", get(handlers::get_dataset))
            .route("/api/v1/profile", post(handlers::profile))
            .route(
                "/api/v1/history",
                get(handlers::list_history).delete(handlers::clear_history),
            )
            .route("/api/v1/export", post(handlers::export))
            .layer(TraceLayer::new_for_http())
            .with_state(self.service.clone())
    }

    pub async fn serve(self, addr: &str) -> Result<(), JunctionError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| JunctionError::IoError(format!("binding to {addr}: {e}")))?;
        axum::serve(listener, self.router())
            .await
            .map_err(|e| JunctionError::IoError(format!("serving: {e}")))?;
        Ok(())
    }
}
