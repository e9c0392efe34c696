use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::models::api::{HealthResponse, NotifyRequest, NotifyResponse, StatsResponse};
use crate::models::ApiResponse;
use crate::AppState;

pub mod health;
pub mod notify;
pub mod stats;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Auction Coordinator API",
        version = "0.1.0",
        description = "Real-time auction room coordinator"
    ),
    paths(
        health::root,
        health::health_check,
        stats::get_stats,
        notify::notify,
    ),
    components(
        schemas(
            ApiResponse,
            HealthResponse,
            StatsResponse,
            NotifyRequest,
            NotifyResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "api", description = "General API endpoints"),
        (name = "ingress", description = "Events relayed from the auction service")
    )
)]
pub struct ApiDoc;

/// REST routes plus the OpenAPI document and Swagger UI
pub fn create_rest() -> Router<AppState> {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/stats", get(stats::get_stats))
        .route("/notify", post(notify::notify))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
}
