use axum::response::Json;

use crate::models::api::HealthResponse;
use crate::models::ApiResponse;

pub const SERVICE_NAME: &str = "auction-coordinator";

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Welcome message", body = ApiResponse)
    ),
    tag = "api"
)]
pub async fn root() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "Auction coordinator is running!".to_string(),
        timestamp: chrono::Utc::now().timestamp().max(0) as u64,
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthResponse)
    ),
    tag = "api"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}
