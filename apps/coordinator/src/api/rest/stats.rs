use axum::{extract::State, response::Json};

use crate::models::api::StatsResponse;
use crate::AppState;

/// Connection and room counters
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Current connection and room counts", body = StatsResponse)
    ),
    tag = "api"
)]
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.rooms.stats().await;
    Json(StatsResponse {
        connected_user_count: stats.connected_users,
        connection_count: stats.connections,
        active_auction_count: stats.active_auctions,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
