use axum::http::{header, HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod models;
pub mod rooms;

use api::{rest, ws};
use auth::{Authenticator, HttpDirectory, IdentityLookup, StaticDirectory};
use config::{Config, IngressConfig, WsConfig};
use rooms::RoomManager;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
    pub authenticator: Arc<Authenticator>,
    pub ws: WsConfig,
    pub ingress: IngressConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, identities: Arc<dyn IdentityLookup>) -> Self {
        Self {
            rooms: Arc::new(RoomManager::new(config.ws.outbound_buffer)),
            authenticator: Arc::new(Authenticator::new(
                &config.auth.jwt_secret,
                config.auth.cookie_name.clone(),
                identities,
            )),
            ws: config.ws.clone(),
            ingress: config.ingress.clone(),
            started_at: Instant::now(),
        }
    }

    /// Build state with the identity source named by the configuration
    pub fn from_config(config: &Config) -> errors::Result<Self> {
        let identities: Arc<dyn IdentityLookup> = match &config.identity.base_url {
            Some(base_url) => {
                let timeout = Duration::from_millis(config.identity.timeout_ms.unwrap_or(2000));
                log::info!("Resolving identities via {}", base_url);
                Arc::new(HttpDirectory::new(base_url.clone(), timeout)?)
            }
            None => {
                let directory = StaticDirectory::new(config.identity.users.clone());
                log::info!("Resolving identities from {} configured user(s)", directory.len());
                Arc::new(directory)
            }
        };
        Ok(Self::new(config, identities))
    }
}

/// REST + WebSocket routes with CORS applied and handler panics answered with a 500
pub fn create_app(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .merge(rest::create_rest())
        .merge(ws::create_ws())
        .with_state(state)
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(cors_layer(allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true)
}
