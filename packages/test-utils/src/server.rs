use coordinator::config::Config;
use coordinator::rooms::RoomManager;
use coordinator::{create_app, AppState};
use std::sync::Arc;

use crate::fixtures::test_config;

/// Handle to a running test server
pub struct TestServer {
    pub base_url: String,
    pub ws_base_url: String,
    pub config: Config,
    pub rooms: Arc<RoomManager>,
    _shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    /// Start a test server on a random available port with the default test config
    ///
    /// The server runs in the background and shuts down when dropped.
    pub async fn start() -> anyhow::Result<Self> {
        Self::with_config(test_config()).await
    }

    /// Start a test server with a custom configuration
    ///
    /// Mirrors the production setup in main.rs, minus the signal handling.
    pub async fn with_config(config: Config) -> anyhow::Result<Self> {
        let state = AppState::from_config(&config)
            .map_err(|e| anyhow::anyhow!("Failed to build app state: {}", e))?;
        let rooms = state.rooms.clone();
        let app = create_app(state, &config.server.allowed_origins);

        // Bind to random available port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let base_url = format!("http://{}", addr);
        let ws_base_url = format!("ws://{}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
            {
                eprintln!("Test server error: {}", e);
            }
        });

        // Give server a moment to start
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        Ok(Self {
            base_url,
            ws_base_url,
            config,
            rooms,
            _shutdown_tx: shutdown_tx,
        })
    }

    /// Build full HTTP URL for a path
    ///
    /// # Example
    /// ```rust,ignore
    /// let url = server.url("/health");
    /// let response = reqwest::get(&url).await?;
    /// ```
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build full WebSocket URL for a path
    pub fn ws_url(&self, path: &str) -> String {
        format!("{}{}", self.ws_base_url, path)
    }

    /// WebSocket URL carrying a session token minted for `user_id`
    pub fn ws_url_for(&self, user_id: &str) -> anyhow::Result<String> {
        let token = crate::fixtures::mint_token(user_id)?;
        Ok(format!("{}/ws?token={}", self.ws_base_url, token))
    }

    /// GET a path and decode the JSON body
    pub async fn get_json(&self, path: &str) -> anyhow::Result<(reqwest::StatusCode, serde_json::Value)> {
        let response = reqwest::get(self.url(path)).await?;
        let status = response.status();
        let body = response.json().await?;
        Ok((status, body))
    }

    /// POST a notification and return the status with the decoded body
    pub async fn notify(
        &self,
        body: &serde_json::Value,
    ) -> anyhow::Result<(reqwest::StatusCode, serde_json::Value)> {
        let response = reqwest::Client::new()
            .post(self.url("/notify"))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.json().await?;
        Ok((status, body))
    }
}
