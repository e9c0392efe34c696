use anyhow::Context;
use coordinator::config::Config;
use coordinator::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables win
    dotenvy::dotenv().ok();

    env_logger::init();

    std::panic::set_hook(Box::new(|info| {
        log::error!("Panic: {}", info);
    }));

    let config = Config::load().context("Failed to load configuration")?;
    if config.auth.jwt_secret.is_empty() {
        anyhow::bail!("auth.jwt_secret is not set (COORDINATOR__AUTH__JWT_SECRET)");
    }

    let state = AppState::from_config(&config).context("Failed to build application state")?;
    let rooms = state.rooms.clone();
    let app = create_app(state, &config.server.allowed_origins);

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    println!("🚀 Auction coordinator running on http://{}", addr);
    println!("🔌 WebSocket endpoint: ws://{}/ws", addr);
    println!("📖 OpenAPI docs: http://{}/api/docs", addr);
    println!("📋 OpenAPI spec: http://{}/api/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    log::info!("Shutting down, closing open connections");
    rooms.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
