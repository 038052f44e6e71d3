use poker_room_server::{AppState, ServerConfig, router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::load()?;
    let addr = config.bind_addr.clone();
    let state = AppState::new(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
