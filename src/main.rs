use std::net::SocketAddr;

use informes::{app, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "informes=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;
    let addr: SocketAddr =
        format!("{}:{}", state.config.host, state.config.port).parse()?;

    let store = state.store.clone();
    let result = app::serve(app::build_app(state), addr).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "server stopped with an error");
    }
    store.close().await;
    result
}
