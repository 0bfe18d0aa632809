use std::net::SocketAddr;
use std::process;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mindmap_server::config::ServerConfig;
use mindmap_server::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mindmap_server=info,mindmap_pipeline=info,tower_http=info".into()
            }),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!("server failed: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    if !config.default_model_key_configured() {
        tracing::warn!(
            model = %config.default_model,
            "no API key configured for the default model; requests using it will be rejected"
        );
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        environment = %config.environment,
        model = %config.default_model,
        "Mindmap server listening on {addr}"
    );

    let app = mindmap_server::app_router(AppState::new(config)?);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
