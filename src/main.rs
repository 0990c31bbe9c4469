//! rowseed API server
//!
//! Registers source databases at runtime and serves row exports over HTTP.
//! When DATABASE_URL is set it is registered at startup under the name
//! "default".

use rowseed::config::Settings;
use rowseed::routes::create_router;
use rowseed::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting rowseed export server...");

    let settings = Settings::load()?;
    info!(
        "📋 Configuration loaded (max depth {}, strict {}, timeout {:?})",
        settings.export.max_depth, settings.export.strict, settings.export.timeout
    );

    let state = Arc::new(AppState::new(settings.export.clone()));

    if let Some(url) = settings.database_url.as_deref() {
        match state
            .connections
            .connect(url, Some("default".to_string()))
            .await
        {
            Ok(info) => info!("✅ Registered DATABASE_URL as connection {}", info.id),
            Err(e) => warn!("⚠️  Could not register DATABASE_URL: {}", e),
        }
    }

    let app = create_router(state, &settings);
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   GET    /health                           - Health check");
    info!("   POST   /api/connections                  - Register a source database");
    info!("   GET    /api/connections                  - List sources");
    info!("   POST   /api/connections/test             - Test a connection string");
    info!("   DELETE /api/connections/{{id}}             - Remove a source");
    info!("   POST   /api/connections/{{id}}/export      - Export a row (JSON summary)");
    info!("   POST   /api/connections/{{id}}/export.sql  - Export a row (SQL script)");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rowseed=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
