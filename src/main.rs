//! Yukomp server
//!
//! Serves the compression API over HTTP.

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use yukomp::{api, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = ServiceConfig::parse();
    info!(
        host = %config.host,
        port = config.port,
        max_body_bytes = config.max_body_bytes,
        scratch_dir = %config.scratch_dir().display(),
        "Starting Yukomp v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Some(dir) = &config.temp_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating scratch directory {}", dir.display()))?;
    }

    let addr = config
        .bind_address()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;
    let app = api::router(&config);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let format = fmt::format().with_target(true).compact();

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("yukomp=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
