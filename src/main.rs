//! PDF Form Filler - Entry point
//!
//! MCP server for filling PDF forms over stdio.

use pdf_form_filler::{run_server_with_config, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the MCP transport
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_form_filler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        resource_dirs = ?config.resource_dirs,
        download_dir = %config.download_dir.display(),
        max_input_bytes = config.max_input_bytes,
        "Starting PDF Form Filler"
    );

    run_server_with_config(config).await
}
