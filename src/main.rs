//! Audioqa - audio quality dashboard
//!
//! Loads the administrator config, then serves the dashboard until
//! interrupted. The metric programs are not touched until the first
//! analysis is requested.

use anyhow::{Context, Result};
use audioqa_core::config::QualityConfig;
use audioqa_core::metrics::command::CommandSuiteLoader;
use audioqa_server::{AppState, ServerConfig};

/// Environment variable overriding the listen port
const PORT_ENV: &str = "PORT";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("audioqa=info".parse()?)
                .add_directive("audioqa_core=info".parse()?)
                .add_directive("audioqa_server=info".parse()?),
        )
        .init();

    tracing::info!(
        version = audioqa_core::VERSION,
        build_date = audioqa_core::BUILD_DATE,
        "Audioqa starting"
    );

    let config = QualityConfig::load();
    let loader = CommandSuiteLoader::new(config.runners.clone());

    let mut server = ServerConfig::default();
    if let Ok(port) = std::env::var(PORT_ENV) {
        server.port = port
            .parse()
            .with_context(|| format!("Invalid {PORT_ENV}: {port}"))?;
    }

    let state = AppState::new(Box::new(loader), config.thresholds, server);

    tokio::select! {
        result = audioqa_server::start_server(state) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}
