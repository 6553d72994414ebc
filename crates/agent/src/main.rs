//! `continuity-agent` -- headless continuity sync client.
//!
//! Keeps one project's local copy in sync with the shared backend and
//! persists it to a state file, so the agent can restart (or start
//! without network) and pick up where it left off.
//!
//! # Environment variables
//!
//! See [`AgentConfig::from_env`](continuity_agent::config::AgentConfig::from_env)
//! and [`SyncConfig::from_env`](continuity_sync::SyncConfig::from_env).

use continuity_agent::config::AgentConfig;
use continuity_agent::runner;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "continuity_agent=info,continuity_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        project_id = %config.project_id,
        client = %config.client_name,
        state_file = %config.state_file.display(),
        "Starting continuity-agent",
    );

    let services = runner::connect(&config).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to set up backends");
        std::process::exit(1);
    });

    runner::run(config, services, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    })
    .await;
}
