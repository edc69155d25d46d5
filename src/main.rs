//! taskweave - CLI entry point
//!
//! Decomposes the task given on the command line, waits for every subtask,
//! and prints the resulting report.

use std::sync::Arc;
use std::time::Duration;

use taskweave::llm::OpenRouterClient;
use taskweave::task::TracingSink;
use taskweave::{Config, Orchestrator};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskweave=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let description = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if description.trim().is_empty() {
        anyhow::bail!("usage: taskweave <task description>");
    }

    let config = Config::from_env()?;
    info!(
        model = %config.default_model,
        max_concurrency = config.max_concurrency,
        max_depth = config.max_depth,
        "Loaded configuration"
    );

    let llm = Arc::new(OpenRouterClient::new(config.api_key.clone()));
    let orchestrator = Orchestrator::new(llm, &config);
    orchestrator.add_sink(Arc::new(TracingSink));

    let id = orchestrator.submit(description, 0).await?;
    orchestrator.wait_idle(POLL_INTERVAL).await;
    orchestrator.shutdown();

    let progress = orchestrator.progress().await;
    info!(
        completed = progress.completed,
        failed = progress.failed,
        total = progress.total,
        "All tasks settled"
    );

    if let Some(report) = orchestrator.report(id).await {
        println!("{report}");
    }
    Ok(())
}
