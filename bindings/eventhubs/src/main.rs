//! Standalone Event Hubs binding process
//!
//! `BINDING_DIRECTION=input` (default) logs every event received from the hub.
//! `BINDING_DIRECTION=output` publishes each line read from stdin as one event.

use anyhow::{bail, Context};
use binding_core::{
    init_tracing, BindingConfig, BindingError, InputRuntime, OutputRuntime, ReadHandler,
    ReadResponse, WriteRequest,
};
use binding_eventhubs::{load_config, EventHubsBinding};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

enum Direction {
    Input,
    Output,
}

impl Direction {
    fn from_env() -> anyhow::Result<Self> {
        match std::env::var("BINDING_DIRECTION").as_deref() {
            Err(_) | Ok("input") => Ok(Direction::Input),
            Ok("output") => Ok(Direction::Output),
            Ok(other) => bail!(
                "BINDING_DIRECTION must be 'input' or 'output', got '{}'",
                other
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let direction = Direction::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!("Starting Event Hubs binding");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Binding: {}", config.binding_name);

    match direction {
        Direction::Input => run_input(config).await,
        Direction::Output => run_output(config).await,
    }
}

async fn run_input(config: BindingConfig) -> anyhow::Result<()> {
    let binding = EventHubsBinding::new(&config.binding_name);
    let mut runtime = InputRuntime::new(binding, config)?;

    let handler: Arc<dyn ReadHandler> = Arc::new(|response: ReadResponse| async move {
        tracing::info!(
            partition = response.get_metadata("partitionId").unwrap_or("?"),
            offset = response.get_metadata("offset").unwrap_or("?"),
            bytes = response.size(),
            "Received event: {}",
            String::from_utf8_lossy(response.payload())
        );
        Ok::<(), BindingError>(())
    });

    runtime.run(handler).await?;

    tracing::info!("Event Hubs binding stopped");
    Ok(())
}

async fn run_output(config: BindingConfig) -> anyhow::Result<()> {
    let binding = EventHubsBinding::new(&config.binding_name);
    let runtime = OutputRuntime::new(binding, config).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0usize;
    let mut failed = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        match runtime.write(WriteRequest::from_string(line)).await {
            Ok(()) => sent += 1,
            Err(e) => {
                failed += 1;
                tracing::error!(error = %e, "Failed to publish event");
            }
        }
    }

    tracing::info!(
        binding = runtime.binding_name(),
        sent,
        failed,
        "Event Hubs binding finished publishing"
    );
    Ok(())
}
