//! Runtimes for driving binding lifecycles.
//!
//! The runtime handles:
//! - Configuration validation
//! - Tracing setup
//! - Binding initialization
//! - Mapping process signals onto a cancellation token
//! - Graceful shutdown of input bindings

use crate::{
    BindingConfig, BindingMetrics, BindingResult, InputBinding, OutputBinding, ReadHandler,
    WriteRequest,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runtime for Input Bindings (External System → Handler)
pub struct InputRuntime<B: InputBinding> {
    binding: B,
    config: BindingConfig,
    metrics: BindingMetrics,
    shutdown: CancellationToken,
}

impl<B: InputBinding> InputRuntime<B> {
    /// Create a new input runtime
    pub fn new(binding: B, config: BindingConfig) -> BindingResult<Self> {
        config.validate()?;

        init_tracing(&config.log_level);

        info!("Initializing Input Runtime");
        info!("Binding: {}", config.binding_name);

        let metrics = BindingMetrics::new(&config.binding_name);

        Ok(Self {
            binding,
            config,
            metrics,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the read loop when cancelled
    ///
    /// SIGINT/SIGTERM cancel it too while `run` is active. Once cancelled,
    /// later calls to `run` return immediately.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Initialize the binding and read until shutdown
    ///
    /// Each call reads with a child of the shutdown token, so a binding that
    /// returns on its own leaves the runtime able to `run` again.
    pub async fn run(&mut self, handler: Arc<dyn ReadHandler>) -> BindingResult<()> {
        info!("Starting Input Runtime");

        let run_token = self.shutdown.child_token();
        spawn_signal_listener(self.shutdown.clone(), run_token.clone(), shutdown_signal());

        let result = self.init_and_read(handler, run_token.clone()).await;

        // Stops the signal listener
        run_token.cancel();

        match &result {
            Ok(()) => info!("Input Runtime stopped"),
            Err(e) => error!("Input Runtime stopped with error: {}", e),
        }

        result
    }

    async fn init_and_read(
        &mut self,
        handler: Arc<dyn ReadHandler>,
        run_token: CancellationToken,
    ) -> BindingResult<()> {
        info!("Initializing binding");
        self.binding.init(self.config.metadata.clone()).await?;
        info!("Binding initialized successfully");

        self.metrics.set_reading(true);
        let result = self.binding.read(handler, run_token).await;
        self.metrics.set_reading(false);

        result
    }
}

/// Cancel `shutdown` when `signal` resolves, unless `run` is cancelled first
fn spawn_signal_listener<S>(shutdown: CancellationToken, run: CancellationToken, signal: S)
where
    S: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = signal => {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
            _ = run.cancelled() => {}
        }
    });
}

/// Runtime for Output Bindings (Runtime → External System)
pub struct OutputRuntime<B: OutputBinding> {
    binding: B,
    config: BindingConfig,
}

impl<B: OutputBinding> OutputRuntime<B> {
    /// Create a new output runtime and initialize the binding
    pub async fn new(mut binding: B, config: BindingConfig) -> BindingResult<Self> {
        config.validate()?;

        init_tracing(&config.log_level);

        info!("Initializing Output Runtime");
        info!("Binding: {}", config.binding_name);

        binding.init(config.metadata.clone()).await?;
        info!("Binding initialized successfully");

        Ok(Self { binding, config })
    }

    pub async fn write(&self, request: WriteRequest) -> BindingResult<()> {
        self.binding.write(request).await
    }

    pub fn binding_name(&self) -> &str {
        &self.config.binding_name
    }
}

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over `log_level`. Does nothing if a subscriber is already
/// installed.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .ok(); // Ignore if already initialized
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
