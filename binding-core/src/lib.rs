//! # Binding Core
//!
//! Core abstractions for building message bindings.
//!
//! A binding adapts a generic "write a message / read messages" interface to a
//! specific external messaging service. The hosting runtime hands a binding its
//! metadata once, then either writes messages through it or starts a receive
//! loop that calls back into the runtime for every inbound message.
//!
//! ## Overview
//!
//! Bindings come in two directions:
//! - **Output**: the runtime writes messages to the external system
//! - **Input**: the binding reads from the external system and invokes a handler
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use binding_core::{
//!     Binding, BindingMetadata, BindingResult, InputBinding, ReadHandler, ReadResponse,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! pub struct MyBinding;
//!
//! #[async_trait]
//! impl Binding for MyBinding {
//!     async fn init(&mut self, metadata: BindingMetadata) -> BindingResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl InputBinding for MyBinding {
//!     async fn read(
//!         &self,
//!         handler: Arc<dyn ReadHandler>,
//!         shutdown: CancellationToken,
//!     ) -> BindingResult<()> {
//!         handler.handle(ReadResponse::new(b"hello".to_vec())).await?;
//!         shutdown.cancelled().await;
//!         Ok(())
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **Lifecycle Management**: runtimes handle init, signal-driven shutdown and tracing setup
//! - **Explicit Cancellation**: input bindings stop on a `CancellationToken`, not on process signals
//! - **Handler Error Policy**: handler failures are logged and either skipped or fatal
//! - **Observability**: metrics through the `metrics` facade and structured logging
//! - **Configuration**: TOML file or environment variable configuration

mod config;
mod error;
mod message;
mod metrics;
mod runtime;
mod traits;

// Re-export public API
pub use config::{BindingConfig, BindingMetadata, HandlerErrorPolicy};
pub use error::{BindingError, BindingResult};
pub use message::{ReadResponse, WriteRequest};
pub use metrics::BindingMetrics;
pub use runtime::{init_tracing, InputRuntime, OutputRuntime};
pub use traits::{Binding, InputBinding, OutputBinding, ReadHandler};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
