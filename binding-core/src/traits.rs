//! Core traits implemented by bindings.

use crate::{BindingMetadata, BindingResult, ReadResponse, WriteRequest};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Common lifecycle shared by input and output bindings
#[async_trait]
pub trait Binding: Send + Sync {
    /// Store the metadata supplied by the hosting runtime
    ///
    /// Called once before any `write` or `read`. Calling it again replaces
    /// the previous metadata. Implementations should not touch the network
    /// here; metadata problems surface on first use.
    async fn init(&mut self, metadata: BindingMetadata) -> BindingResult<()>;
}

/// Binding that sends messages to an external system
#[async_trait]
pub trait OutputBinding: Binding {
    /// Send one message
    async fn write(&self, request: WriteRequest) -> BindingResult<()>;
}

/// Binding that receives messages from an external system
#[async_trait]
pub trait InputBinding: Binding {
    /// Receive messages until `shutdown` is cancelled
    ///
    /// Every inbound message is passed to `handler`. Returns `Ok(())` once the
    /// token is cancelled and all resources have been released.
    async fn read(
        &self,
        handler: Arc<dyn ReadHandler>,
        shutdown: CancellationToken,
    ) -> BindingResult<()>;
}

/// Callback invoked by input bindings for every inbound message
#[async_trait]
pub trait ReadHandler: Send + Sync {
    async fn handle(&self, response: ReadResponse) -> BindingResult<()>;
}

#[async_trait]
impl<F, Fut> ReadHandler for F
where
    F: Fn(ReadResponse) -> Fut + Send + Sync,
    Fut: Future<Output = BindingResult<()>> + Send + 'static,
{
    async fn handle(&self, response: ReadResponse) -> BindingResult<()> {
        (self)(response).await
    }
}
