//! Streaming client capability used by the binding.
//!
//! The binding never speaks a wire protocol itself. Connecting, sending,
//! listing partitions and receiving are delegated to a [`StreamConnector`] and
//! the [`StreamClient`] it hands out.

use crate::connection_string::ConnectionString;
use async_trait::async_trait;
use binding_core::BindingResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Where a partition subscription starts reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// Only events enqueued after the subscription starts
    #[default]
    Latest,
    /// Everything still retained in the partition
    Earliest,
}

/// Everything a connector needs to open a client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connection: ConnectionString,
    /// Event hub (Kafka topic) name
    pub event_hub: String,
    pub consumer_group: String,
    /// Disable certificate verification for this client only
    pub skip_tls_verify: bool,
    /// Upper bound for connecting and for a single send
    pub send_timeout: Duration,
}

/// One event received from a partition
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    pub partition_id: String,
    pub offset: i64,
    /// `None` for events that carry no body
    pub payload: Option<Vec<u8>>,
    pub enqueued_time: Option<DateTime<Utc>>,
}

/// Channel receive tasks push events into
pub type EventSender = mpsc::Sender<ReceivedEvent>;

/// A live subscription to one partition
///
/// Dropping it stops the receive task; [`Subscription::close`] also waits for
/// the task to finish.
pub struct Subscription {
    partition_id: String,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        partition_id: impl Into<String>,
        token: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            partition_id: partition_id.into(),
            token,
            task: Some(task),
        }
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    /// Stop receiving and wait for the receive task to exit
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(
                    partition = %self.partition_id,
                    error = %e,
                    "Partition receiver ended abnormally"
                );
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Close every subscription, in order
pub async fn close_all(subscriptions: Vec<Subscription>) {
    for subscription in subscriptions {
        subscription.close().await;
    }
}

/// An open connection to one event hub
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Send one event and wait for the service to accept it
    async fn send(&self, payload: &[u8], properties: &HashMap<String, String>)
        -> BindingResult<()>;

    /// Current partition ids of the hub
    async fn partition_ids(&self) -> BindingResult<Vec<String>>;

    /// Start receiving from one partition into `events`
    async fn subscribe(
        &self,
        partition_id: &str,
        start: StartPosition,
        events: EventSender,
    ) -> BindingResult<Subscription>;

    /// Release the connection
    async fn close(&self) -> BindingResult<()>;
}

/// Opens [`StreamClient`]s
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, options: &ClientOptions) -> BindingResult<Box<dyn StreamClient>>;
}
