//! Event Hubs binding implementation
//!
//! Output: every `write` opens a client, sends one event and closes the client.
//! Input: `read` subscribes to every partition of the hub and calls the handler
//! for each event until the shutdown token is cancelled.

use crate::client::{
    close_all, EventSender, ReceivedEvent, StartPosition, StreamClient, StreamConnector,
    Subscription,
};
use crate::config::EventHubsMetadata;
use crate::kafka::KafkaConnector;
use async_trait::async_trait;
use binding_core::{
    Binding, BindingError, BindingMetadata, BindingMetrics, BindingResult, HandlerErrorPolicy,
    InputBinding, OutputBinding, ReadHandler, ReadResponse, WriteRequest,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events buffered between partition receivers and the handler
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Azure Event Hubs binding
///
/// Holds nothing but metadata between calls; every `write` and `read` opens
/// its own client through the connector.
pub struct EventHubsBinding<C = KafkaConnector> {
    connector: C,
    metadata: Option<BindingMetadata>,
    metrics: BindingMetrics,
}

impl EventHubsBinding<KafkaConnector> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_connector(name, KafkaConnector::new())
    }
}

impl<C: StreamConnector> EventHubsBinding<C> {
    /// Create a binding that opens clients through `connector`
    pub fn with_connector(name: impl Into<String>, connector: C) -> Self {
        Self {
            connector,
            metadata: None,
            metrics: BindingMetrics::new(name),
        }
    }

    fn resolve(&self) -> BindingResult<EventHubsMetadata> {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| BindingError::config("binding used before init"))?;

        EventHubsMetadata::from_metadata(metadata)
    }

    async fn send_once(&self, request: &WriteRequest) -> BindingResult<String> {
        let options = self.resolve()?.client_options()?;

        let client = self.connector.connect(&options).await?;
        let result = client.send(&request.data, &request.metadata).await;

        if let Err(e) = client.close().await {
            warn!(event_hub = %options.event_hub, error = %e, "Failed to close Event Hubs client");
        }

        result.map(|()| options.event_hub)
    }

    async fn receive(
        &self,
        client: &dyn StreamClient,
        config: &EventHubsMetadata,
        event_hub: &str,
        handler: &dyn ReadHandler,
        shutdown: &CancellationToken,
    ) -> BindingResult<()> {
        let partitions = client.partition_ids().await?;
        if partitions.is_empty() {
            return Err(BindingError::read(format!(
                "Event hub {} reported no partitions",
                event_hub
            )));
        }

        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let subscriptions =
            subscribe_all(client, &partitions, config.start_position, tx).await?;

        info!(
            event_hub = %event_hub,
            partitions = subscriptions.len(),
            start_position = ?config.start_position,
            consumer_group = %config.consumer_group,
            "Receiving events"
        );

        let outcome = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(event_hub = %event_hub, "Shutdown requested, closing receivers");
                    break Ok(());
                }
                received = rx.recv() => match received {
                    Some(event) => {
                        if let Err(e) = self.dispatch(handler, event, config.handler_error_policy).await {
                            break Err(e);
                        }
                    }
                    None => {
                        break Err(BindingError::read(format!(
                            "All partition receivers of {} stopped",
                            event_hub
                        )));
                    }
                },
            }
        };

        close_all(subscriptions).await;
        outcome
    }

    async fn dispatch(
        &self,
        handler: &dyn ReadHandler,
        event: ReceivedEvent,
        policy: HandlerErrorPolicy,
    ) -> BindingResult<()> {
        let Some(payload) = event.payload else {
            debug!(partition = %event.partition_id, offset = event.offset, "Skipping event without body");
            return Ok(());
        };

        self.metrics.record_received(&event.partition_id);

        let mut response = ReadResponse::new(payload)
            .with_metadata("partitionId", &event.partition_id)
            .with_metadata("offset", event.offset.to_string());
        if let Some(enqueued) = event.enqueued_time {
            response = response.with_metadata("enqueuedTime", enqueued.to_rfc3339());
        }

        debug!(
            partition = %event.partition_id,
            offset = event.offset,
            bytes = response.size(),
            "Delivering event"
        );

        let Err(e) = handler.handle(response).await else {
            return Ok(());
        };

        self.metrics.record_handler_error();
        match policy {
            HandlerErrorPolicy::Continue => {
                warn!(
                    partition = %event.partition_id,
                    offset = event.offset,
                    error = %e,
                    "Read handler failed, continuing"
                );
                Ok(())
            }
            HandlerErrorPolicy::Stop => {
                error!(
                    partition = %event.partition_id,
                    offset = event.offset,
                    error = %e,
                    "Read handler failed, stopping"
                );
                Err(BindingError::handler(format!(
                    "partition {} offset {}: {}",
                    event.partition_id, event.offset, e
                )))
            }
        }
    }
}

/// Subscribe to every partition, or to none
///
/// On the first failure the subscriptions made so far are closed before the
/// error is returned.
async fn subscribe_all(
    client: &dyn StreamClient,
    partitions: &[String],
    start: StartPosition,
    events: EventSender,
) -> BindingResult<Vec<Subscription>> {
    let mut subscriptions = Vec::with_capacity(partitions.len());

    for partition_id in partitions {
        match client.subscribe(partition_id, start, events.clone()).await {
            Ok(subscription) => subscriptions.push(subscription),
            Err(e) => {
                error!(
                    partition = %partition_id,
                    error = %e,
                    subscribed = subscriptions.len(),
                    "Failed to subscribe, releasing partitions"
                );
                close_all(subscriptions).await;
                return Err(e);
            }
        }
    }

    Ok(subscriptions)
}

#[async_trait]
impl<C: StreamConnector> Binding for EventHubsBinding<C> {
    async fn init(&mut self, metadata: BindingMetadata) -> BindingResult<()> {
        self.metadata = Some(metadata);
        Ok(())
    }
}

#[async_trait]
impl<C: StreamConnector> OutputBinding for EventHubsBinding<C> {
    async fn write(&self, request: WriteRequest) -> BindingResult<()> {
        let start = Instant::now();

        match self.send_once(&request).await {
            Ok(event_hub) => {
                self.metrics.record_sent(start.elapsed());
                info!(
                    event_hub = %event_hub,
                    bytes = request.size(),
                    "EventHubs event sent successfully"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_send_error(e.kind());
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<C: StreamConnector> InputBinding for EventHubsBinding<C> {
    async fn read(
        &self,
        handler: Arc<dyn ReadHandler>,
        shutdown: CancellationToken,
    ) -> BindingResult<()> {
        let config = self.resolve()?;
        let options = config.client_options()?;

        let client = self.connector.connect(&options).await?;
        let result = self
            .receive(
                client.as_ref(),
                &config,
                &options.event_hub,
                handler.as_ref(),
                &shutdown,
            )
            .await;

        if let Err(e) = client.close().await {
            warn!(event_hub = %options.event_hub, error = %e, "Failed to close Event Hubs client");
        }

        result
    }
}
