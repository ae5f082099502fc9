//! In-memory event hub used by the binding tests

use crate::client::{
    ClientOptions, EventSender, ReceivedEvent, StartPosition, StreamClient, StreamConnector,
    Subscription,
};
use async_trait::async_trait;
use binding_core::{BindingError, BindingResult};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Payload = Option<Vec<u8>>;

#[derive(Default)]
struct HubState {
    partitions: Vec<String>,
    retained: HashMap<String, Vec<Payload>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Payload>>>,
    start_positions: Vec<(String, StartPosition)>,
    next_partition: usize,
    connects: usize,
    closes: usize,
    unreachable: bool,
    fail_send: bool,
    fail_subscribe_on: Option<String>,
    last_options: Option<ClientOptions>,
}

#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn with_partitions(count: usize) -> Self {
        let hub = Self::default();
        hub.state.lock().unwrap().partitions = (0..count).map(|p| p.to_string()).collect();
        hub
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { hub: self.clone() }
    }

    pub fn set_unreachable(&self) {
        self.state.lock().unwrap().unreachable = true;
    }

    /// Make every send fail after the client is connected
    pub fn fail_send(&self) {
        self.state.lock().unwrap().fail_send = true;
    }

    pub fn fail_subscribe_on(&self, partition: &str) {
        self.state.lock().unwrap().fail_subscribe_on = Some(partition.to_string());
    }

    /// Enqueue an event on one partition
    pub fn publish(&self, partition: &str, payload: Payload) {
        let mut state = self.state.lock().unwrap();
        state
            .retained
            .entry(partition.to_string())
            .or_default()
            .push(payload.clone());
        if let Some(subscribers) = state.subscribers.get_mut(partition) {
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        }
    }

    /// Drop every subscriber, as if the service closed all links
    pub fn disconnect_all(&self) {
        self.state.lock().unwrap().subscribers.clear();
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn retained(&self, partition: &str) -> Vec<Payload> {
        self.state
            .lock()
            .unwrap()
            .retained
            .get(partition)
            .cloned()
            .unwrap_or_default()
    }

    pub fn start_positions(&self) -> Vec<(String, StartPosition)> {
        self.state.lock().unwrap().start_positions.clone()
    }

    pub fn last_options(&self) -> Option<ClientOptions> {
        self.state.lock().unwrap().last_options.clone()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscribers
            .values()
            .flatten()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Wait until `count` subscriptions are live
    pub async fn wait_for_subscriptions(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.active_subscriptions() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriptions did not start");
    }
}

pub struct MemoryConnector {
    hub: MemoryHub,
}

#[async_trait]
impl StreamConnector for MemoryConnector {
    async fn connect(&self, options: &ClientOptions) -> BindingResult<Box<dyn StreamClient>> {
        let mut state = self.hub.state.lock().unwrap();
        if state.unreachable {
            return Err(BindingError::connection(format!(
                "{} is unreachable",
                options.connection.kafka_bootstrap_servers()
            )));
        }
        state.connects += 1;
        state.last_options = Some(options.clone());

        Ok(Box::new(MemoryClient {
            hub: self.hub.clone(),
        }))
    }
}

struct MemoryClient {
    hub: MemoryHub,
}

#[async_trait]
impl StreamClient for MemoryClient {
    async fn send(
        &self,
        payload: &[u8],
        _properties: &HashMap<String, String>,
    ) -> BindingResult<()> {
        let partition = {
            let mut state = self.hub.state.lock().unwrap();
            if state.fail_send {
                return Err(BindingError::write("event rejected by hub"));
            }
            if state.partitions.is_empty() {
                return Err(BindingError::write("hub has no partitions"));
            }
            let index = state.next_partition % state.partitions.len();
            state.next_partition += 1;
            state.partitions[index].clone()
        };

        self.hub.publish(&partition, Some(payload.to_vec()));
        Ok(())
    }

    async fn partition_ids(&self) -> BindingResult<Vec<String>> {
        Ok(self.hub.state.lock().unwrap().partitions.clone())
    }

    async fn subscribe(
        &self,
        partition_id: &str,
        start: StartPosition,
        events: EventSender,
    ) -> BindingResult<Subscription> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut state = self.hub.state.lock().unwrap();
            if state.fail_subscribe_on.as_deref() == Some(partition_id) {
                return Err(BindingError::read(format!(
                    "Failed to subscribe to partition {}",
                    partition_id
                )));
            }

            state
                .start_positions
                .push((partition_id.to_string(), start));

            if start == StartPosition::Earliest {
                for payload in state.retained.get(partition_id).into_iter().flatten() {
                    let _ = tx.send(payload.clone());
                }
            }

            state
                .subscribers
                .entry(partition_id.to_string())
                .or_default()
                .push(tx);
        }

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let partition = partition_id.to_string();
        let task = tokio::spawn(async move {
            let mut offset = 0;
            loop {
                let payload = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(payload) => payload,
                        None => break,
                    },
                };

                let event = ReceivedEvent {
                    partition_id: partition.clone(),
                    offset,
                    payload,
                    enqueued_time: Some(Utc::now()),
                };
                offset += 1;

                if events.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(partition_id, token, task))
    }

    async fn close(&self) -> BindingResult<()> {
        self.hub.state.lock().unwrap().closes += 1;
        Ok(())
    }
}
