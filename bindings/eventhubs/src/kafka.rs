//! Event Hubs client over the Kafka-compatible endpoint
//!
//! Event Hubs exposes every hub as a Kafka topic on `<namespace>:9093`,
//! authenticated with SASL PLAIN where the username is `$ConnectionString` and
//! the password is the connection string itself.

use crate::client::{
    ClientOptions, EventSender, ReceivedEvent, StartPosition, StreamClient, StreamConnector,
    Subscription,
};
use async_trait::async_trait;
use binding_core::{BindingError, BindingResult};
use chrono::DateTime;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Message, OwnedHeaders};
use rdkafka::metadata::Metadata;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl From<StartPosition> for Offset {
    fn from(start: StartPosition) -> Self {
        match start {
            StartPosition::Latest => Offset::End,
            StartPosition::Earliest => Offset::Beginning,
        }
    }
}

/// rdkafka settings shared by producers and consumers
///
/// TLS verification is only relaxed on this client's own configuration.
pub fn client_config_entries(options: &ClientOptions) -> Vec<(String, String)> {
    let mut entries = vec![
        (
            "bootstrap.servers".to_string(),
            options.connection.kafka_bootstrap_servers(),
        ),
        ("security.protocol".to_string(), "sasl_ssl".to_string()),
        ("sasl.mechanism".to_string(), "PLAIN".to_string()),
        ("sasl.username".to_string(), "$ConnectionString".to_string()),
        (
            "sasl.password".to_string(),
            options.connection.as_str().to_string(),
        ),
        // Event Hubs closes idle connections after 240s
        ("socket.keepalive.enable".to_string(), "true".to_string()),
        ("metadata.max.age.ms".to_string(), "180000".to_string()),
        (
            "socket.timeout.ms".to_string(),
            options.send_timeout.as_millis().to_string(),
        ),
    ];

    if options.skip_tls_verify {
        entries.push((
            "enable.ssl.certificate.verification".to_string(),
            "false".to_string(),
        ));
        entries.push((
            "ssl.endpoint.identification.algorithm".to_string(),
            "none".to_string(),
        ));
    }

    entries
}

fn client_config(options: &ClientOptions) -> ClientConfig {
    let mut config = ClientConfig::new();
    for (key, value) in client_config_entries(options) {
        config.set(key, value);
    }
    config
}

/// Connector that opens clients against the Kafka endpoint
#[derive(Debug, Clone, Default)]
pub struct KafkaConnector;

impl KafkaConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamConnector for KafkaConnector {
    async fn connect(&self, options: &ClientOptions) -> BindingResult<Box<dyn StreamClient>> {
        let mut config = client_config(options);
        config.set(
            "message.timeout.ms",
            options.send_timeout.as_millis().to_string(),
        );
        config.set("client.id", format!("{}-producer", options.event_hub));

        let producer: FutureProducer = config.create().map_err(|e| {
            BindingError::connection_with_source("Failed to create Event Hubs client", e)
        })?;

        // rdkafka connects lazily; a metadata round trip proves the namespace
        // is reachable and the hub exists.
        fetch_partition_ids(&producer, &options.event_hub, options.send_timeout)
            .await
            .map_err(|e| match e {
                BindingError::Read { message, source } => {
                    BindingError::Connection { message, source }
                }
                other => other,
            })?;

        info!(
            event_hub = %options.event_hub,
            endpoint = %options.connection.kafka_bootstrap_servers(),
            "Connected to Event Hubs"
        );

        Ok(Box::new(KafkaHubClient {
            producer,
            options: options.clone(),
        }))
    }
}

async fn fetch_partition_ids(
    producer: &FutureProducer,
    event_hub: &str,
    timeout: Duration,
) -> BindingResult<Vec<String>> {
    let producer = producer.clone();
    let topic = event_hub.to_string();

    // fetch_metadata blocks the calling thread
    tokio::task::spawn_blocking(move || {
        let metadata = producer
            .client()
            .fetch_metadata(Some(topic.as_str()), timeout)
            .map_err(|e| BindingError::read_with_source("Failed to fetch event hub metadata", e))?;

        partitions_of(&metadata, &topic).map_err(|e| {
            BindingError::read(format!("Event hub {} is not available: {}", topic, e))
        })
    })
    .await
    .map_err(|e| BindingError::read_with_source("Metadata request was aborted", e))?
}

fn partitions_of(metadata: &Metadata, event_hub: &str) -> Result<Vec<String>, String> {
    let topic = metadata
        .topics()
        .iter()
        .find(|t| t.name() == event_hub)
        .ok_or_else(|| "not found in namespace metadata".to_string())?;

    if let Some(err) = topic.error() {
        return Err(format!("{:?}", err));
    }

    Ok(topic
        .partitions()
        .iter()
        .map(|p| p.id().to_string())
        .collect())
}

/// Client bound to one event hub
pub struct KafkaHubClient {
    producer: FutureProducer,
    options: ClientOptions,
}

impl KafkaHubClient {
    fn consumer_config(&self, partition_id: &str, start: StartPosition) -> ClientConfig {
        let mut config = client_config(&self.options);
        config
            .set("group.id", &self.options.consumer_group)
            .set(
                "client.id",
                format!(
                    "{}-{}-{}",
                    self.options.event_hub,
                    partition_id,
                    uuid::Uuid::new_v4().simple()
                ),
            )
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set(
                "auto.offset.reset",
                match start {
                    StartPosition::Latest => "latest",
                    StartPosition::Earliest => "earliest",
                },
            );
        config
    }
}

#[async_trait]
impl StreamClient for KafkaHubClient {
    async fn send(
        &self,
        payload: &[u8],
        properties: &HashMap<String, String>,
    ) -> BindingResult<()> {
        let mut record: FutureRecord<'_, (), [u8]> =
            FutureRecord::to(&self.options.event_hub).payload(payload);

        if !properties.is_empty() {
            let mut headers = OwnedHeaders::new_with_capacity(properties.len());
            for (key, value) in properties {
                headers = headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_str()),
                });
            }
            record = record.headers(headers);
        }

        self.producer
            .send(record, Timeout::After(self.options.send_timeout))
            .await
            .map_err(|(e, _)| BindingError::write_with_source("Failed to send event", e))?;

        Ok(())
    }

    async fn partition_ids(&self) -> BindingResult<Vec<String>> {
        fetch_partition_ids(
            &self.producer,
            &self.options.event_hub,
            self.options.send_timeout,
        )
        .await
    }

    async fn subscribe(
        &self,
        partition_id: &str,
        start: StartPosition,
        events: EventSender,
    ) -> BindingResult<Subscription> {
        let partition: i32 = partition_id
            .parse()
            .map_err(|_| BindingError::read(format!("Invalid partition id: {}", partition_id)))?;

        let consumer: StreamConsumer = self
            .consumer_config(partition_id, start)
            .create()
            .map_err(|e| {
                BindingError::read_with_source(
                    format!("Failed to create receiver for partition {}", partition_id),
                    e,
                )
            })?;

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(&self.options.event_hub, partition, start.into())
            .map_err(|e| {
                BindingError::read_with_source(
                    format!("Invalid start position for partition {}", partition_id),
                    e,
                )
            })?;
        consumer.assign(&assignment).map_err(|e| {
            BindingError::read_with_source(
                format!("Failed to subscribe to partition {}", partition_id),
                e,
            )
        })?;

        let token = CancellationToken::new();
        let task = tokio::spawn(receive_loop(
            consumer,
            partition_id.to_string(),
            events,
            token.clone(),
        ));

        debug!(partition = %partition_id, start = ?start, "Partition receiver started");
        Ok(Subscription::new(partition_id, token, task))
    }

    async fn close(&self) -> BindingResult<()> {
        let producer = self.producer.clone();
        let timeout = self.options.send_timeout;

        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| BindingError::write_with_source("Flush was aborted", e))?
            .map_err(|e| BindingError::write_with_source("Failed to flush pending events", e))?;

        debug!(event_hub = %self.options.event_hub, "Event Hubs client closed");
        Ok(())
    }
}

/// Forward events from one partition until cancelled or the receiver is gone
async fn receive_loop(
    consumer: StreamConsumer,
    partition_id: String,
    events: EventSender,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = consumer.recv() => received,
        };

        match received {
            Ok(message) => {
                let event = ReceivedEvent {
                    partition_id: partition_id.clone(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec),
                    enqueued_time: message
                        .timestamp()
                        .to_millis()
                        .and_then(DateTime::from_timestamp_millis),
                };

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = events.send(event) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(partition = %partition_id, error = %e, "Error receiving from partition");
            }
        }
    }

    debug!(partition = %partition_id, "Partition receiver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_string::ConnectionString;

    fn options(skip_tls_verify: bool) -> ClientOptions {
        ClientOptions {
            connection: ConnectionString::parse(
                "Endpoint=sb://orders-ns.servicebus.windows.net/;SharedAccessKeyName=app;SharedAccessKey=a2V5;EntityPath=orders",
            )
            .unwrap(),
            event_hub: "orders".to_string(),
            consumer_group: "$Default".to_string(),
            skip_tls_verify,
            send_timeout: Duration::from_secs(5),
        }
    }

    fn entry<'a>(entries: &'a [(String, String)], key: &str) -> Option<&'a str> {
        entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_client_config_entries() {
        let opts = options(false);
        let entries = client_config_entries(&opts);

        assert_eq!(
            entry(&entries, "bootstrap.servers"),
            Some("orders-ns.servicebus.windows.net:9093")
        );
        assert_eq!(entry(&entries, "security.protocol"), Some("sasl_ssl"));
        assert_eq!(entry(&entries, "sasl.mechanism"), Some("PLAIN"));
        assert_eq!(entry(&entries, "sasl.username"), Some("$ConnectionString"));
        assert_eq!(
            entry(&entries, "sasl.password"),
            Some(opts.connection.as_str())
        );
        assert_eq!(entry(&entries, "enable.ssl.certificate.verification"), None);
    }

    #[test]
    fn test_skip_tls_verify_is_scoped_to_client() {
        let relaxed = client_config_entries(&options(true));
        assert_eq!(
            entry(&relaxed, "enable.ssl.certificate.verification"),
            Some("false")
        );

        // A second client built afterwards is unaffected
        let strict = client_config_entries(&options(false));
        assert_eq!(entry(&strict, "enable.ssl.certificate.verification"), None);
    }

    #[test]
    fn test_start_position_offsets() {
        assert_eq!(Offset::from(StartPosition::Latest), Offset::End);
        assert_eq!(Offset::from(StartPosition::Earliest), Offset::Beginning);
    }

    #[tokio::test]
    async fn test_consumer_config() {
        let producer: FutureProducer = client_config(&options(false)).create().unwrap();
        let client = KafkaHubClient {
            producer,
            options: options(false),
        };

        let config = client.consumer_config("3", StartPosition::Earliest);
        assert_eq!(config.get("group.id"), Some("$Default"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert!(config
            .get("client.id")
            .map(|id| id.starts_with("orders-3-"))
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_send_timeout_bounds_create_client() {
        for millis in [10, 300_000] {
            let mut opts = options(false);
            opts.send_timeout = Duration::from_millis(millis);

            let created: Result<FutureProducer, _> = client_config(&opts).create();
            assert!(created.is_ok(), "socket.timeout.ms {} rejected", millis);
        }
    }

    #[tokio::test]
    async fn test_connect_unreachable_namespace() {
        let mut opts = options(false);
        opts.connection = ConnectionString::parse(
            "Endpoint=sb://127.0.0.1:1/;SharedAccessKeyName=app;SharedAccessKey=a2V5;EntityPath=orders",
        )
        .unwrap();
        opts.send_timeout = Duration::from_secs(2);

        let result = tokio::time::timeout(
            Duration::from_secs(30),
            KafkaConnector::new().connect(&opts),
        )
        .await
        .expect("connect hung");

        assert!(matches!(result, Err(e) if e.is_connection()));
    }

    #[tokio::test]
    #[ignore] // Requires an Event Hubs namespace in EVENTHUBS_CONNECTION_STRING
    async fn test_live_round_trip() {
        let conn = std::env::var("EVENTHUBS_CONNECTION_STRING").unwrap();
        let connection = ConnectionString::parse(&conn).unwrap();
        let opts = ClientOptions {
            event_hub: connection.entity_path().unwrap().to_string(),
            connection,
            consumer_group: "$Default".to_string(),
            skip_tls_verify: false,
            send_timeout: Duration::from_secs(30),
        };

        let client = KafkaConnector::new().connect(&opts).await.unwrap();
        let partitions = client.partition_ids().await.unwrap();
        assert!(!partitions.is_empty());

        client.send(b"live-test", &HashMap::new()).await.unwrap();
        client.close().await.unwrap();
    }
}
