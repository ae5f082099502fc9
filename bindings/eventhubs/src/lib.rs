//! Azure Event Hubs binding
//!
//! Publishes messages to an event hub and receives events from every partition
//! of a hub, talking to the namespace through its Kafka-compatible endpoint.
//!
//! ## Metadata
//!
//! | key                  | required | default    |
//! |----------------------|----------|------------|
//! | `connectionString`   | yes      |            |
//! | `eventHub`           | no       | `EntityPath` of the connection string |
//! | `consumerGroup`      | no       | `$Default` |
//! | `startPosition`      | no       | `latest`   |
//! | `skipTlsVerify`      | no       | `false`    |
//! | `handlerErrorPolicy` | no       | `continue` |
//! | `sendTimeoutMs`      | no       | `30000`    |
//!
//! ## Example
//!
//! ```rust,no_run
//! use binding_core::{Binding, BindingMetadata, OutputBinding, WriteRequest};
//! use binding_eventhubs::EventHubsBinding;
//!
//! # async fn send() -> binding_core::BindingResult<()> {
//! let mut binding = EventHubsBinding::new("orders");
//! binding
//!     .init(BindingMetadata::new().with_property(
//!         "connectionString",
//!         "Endpoint=sb://orders-ns.servicebus.windows.net/;SharedAccessKeyName=app;SharedAccessKey=...;EntityPath=orders",
//!     ))
//!     .await?;
//!
//! binding.write(WriteRequest::from_string("hello")).await?;
//! # Ok(())
//! # }
//! ```

mod binding;
mod client;
mod config;
mod connection_string;
mod kafka;

#[cfg(test)]
mod testing;

pub use binding::EventHubsBinding;
pub use client::{
    close_all, ClientOptions, EventSender, ReceivedEvent, StartPosition, StreamClient,
    StreamConnector, Subscription,
};
pub use config::{apply_metadata_overrides, load_config, EventHubsMetadata};
pub use connection_string::{ConnectionString, KAFKA_ENDPOINT_PORT};
pub use kafka::{client_config_entries, KafkaConnector, KafkaHubClient};
