/// Client side of the wire protocol: producers and consumers.
pub mod client;
/// Broker configuration loading.
pub mod config;
/// Delivery tags, outcomes and the acknowledgement tracker.
pub mod delivery;
/// Link handlers moving messages between links and queues.
pub mod link;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Network stack: wire protocol, connections and the broker server.
pub mod network;
/// Protocol-facing traits the link handlers are written against.
pub mod protocol;
/// Bounded queues and the exchange registry.
pub mod queue;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Producer and consumer handles.
pub use client::{ClientConfig, Consumer, Producer, Received};
/// Configuration.
pub use config::{OverflowPolicy, Provisioning, QueueSpec, Settings};
/// Delivery tracking.
pub use delivery::{
    AckTracker, DeliveryOutcome, DeliveryTag, InFlightDelivery, Outcome, OutcomeSender,
    TrackerClosed, TrackerHandle, TrackerSnapshot, TrackerStats,
};
/// Link handlers.
pub use link::{run_receiver, run_sender, LinkContext, ReceiverReport, SenderReport};
/// Broker server.
pub use network::Broker;
/// Queues.
pub use queue::{EnqueueError, Exchange, Message, Queue};
/// Error vocabulary.
pub use zumq_error::{ClientError, ErrorExt, LinkError, ProtocolError, QueueError, StatusCode};
