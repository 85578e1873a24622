//! `pipebus`: embedded topic-based publish/subscribe broker.
//!
//! Every subscriber owns a bounded FIFO pipe; publishers fan a value out to
//! all pipes of a topic and wait for each enqueue, so a slow subscriber
//! applies back-pressure instead of silently losing values.

/// Broker and logging configuration loading.
pub mod config;
/// Structured logging setup on top of `tracing`.
pub mod logging;
/// Pub/Sub: Broker, Pipe, Subscription.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Configuration.
pub use config::{BrokerConfig, Settings};
/// Logging setup.
pub use logging::{init_logging, LogFormat, LoggingConfig};
/// Error types, status codes and helpers.
pub use pipebus_error::{
    bail, context, ensure, DeliveryFailure, ErrorExt, GenericError, PipeError, PipebusResult,
    PubSubError, ResultExt, StackError, StatusCode,
};
/// Pub/Sub API.
pub use pubsub::{Broker, BrokerStats, Pipe, Subscription};
