/// Advertise/subscribe surface with long-lived publisher and subscriber handles.
pub mod bridge;
/// Bridge settings and publisher options.
pub mod config;
/// Tagged binary envelope for payload values.
pub mod envelope;
/// Flexible logging (filters, console and file sinks).
pub mod logging;
/// Direct publish/subscribe keyed by channel name.
pub mod messenger;
/// Publisher and subscriber handles over a shared broker connection.
pub mod pubsub;
/// Channel name to broker topic resolution.
pub mod router;
/// Broker transports: in-memory and NSQ TCP.
pub mod transport;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Bridge and consumer group identifiers.
pub use bridge::{Bridge, GroupId};
/// Settings.
pub use config::{AdvertiseOptions, BridgeSettings};
/// Payload values and codec entry points.
pub use envelope::{decode, encode, Value, ValueKind, ValueMap};
/// Logging initialisation.
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingHandle};
/// Direct messenger.
pub use messenger::Messenger;
/// Error types and result alias.
pub use nsqbridge_error::{
    BridgeError, BridgeResult, ConfigError, DecodeError, EncodeError, ErrorExt, RouteError,
    StatusCode, TransportError,
};
/// Handles.
pub use pubsub::{
    handler_fn, HandleId, HandleInfo, HandleKind, Handler, Publisher, Subscriber, SubscriberState,
};
/// Router.
pub use router::{PatternRouter, DEFAULT_PATTERN};
/// Transports and broker names.
pub use transport::{
    ConsumerGroup, MemoryBroker, NsqTransport, Topic, Transport, DEFAULT_GROUP,
};
