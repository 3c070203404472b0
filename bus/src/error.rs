//! Error taxonomy for the bus client.

use thiserror::Error;

/// Errors surfaced by [`crate::client::BusClient`].
///
/// Transient variants (`Pool`, `Redis`, `Connection`) are meant to be logged
/// at `warn` and retried by the caller's loop, per the network-error taxonomy
/// — they are never fatal on their own.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to bus: {0}")]
    Connection(String),

    #[error("bus pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("bus command failed: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("failed to create consumer group {group} on stream {stream}: {source}")]
    ConsumerGroup {
        stream: String,
        group: String,
        #[source]
        source: deadpool_redis::redis::RedisError,
    },

    #[error("malformed stream record: {0}")]
    MalformedRecord(String),
}
