//! Error types for the relay router

use nostr::RelayUrl;
use thiserror::Error;

use crate::event::MalformedEvent;
use crate::transport::TransportError;

/// Invalid or unreadable router configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid relay url '{url}': {reason}")]
    InvalidRelayUrl { url: String, reason: String },

    #[error("max_relays must be at least 1, got {0}")]
    MaxRelays(usize),

    #[error("query_timeout_ms must be between 1 and {max}, got {value}")]
    QueryTimeout { value: u64, max: u64 },

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Failures surfaced to callers of the router.
///
/// Single-relay failures are not in here: they are absorbed as long as another
/// relay answered and show up only in the per-call reports.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("No relay answered before the deadline ({attempted} attempted)")]
    QueryTimeoutOrUnavailable { attempted: usize },

    #[error("Every relay rejected the event ({attempted} attempted)")]
    PublishRejectedByAll {
        attempted: usize,
        failures: Vec<(RelayUrl, TransportError)>,
    },

    #[error("Refusing to publish malformed event: {0}")]
    MalformedEvent(#[from] MalformedEvent),

    #[error("Operation cancelled")]
    Cancelled,
}
