pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod relay_router;
pub mod replaceable;
pub mod transport;

// Re-export commonly used types for convenience
pub use config::{
    load_router_config,
    load_router_config_with_preset,
    Config,
    RelayPreset,
    RouterConfig,
};
pub use error::{ConfigError, RouterError};
pub use event::{parse_tags, validate_event, EventTag, MalformedEvent};
pub use filter::{event_matches_filters, QueryFilter};
pub use relay_router::{
    select_publish_relays,
    select_query_relays,
    PublishReport,
    QueryOutput,
    RelayQueryRouter,
    RelayReport,
    RelayStatus,
};
pub use replaceable::{latest_versions, Coordinate};
pub use transport::{
    MockBehavior,
    MockTransport,
    NostrSdkTransport,
    RelayTransport,
    TransportError,
};

// Re-export nostr types that callers need to build filters and handle results
pub use nostr::{Event, RelayUrl, Timestamp};
pub use tokio_util::sync::CancellationToken;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
