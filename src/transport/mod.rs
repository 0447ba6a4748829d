//! Transport abstraction between the router and the relays.
//!
//! The router never owns a connection. Implementations open or reuse one per
//! relay and may share it between concurrent operations:
//! - `connect()` opens the connection, or reuses an existing one
//! - `fetch()` sends a query and yields the relay's events in its own order
//! - `publish()` sends a signed event and waits for the relay's verdict

mod mock;
mod sdk;

pub use mock::{MockBehavior, MockTransport};
pub use sdk::NostrSdkTransport;

use async_trait::async_trait;
use futures::stream::BoxStream;
use nostr::{Event, RelayUrl};
use std::time::Duration;
use thiserror::Error;

use crate::filter::QueryFilter;

/// Events streamed back by a relay for one query.
pub type EventStream = BoxStream<'static, Result<Event, TransportError>>;

/// Failure of a single relay call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection or call failed.
    #[error("relay unreachable: {0}")]
    Unreachable(String),

    /// The relay refused the event.
    #[error("rejected by relay: {0}")]
    Rejected(String),

    /// No answer before the deadline.
    #[error("timed out")]
    Timeout,
}

/// Lower-level relay client used by the router.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Open a connection to the relay, or reuse the existing one.
    async fn connect(&self, url: &RelayUrl) -> Result<(), TransportError>;

    /// Send the filters to one relay.
    ///
    /// `timeout` is the time left until the caller's deadline. The router
    /// enforces the deadline on its own, so implementations may ignore it.
    async fn fetch(
        &self,
        url: &RelayUrl,
        filters: &[QueryFilter],
        timeout: Duration,
    ) -> Result<EventStream, TransportError>;

    /// Publish a signed event to one relay.
    async fn publish(
        &self,
        url: &RelayUrl,
        event: &Event,
        timeout: Duration,
    ) -> Result<(), TransportError>;
}
