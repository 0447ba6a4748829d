use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt};
use nostr_sdk::prelude::*;
use std::time::Duration;
use tracing::debug;

use super::{EventStream, RelayTransport, TransportError};
use crate::filter::{convert_filters_to_nostr, QueryFilter};

/// Relay transport backed by a `nostr_sdk::Client` relay pool.
///
/// Relays are added to the pool on first use and kept connected, so every
/// later call on the same relay reuses the connection.
#[derive(Clone)]
pub struct NostrSdkTransport {
    client: Client,
}

impl NostrSdkTransport {
    pub fn new() -> Self {
        Self::from_client(Client::default())
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Access to the underlying client for custom operations
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

impl Default for NostrSdkTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayTransport for NostrSdkTransport {
    async fn connect(&self, url: &RelayUrl) -> Result<(), TransportError> {
        let added = self
            .client
            .add_relay(url.to_string())
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        if added {
            debug!("Added relay to pool: {}", url);
        }

        self.client
            .connect_relay(url.to_string())
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))
    }

    async fn fetch(
        &self,
        url: &RelayUrl,
        filters: &[QueryFilter],
        timeout: Duration,
    ) -> Result<EventStream, TransportError> {
        let requests = convert_filters_to_nostr(filters).into_iter().map(|filter| {
            self.client
                .fetch_events_from(vec![url.to_string()], filter, timeout)
        });

        let batches = future::try_join_all(requests)
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let events: Vec<Event> = batches.into_iter().flat_map(|events| events.into_iter()).collect();
        debug!("Relay {} returned {} events", url, events.len());

        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }

    async fn publish(
        &self,
        url: &RelayUrl,
        event: &Event,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let output = self
            .client
            .send_event_to(vec![url.to_string()], event)
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        if output.success.is_empty() {
            let reason = output
                .failed
                .into_values()
                .next()
                .unwrap_or_else(|| "no acknowledgement".to_string());
            return Err(TransportError::Rejected(reason));
        }

        Ok(())
    }
}
