//! Mock transport for testing.
//!
//! Each relay is scripted with a set of stored events and a behavior. Calls
//! are recorded so tests can check which relays were targeted.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use nostr::{Event, EventId, RelayUrl};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{EventStream, RelayTransport, TransportError};
use crate::filter::event_matches_filters;
use crate::filter::QueryFilter;

/// How a scripted relay answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Answer after the given delay.
    Respond { delay: Duration },
    /// Never answer.
    Hang,
    /// Stream the first `after` matching events, then never finish.
    Stall { after: usize },
    /// Fail every call.
    Fail(String),
}

impl Default for MockBehavior {
    fn default() -> Self {
        MockBehavior::Respond {
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct MockRelay {
    events: Vec<Event>,
    behavior: MockBehavior,
    reject_publish: Option<String>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    relays: HashMap<RelayUrl, MockRelay>,
    connected: Vec<RelayUrl>,
    queried: Vec<RelayUrl>,
    published: Vec<(RelayUrl, EventId)>,
}

/// Mock transport for testing.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
    /// Create a new mock transport with no relays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relay answering immediately with the given events.
    pub fn add_relay(&self, url: &RelayUrl, events: Vec<Event>) {
        let mut inner = self.inner.lock().unwrap();
        inner.relays.insert(
            url.clone(),
            MockRelay {
                events,
                ..Default::default()
            },
        );
    }

    /// Change how a registered relay answers.
    pub fn set_behavior(&self, url: &RelayUrl, behavior: MockBehavior) {
        let mut inner = self.inner.lock().unwrap();
        inner.relays.entry(url.clone()).or_default().behavior = behavior;
    }

    /// Answer queries on this relay after a delay.
    pub fn delay(&self, url: &RelayUrl, delay: Duration) {
        self.set_behavior(url, MockBehavior::Respond { delay });
    }

    /// Make every publish on this relay fail with the given reason.
    pub fn reject_publishes(&self, url: &RelayUrl, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.relays.entry(url.clone()).or_default().reject_publish = Some(reason.to_string());
    }

    /// Relays that received a query, in call order.
    pub fn queried_relays(&self) -> Vec<RelayUrl> {
        self.inner.lock().unwrap().queried.clone()
    }

    /// Relays that accepted a publish, with the event id.
    pub fn published(&self) -> Vec<(RelayUrl, EventId)> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Relays a connection was requested for, in call order.
    pub fn connected_relays(&self) -> Vec<RelayUrl> {
        self.inner.lock().unwrap().connected.clone()
    }

    fn behavior(&self, url: &RelayUrl) -> Result<MockBehavior, TransportError> {
        let inner = self.inner.lock().unwrap();
        inner
            .relays
            .get(url)
            .map(|relay| relay.behavior.clone())
            .ok_or_else(|| TransportError::Unreachable(format!("unknown relay {}", url)))
    }
}

/// Wait according to the behavior, failing if it says so.
async fn act(behavior: MockBehavior) -> Result<(), TransportError> {
    match behavior {
        MockBehavior::Respond { delay } => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }
        MockBehavior::Hang | MockBehavior::Stall { .. } => futures::future::pending().await,
        MockBehavior::Fail(reason) => Err(TransportError::Unreachable(reason)),
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    async fn connect(&self, url: &RelayUrl) -> Result<(), TransportError> {
        let behavior = self.behavior(url)?;
        self.inner.lock().unwrap().connected.push(url.clone());

        match behavior {
            MockBehavior::Fail(reason) => Err(TransportError::Unreachable(reason)),
            _ => Ok(()),
        }
    }

    async fn fetch(
        &self,
        url: &RelayUrl,
        filters: &[QueryFilter],
        _timeout: Duration,
    ) -> Result<EventStream, TransportError> {
        let behavior = self.behavior(url)?;
        self.inner.lock().unwrap().queried.push(url.clone());

        let stall_after = match behavior {
            MockBehavior::Stall { after } => Some(after),
            other => {
                act(other).await?;
                None
            }
        };

        let events: Vec<Event> = {
            let inner = self.inner.lock().unwrap();
            inner
                .relays
                .get(url)
                .map(|relay| {
                    relay
                        .events
                        .iter()
                        .filter(|event| event_matches_filters(event, filters))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        match stall_after {
            Some(after) => Ok(stream::iter(events.into_iter().take(after).map(Ok))
                .chain(stream::pending())
                .boxed()),
            None => Ok(stream::iter(events.into_iter().map(Ok)).boxed()),
        }
    }

    async fn publish(
        &self,
        url: &RelayUrl,
        event: &Event,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let behavior = self.behavior(url)?;
        act(behavior).await?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.relays.get(url).and_then(|relay| relay.reject_publish.clone()) {
            return Err(TransportError::Rejected(reason));
        }

        inner.published.push((url.clone(), event.id));
        Ok(())
    }
}
