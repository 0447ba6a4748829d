use futures::future::join_all;
use futures::StreamExt;
use nostr::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RouterConfig, DEFAULT_RELAY};
use crate::error::RouterError;
use crate::event::validate_event;
use crate::filter::QueryFilter;
use crate::transport::{RelayTransport, TransportError};

/// Relays targeted by a query: the first `max_relays` in priority order,
/// or the default relay when none are configured
pub fn select_query_relays(config: &RouterConfig) -> Vec<RelayUrl> {
    if config.relays().is_empty() {
        return RelayUrl::parse(DEFAULT_RELAY).into_iter().collect();
    }

    config
        .relays()
        .iter()
        .take(config.max_relays())
        .cloned()
        .collect()
}

/// Relays targeted by a publish: the active relay, then the first
/// `max_relays` in priority order, without duplicates
pub fn select_publish_relays(config: &RouterConfig) -> Vec<RelayUrl> {
    let mut selected = vec![config.active_relay().clone()];

    for url in config.relays().iter().take(config.max_relays()) {
        if !selected.contains(url) {
            selected.push(url.clone());
        }
    }

    selected
}

/// How a single relay call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    /// The relay finished answering before the deadline
    Completed,
    TimedOut,
    Failed(TransportError),
}

/// Per-relay summary of a query.
#[derive(Debug, Clone)]
pub struct RelayReport {
    pub url: RelayUrl,
    pub status: RelayStatus,
    /// Events received, before validation and deduplication
    pub events_received: usize,
}

/// Merged result of a query.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub events: Vec<Event>,
    pub duplicates_removed: usize,
    pub malformed_dropped: usize,
    pub relays: Vec<RelayReport>,
}

/// Relays that accepted or refused a published event.
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub accepted: Vec<RelayUrl>,
    pub failed: Vec<(RelayUrl, TransportError)>,
}

struct RelayBatch {
    url: RelayUrl,
    status: RelayStatus,
    events: Vec<Event>,
}

/// Fans queries and publishes out to several relays.
///
/// The router holds no mutable state besides the configuration snapshot.
/// Every operation captures the snapshot when it starts, and
/// [`replace_configuration`](Self::replace_configuration) installs a new one
/// without touching operations in flight.
pub struct RelayQueryRouter<T: RelayTransport> {
    transport: Arc<T>,
    config: RwLock<Arc<RouterConfig>>,
}

impl<T: RelayTransport> RelayQueryRouter<T> {
    pub fn new(transport: T, config: RouterConfig) -> Self {
        Self::with_shared_transport(Arc::new(transport), Arc::new(config))
    }

    pub fn with_shared_transport(transport: Arc<T>, config: Arc<RouterConfig>) -> Self {
        Self {
            transport,
            config: RwLock::new(config),
        }
    }

    /// The configuration new operations will use
    pub fn config(&self) -> Arc<RouterConfig> {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swap in a new configuration. Operations already running keep theirs.
    pub fn replace_configuration(&self, config: RouterConfig) {
        info!(
            "[CONFIG] Replacing router configuration: {} relays, max {}",
            config.relays().len(),
            config.max_relays()
        );

        let config = Arc::new(config);
        match self.config.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Query the selected relays and return the merged events.
    ///
    /// `timeout_override` shortens the configured query timeout; the earlier deadline
    /// wins.
    pub async fn query(
        &self,
        filters: &[QueryFilter],
        timeout_override: Option<Duration>,
    ) -> Result<Vec<Event>, RouterError> {
        self.query_detailed(filters, timeout_override, None)
            .await
            .map(|output| output.events)
    }

    /// Like [`query`](Self::query), also reporting per-relay outcomes and
    /// honoring a cancellation token.
    pub async fn query_detailed(
        &self,
        filters: &[QueryFilter],
        timeout_override: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<QueryOutput, RouterError> {
        let config = self.config();

        let effective_timeout = match timeout_override {
            Some(t) => t.min(config.query_timeout()),
            None => config.query_timeout(),
        };
        let deadline = Instant::now() + effective_timeout;

        let relays = select_query_relays(&config);
        info!(
            "[QUERY] Querying {} relay(s) with {} filter(s), timeout {:?}: {:?}",
            relays.len(),
            filters.len(),
            effective_timeout,
            relays.iter().map(|url| url.to_string()).collect::<Vec<_>>()
        );

        let calls = join_all(
            relays
                .iter()
                .map(|url| self.fetch_from_relay(url.clone(), filters, deadline)),
        );

        let batches = match cancel {
            Some(token) => {
                tokio::select! {
                    batches = calls => batches,
                    _ = token.cancelled() => {
                        info!("[QUERY] Cancelled with {} relay call(s) in flight", relays.len());
                        return Err(RouterError::Cancelled);
                    }
                }
            }
            None => calls.await,
        };

        let output = merge_batches(batches, config.enable_deduplication());

        let answered = output
            .relays
            .iter()
            .any(|report| report.status == RelayStatus::Completed);

        if !answered && output.events.is_empty() {
            warn!("[QUERY] No relay answered ({} attempted)", relays.len());
            return Err(RouterError::QueryTimeoutOrUnavailable {
                attempted: relays.len(),
            });
        }

        info!(
            "[QUERY] Returning {} events ({} duplicates removed, {} malformed dropped)",
            output.events.len(),
            output.duplicates_removed,
            output.malformed_dropped
        );

        Ok(output)
    }

    /// Query one relay, keeping whatever arrived before the deadline
    async fn fetch_from_relay(
        &self,
        url: RelayUrl,
        filters: &[QueryFilter],
        deadline: Instant,
    ) -> RelayBatch {
        let mut events = Vec::new();

        let result = timeout_at(deadline, async {
            self.transport.connect(&url).await?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut stream = self.transport.fetch(&url, filters, remaining).await?;

            while let Some(item) = stream.next().await {
                events.push(item?);
            }

            Ok::<(), TransportError>(())
        })
        .await;

        let status = match result {
            Ok(Ok(())) => {
                debug!("[QUERY] {} answered with {} events", url, events.len());
                RelayStatus::Completed
            }
            Ok(Err(e)) => {
                warn!("[QUERY] {} failed after {} events: {}", url, events.len(), e);
                RelayStatus::Failed(e)
            }
            Err(_) => {
                warn!("[QUERY] {} timed out after {} events", url, events.len());
                RelayStatus::TimedOut
            }
        };

        RelayBatch { url, status, events }
    }

    /// Publish a signed event to the active relay and the selected relays.
    ///
    /// Succeeds when at least one relay accepted the event.
    pub async fn publish(&self, event: &Event) -> Result<PublishReport, RouterError> {
        self.publish_inner(event, None).await
    }

    /// Like [`publish`](Self::publish), aborting every pending attempt when
    /// the token fires. Relays that already accepted keep the event.
    pub async fn publish_cancellable(
        &self,
        event: &Event,
        cancel: &CancellationToken,
    ) -> Result<PublishReport, RouterError> {
        self.publish_inner(event, Some(cancel)).await
    }

    async fn publish_inner(
        &self,
        event: &Event,
        cancel: Option<&CancellationToken>,
    ) -> Result<PublishReport, RouterError> {
        validate_event(event)?;

        let config = self.config();
        let relays = select_publish_relays(&config);
        let call_timeout = config.query_timeout();

        info!(
            "[PUBLISH] Publishing event {} (kind {}) to {} relay(s)",
            event.id,
            event.kind.as_u16(),
            relays.len()
        );

        let calls = join_all(relays.iter().map(|url| async move {
            let result = timeout(call_timeout, async {
                self.transport.connect(url).await?;
                self.transport.publish(url, event, call_timeout).await
            })
            .await
            .unwrap_or(Err(TransportError::Timeout));
            (url.clone(), result)
        }));

        let results = match cancel {
            Some(token) => {
                tokio::select! {
                    results = calls => results,
                    _ = token.cancelled() => {
                        info!("[PUBLISH] Cancelled publish of {}", event.id);
                        return Err(RouterError::Cancelled);
                    }
                }
            }
            None => calls.await,
        };

        let mut report = PublishReport::default();
        for (url, result) in results {
            match result {
                Ok(()) => {
                    debug!("[PUBLISH] {} accepted {}", url, event.id);
                    report.accepted.push(url);
                }
                Err(e) => {
                    warn!("[PUBLISH] {} failed for {}: {}", url, event.id, e);
                    report.failed.push((url, e));
                }
            }
        }

        if report.accepted.is_empty() {
            return Err(RouterError::PublishRejectedByAll {
                attempted: relays.len(),
                failures: report.failed,
            });
        }

        info!(
            "[PUBLISH] Event {} accepted by {}/{} relay(s)",
            event.id,
            report.accepted.len(),
            relays.len()
        );

        Ok(report)
    }
}

/// Merge relay batches in selection order, dropping malformed events and,
/// when enabled, later copies of an id already seen.
fn merge_batches(batches: Vec<RelayBatch>, deduplicate: bool) -> QueryOutput {
    let mut output = QueryOutput::default();
    let mut seen: HashSet<EventId> = HashSet::new();

    for batch in batches {
        output.relays.push(RelayReport {
            url: batch.url.clone(),
            status: batch.status,
            events_received: batch.events.len(),
        });

        for event in batch.events {
            if let Err(e) = validate_event(&event) {
                debug!("[QUERY] Dropping malformed event {} from {}: {}", event.id, batch.url, e);
                output.malformed_dropped += 1;
                continue;
            }

            if deduplicate && !seen.insert(event.id) {
                output.duplicates_removed += 1;
                continue;
            }

            output.events.push(event);
        }
    }

    output
}
