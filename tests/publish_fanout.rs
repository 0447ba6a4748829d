use nostr::prelude::*;
use relay_router::{
    CancellationToken, MockBehavior, MockTransport, RelayQueryRouter, RouterConfig, RouterError,
    TransportError,
};
use std::collections::HashSet;
use std::time::Duration;

fn url(s: &str) -> RelayUrl {
    RelayUrl::parse(s).unwrap()
}

fn config(relays: &[&str], active: &str, max_relays: usize) -> RouterConfig {
    RouterConfig::new(
        relays.iter().map(|r| url(r)).collect(),
        url(active),
        max_relays,
        true,
        Duration::from_millis(1000),
    )
    .unwrap()
}

fn signed_note() -> Event {
    EventBuilder::text_note("hello relays")
        .sign_with_keys(&Keys::generate())
        .unwrap()
}

fn mock_with(relays: &[&str]) -> MockTransport {
    let mock = MockTransport::new();
    for relay in relays {
        mock.add_relay(&url(relay), vec![]);
    }
    mock
}

fn published_to(mock: &MockTransport) -> HashSet<RelayUrl> {
    mock.published().into_iter().map(|(url, _)| url).collect()
}

#[tokio::test]
async fn test_publish_includes_active_relay_missing_from_list() {
    let relays = ["wss://a.example.com", "wss://b.example.com", "wss://c.example.com"];
    let active = "wss://active.example.com";
    let mock = mock_with(&relays);
    mock.add_relay(&url(active), vec![]);

    let router = RelayQueryRouter::new(mock.clone(), config(&relays, active, 2));
    let event = signed_note();
    let report = router.publish(&event).await.unwrap();

    assert_eq!(
        report.accepted,
        vec![url(active), url("wss://a.example.com"), url("wss://b.example.com")]
    );
    assert!(report.failed.is_empty());
    assert!(mock.published().iter().all(|(_, id)| *id == event.id));
}

#[tokio::test]
async fn test_publish_with_empty_relay_list_uses_active_relay() {
    let active = "wss://active.example.com";
    let mock = mock_with(&[active]);

    let router = RelayQueryRouter::new(mock.clone(), config(&[], active, 3));
    router.publish(&signed_note()).await.unwrap();

    assert_eq!(published_to(&mock), HashSet::from([url(active)]));
}

#[tokio::test]
async fn test_active_relay_in_list_is_targeted_once() {
    let relays = ["wss://a.example.com", "wss://b.example.com"];
    let mock = mock_with(&relays);

    let router = RelayQueryRouter::new(mock.clone(), config(&relays, "wss://b.example.com", 2));
    let report = router.publish(&signed_note()).await.unwrap();

    assert_eq!(report.accepted.len(), 2);
    assert_eq!(mock.published().len(), 2);
}

#[tokio::test]
async fn test_partial_rejection_is_not_an_error() {
    let relays = ["wss://a.example.com", "wss://b.example.com"];
    let mock = mock_with(&relays);
    mock.reject_publishes(&url(relays[1]), "blocked: spam");

    let router = RelayQueryRouter::new(mock.clone(), config(&relays, relays[0], 2));
    let report = router.publish(&signed_note()).await.unwrap();

    assert_eq!(report.accepted, vec![url(relays[0])]);
    assert_eq!(
        report.failed,
        vec![(url(relays[1]), TransportError::Rejected("blocked: spam".to_string()))]
    );
}

#[tokio::test]
async fn test_rejection_by_every_relay_is_an_error() {
    let relays = ["wss://a.example.com", "wss://b.example.com"];
    let mock = mock_with(&relays);
    mock.reject_publishes(&url(relays[0]), "auth-required");
    mock.set_behavior(&url(relays[1]), MockBehavior::Fail("connection reset".to_string()));

    let router = RelayQueryRouter::new(mock.clone(), config(&relays, relays[0], 2));
    let err = router.publish(&signed_note()).await.unwrap_err();

    match err {
        RouterError::PublishRejectedByAll { attempted, failures } => {
            assert_eq!(attempted, 2);
            assert_eq!(failures.len(), 2);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(mock.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_relay_times_out_without_blocking_others() {
    let relays = ["wss://a.example.com", "wss://slow.example.com"];
    let mock = mock_with(&relays);
    mock.set_behavior(&url(relays[1]), MockBehavior::Hang);

    let router = RelayQueryRouter::new(mock.clone(), config(&relays, relays[0], 2));
    let report = router.publish(&signed_note()).await.unwrap();

    assert_eq!(report.accepted, vec![url(relays[0])]);
    assert_eq!(report.failed, vec![(url(relays[1]), TransportError::Timeout)]);
}

#[tokio::test]
async fn test_malformed_event_is_refused_before_sending() {
    let relays = ["wss://a.example.com"];
    let mock = mock_with(&relays);

    let mut event = signed_note();
    event.content = "edited after signing".to_string();

    let router = RelayQueryRouter::new(mock.clone(), config(&relays, relays[0], 1));
    let err = router.publish(&event).await.unwrap_err();

    assert!(matches!(err, RouterError::MalformedEvent(_)));
    assert!(mock.connected_relays().is_empty());
    assert!(mock.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_cancellation() {
    let relays = ["wss://a.example.com", "wss://b.example.com"];
    let mock = mock_with(&relays);
    for relay in relays {
        mock.set_behavior(&url(relay), MockBehavior::Hang);
    }

    let router = RelayQueryRouter::new(mock.clone(), config(&relays, relays[0], 2));
    let token = CancellationToken::new();
    token.cancel();

    let result = router.publish_cancellable(&signed_note(), &token).await;
    assert!(matches!(result, Err(RouterError::Cancelled)));
    assert!(mock.published().is_empty());
}
