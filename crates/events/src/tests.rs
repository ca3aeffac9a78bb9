use alloy_primitives::U256;
use trellis_common::event::EventKind;

use crate::{EventChannel, TrellisEvent};

#[tokio::test]
async fn test_subscribers_receive_formatted_events() {
    let channel = EventChannel::new();
    let mut subscriber = channel.subscribe();
    let publisher = channel.publisher();

    publisher.send(TrellisEvent::RootsUpdated {
        deposits: 4,
        withdrawals: 0,
        reward: U256::from(500u64),
    });

    let info = subscriber.recv().await.unwrap();
    assert!(!info.is_error());
    assert_eq!(
        info.formatted_log,
        "Updated roots with 4 deposits and 0 withdrawals, earned 500"
    );
}

#[test]
fn test_publishing_without_subscribers_does_not_fail() {
    let channel = EventChannel::new();
    channel.publisher().send(TrellisEvent::Ready);

    let mut late = channel.subscribe();
    assert!(late.try_recv().is_err());
}

#[test]
fn test_error_classification() {
    let failed = TrellisEvent::ProverFailed {
        kind: EventKind::Withdrawal,
        error: "prover timed out after 5s".to_string(),
    };
    assert!(failed.is_error());
    assert!(!TrellisEvent::LostRace { error: String::new() }.is_error());
}

#[test]
fn test_events_serialize_with_type_tag() {
    let json = serde_json::to_value(TrellisEvent::StreamAdjusted {
        previous: 100_000,
        current: 100_001,
    })
    .unwrap();
    assert_eq!(json["type"], "stream_adjusted");
    assert_eq!(json["current"], 100_001);
}
