use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, B256, LogData, address};
use ocr_relay::{
    error::RelayError,
    log::LogListener,
    service::ServiceState,
    store::InMemoryStore,
    testing::{self, FlakyLedger, FlakyStore, ManualBroadcaster},
    tracker::RoundTracker,
    types::{self, EventId, EventPosition},
};

const CONTRACT: Address = address!("0x03bd0d5d39629423979f8a0e53dbce78c1791ebf");
const JOB_ID: types::JobId = 42;

type Tracker = RoundTracker<FlakyStore, FlakyLedger, ManualBroadcaster>;

fn tracker(store: &InMemoryStore) -> Arc<Tracker> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Arc::new(RoundTracker::new(
        CONTRACT,
        JOB_ID,
        FlakyStore::new(store.clone()),
        FlakyLedger::new(store.round_ledger(JOB_ID)),
        ManualBroadcaster::new(store.clone()),
    ))
}

fn digest(byte: u8) -> B256 { B256::repeat_byte(byte) }

fn log(position: (u64, u32, u32), digest_byte: u8, epoch: u32, round: u8) -> alloy::rpc::types::Log {
    testing::round_requested_log(
        CONTRACT,
        EventPosition::new(position.0, position.1, position.2),
        digest(digest_byte),
        epoch,
        round,
    )
}

fn latest(tracker: &Tracker) -> types::Round {
    tracker.latest_round_requested(Duration::ZERO).unwrap()
}

/// Tests acceptance order on a sequence of round requests.
#[tokio::test]
async fn test_latest_round_requested() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.start().await.unwrap();
    let feed = tracker.broadcaster().clone();

    // Nothing requested yet
    assert!(latest(&tracker).is_zero());
    assert_eq!(tracker.latest_record(), None);

    let first = log((1, 1, 1), 0xaa, 1, 1);
    feed.deliver(&first).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xaa), 1, 1));

    // Later log of the same transaction supersedes
    feed.deliver(&log((1, 1, 2), 0xbb, 1, 9)).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xbb), 1, 9));

    // Redelivered earlier log is ignored
    feed.deliver(&first).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xbb), 1, 9));

    // Stale log never seen before is ignored too
    feed.deliver(&log((1, 0, 7), 0xdd, 0, 3)).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xbb), 1, 9));

    // Block number dominates epoch and round
    feed.deliver(&log((2, 1, 1), 0xcc, 2, 1)).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xcc), 2, 1));

    let record = tracker.latest_record().unwrap();
    assert_eq!(record.position(), EventPosition::new(2, 1, 1));
    assert_eq!(record.requester(), testing::REQUESTER);
    assert_eq!(store.latest_round_requested(JOB_ID), Some(record));
    assert_eq!(tracker.ledger().num_saves(), 3);
    // Every delivered log ends up consumed
    assert_eq!(store.num_consumed(), 4);
}

#[tokio::test]
async fn test_duplicate_delivery_saves_once() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.start().await.unwrap();

    let log = log((5, 0, 0), 0xaa, 3, 2);
    for _ in 0..3 {
        tracker.handle_log(&log).await;
    }
    assert_eq!(latest(&tracker), types::Round::new(digest(0xaa), 3, 2));
    assert_eq!(tracker.ledger().num_saves(), 1);
    assert!(store.consumption_mark(&EventId::from_log(&log, JOB_ID)).is_some());
}

/// Tests the outcome does not depend on the delivery order.
#[tokio::test]
async fn test_replay_converges_to_latest_position() {
    let logs = [
        log((1, 1, 2), 0x01, 1, 1),
        log((1, 1, 1), 0x02, 1, 2),
        log((1, 2, 3), 0x03, 1, 3),
        log((2, 2, 2), 0x04, 1, 4),
        log((3, 2, 5), 0x05, 1, 5),
        log((3, 0, 1), 0x06, 1, 6),
    ];
    let orders: [&[usize]; 5] = [
        &[0, 1, 2, 3, 4, 5],
        &[5, 4, 3, 2, 1, 0],
        &[4, 0, 4, 1, 5, 2, 3],
        &[2, 5, 3, 3, 0, 4, 1],
        &[3, 1, 4, 2, 0, 5, 4, 4],
    ];

    for order in orders {
        let store = InMemoryStore::new();
        let tracker = tracker(&store);
        tracker.start().await.unwrap();
        for &i in order {
            tracker.handle_log(&logs[i]).await;
        }
        assert_eq!(latest(&tracker), types::Round::new(digest(0x05), 1, 5), "order {order:?}");
        assert_eq!(
            store.latest_round_requested(JOB_ID).map(|r| r.position()),
            Some(EventPosition::new(3, 2, 5))
        );
    }
}

#[tokio::test]
async fn test_failed_save_leaves_state_untouched() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.start().await.unwrap();

    let accepted = log((1, 0, 0), 0xaa, 1, 1);
    tracker.handle_log(&accepted).await;

    let next = log((2, 0, 0), 0xbb, 1, 2);
    tracker.ledger().fail_saves(1);
    tracker.handle_log(&next).await;

    assert_eq!(latest(&tracker), types::Round::new(digest(0xaa), 1, 1));
    assert_eq!(store.latest_round_requested(JOB_ID).map(|r| r.config_digest()), Some(digest(0xaa)));
    assert!(store.consumption_mark(&EventId::from_log(&next, JOB_ID)).is_none());

    // Redelivery succeeds once the ledger recovers
    tracker.handle_log(&next).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xbb), 1, 2));
    assert!(store.consumption_mark(&EventId::from_log(&next, JOB_ID)).is_some());
}

#[tokio::test]
async fn test_failed_commit_leaves_state_untouched() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.start().await.unwrap();

    let accepted = log((1, 0, 0), 0xaa, 1, 1);
    tracker.handle_log(&accepted).await;
    assert_eq!(tracker.datasource().num_commits(), 1);

    let next = log((2, 0, 0), 0xbb, 1, 2);
    tracker.datasource().fail_commits(1);
    tracker.handle_log(&next).await;

    // Save was staged but never committed
    assert_eq!(tracker.ledger().num_saves(), 2);
    assert_eq!(latest(&tracker), types::Round::new(digest(0xaa), 1, 1));
    assert_eq!(store.latest_round_requested(JOB_ID).map(|r| r.config_digest()), Some(digest(0xaa)));
    assert!(store.consumption_mark(&EventId::from_log(&next, JOB_ID)).is_none());
    assert_eq!(store.num_consumed(), 1);

    tracker.handle_log(&next).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xbb), 1, 2));
    assert!(store.consumption_mark(&EventId::from_log(&next, JOB_ID)).is_some());
    assert_eq!(tracker.datasource().num_commits(), 2);
}

/// Tests logs of different transactions sharing a log index are told apart.
#[tokio::test]
async fn test_same_log_index_in_later_transaction() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.start().await.unwrap();

    let first = log((1, 1, 1), 0xaa, 1, 1);
    let second = log((1, 2, 1), 0xbb, 1, 2);
    assert_ne!(EventId::from_log(&first, JOB_ID), EventId::from_log(&second, JOB_ID));

    tracker.handle_log(&first).await;
    tracker.handle_log(&second).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xbb), 1, 2));
    assert_eq!(tracker.latest_record().map(|r| r.position()), Some(EventPosition::new(1, 2, 1)));
    assert_eq!(tracker.ledger().num_saves(), 2);
    assert_eq!(store.num_consumed(), 2);
}

#[tokio::test]
async fn test_restart_restores_latest_round() {
    let store = InMemoryStore::new();
    let first_run = tracker(&store);
    first_run.start().await.unwrap();
    first_run.handle_log(&log((7, 3, 1), 0xaa, 4, 2)).await;
    first_run.close().unwrap();

    let second_run = tracker(&store);
    assert!(latest(&second_run).is_zero());
    second_run.start().await.unwrap();
    assert_eq!(latest(&second_run), types::Round::new(digest(0xaa), 4, 2));

    // Earlier logs stay rejected after restart
    second_run.handle_log(&log((7, 3, 0), 0xbb, 5, 0)).await;
    assert_eq!(latest(&second_run), types::Round::new(digest(0xaa), 4, 2));
    assert_eq!(second_run.ledger().num_saves(), 0);
}

#[tokio::test]
async fn test_failed_load_fails_start() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.ledger().fail_load(true);

    let err = tracker.start().await.unwrap_err();
    assert!(matches!(err, RelayError::LoadLatestRoundRequested(_)));
    assert!(err.to_string().starts_with("failed to load latest round requested"));
    assert_eq!(tracker.broadcaster().num_registrations(), 0);

    // A failed tracker cannot be retried
    tracker.ledger().fail_load(false);
    assert!(matches!(tracker.start().await, Err(RelayError::AlreadyStarted(_))));
}

#[tokio::test]
async fn test_ignores_foreign_and_malformed_logs() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.start().await.unwrap();

    // Logs of another contract
    let foreign = testing::round_requested_log(
        address!("0x00000000000000000000000000000000deadbeef"),
        EventPosition::new(9, 0, 0),
        digest(0xee),
        9,
        9,
    );
    tracker.handle_log(&foreign).await;
    assert!(store.consumption_mark(&EventId::from_log(&foreign, JOB_ID)).is_some());

    // Logs without topics
    let anonymous = testing::log_at(
        CONTRACT,
        EventPosition::new(9, 0, 1),
        LogData::new_unchecked(vec![], Default::default()),
    );
    tracker.handle_log(&anonymous).await;
    assert!(store.consumption_mark(&EventId::from_log(&anonymous, JOB_ID)).is_some());

    // Undecodable round requests
    let malformed = testing::log_at(
        CONTRACT,
        EventPosition::new(9, 0, 2),
        LogData::new_unchecked(
            vec![foreign.topics()[0], foreign.topics()[1]],
            vec![0x01, 0x02, 0x03].into(),
        ),
    );
    tracker.handle_log(&malformed).await;
    assert!(store.consumption_mark(&EventId::from_log(&malformed, JOB_ID)).is_some());

    // Unknown events are left for other consumers
    let unknown = testing::log_at(
        CONTRACT,
        EventPosition::new(9, 0, 3),
        LogData::new_unchecked(vec![B256::repeat_byte(0x42)], Default::default()),
    );
    tracker.handle_log(&unknown).await;
    assert!(store.consumption_mark(&EventId::from_log(&unknown, JOB_ID)).is_none());

    assert!(latest(&tracker).is_zero());
    assert_eq!(tracker.ledger().num_saves(), 0);
}

#[tokio::test]
async fn test_consumption_lookup_failure_retries_later() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.start().await.unwrap();

    let log = log((3, 0, 0), 0xaa, 1, 1);
    tracker.broadcaster().fail_consumption_checks(true);
    tracker.handle_log(&log).await;
    assert!(latest(&tracker).is_zero());
    assert_eq!(store.num_consumed(), 0);

    tracker.broadcaster().fail_consumption_checks(false);
    tracker.handle_log(&log).await;
    assert_eq!(latest(&tracker), types::Round::new(digest(0xaa), 1, 1));
}

#[tokio::test]
async fn test_first_round_at_genesis_position() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    tracker.start().await.unwrap();

    tracker.handle_log(&log((0, 0, 0), 0xaa, 0, 0)).await;
    let record = tracker.latest_record().unwrap();
    assert_eq!(record.position(), EventPosition::default());
    assert_eq!(tracker.ledger().num_saves(), 1);
}

#[tokio::test]
async fn test_lifecycle() {
    let store = InMemoryStore::new();
    let tracker = tracker(&store);
    let feed = tracker.broadcaster().clone();

    assert!(matches!(tracker.close(), Err(RelayError::NotStarted(_))));
    assert_eq!(tracker.state(), ServiceState::Unstarted);

    tracker.start().await.unwrap();
    assert_eq!(tracker.state(), ServiceState::Started);
    assert!(matches!(tracker.start().await, Err(RelayError::AlreadyStarted(_))));
    assert_eq!(feed.num_registrations(), 1);
    assert_eq!(feed.num_listeners(), 1);

    let opts = feed.last_opts().unwrap();
    assert_eq!(opts.contract, CONTRACT);
    assert_eq!(opts.topics.len(), 1);
    assert_eq!(opts.min_confirmations, 1);

    tracker.close().unwrap();
    assert_eq!(tracker.state(), ServiceState::Stopped);
    assert!(matches!(tracker.close(), Err(RelayError::AlreadyStopped(_))));
    assert_eq!(feed.num_unsubscribes(), 1);
    assert_eq!(feed.num_listeners(), 0);

    // No deliveries after close
    feed.deliver(&log((1, 0, 0), 0xaa, 1, 1)).await;
    assert!(latest(&tracker).is_zero());
    assert_eq!(tracker.job_id(), JOB_ID);
}
