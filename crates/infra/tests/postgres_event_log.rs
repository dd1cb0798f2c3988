//! Postgres-backed event log against a live database.
//!
//! Runs only when `DATABASE_URL` points at a disposable Postgres; otherwise
//! every test returns early. Stream names are unique per run so the tests can
//! share one database and run in parallel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use estore_core::{NewEvent, StreamId};
use estore_infra::event_store::{EventLog, PoolSettings, PostgresEventLog, StorageGateway, schema};
use estore_infra::{EventService, StoreError, Subscription, SubscriptionOptions};
use serde_json::json;

type Service = EventService<Arc<PostgresEventLog>>;

async fn service() -> Option<Service> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres test");
        return None;
    };
    let gateway = StorageGateway::connect(&url, PoolSettings::default())
        .await
        .expect("failed to connect to DATABASE_URL");
    schema::initialize(&gateway).await.expect("schema initialize failed");

    Some(EventService::new(
        Arc::new(PostgresEventLog::new(gateway)),
        SubscriptionOptions {
            poll_interval: Duration::from_millis(20),
            batch_size: 7,
            buffer: 4,
        },
    ))
}

fn unique_stream(label: &str) -> StreamId {
    StreamId::new(format!("{label}-{}", uuid::Uuid::now_v7())).unwrap()
}

async fn append(svc: &Service, stream: &StreamId, name: &str, version: i64) -> Result<i64, StoreError> {
    svc.append(NewEvent::new(stream.clone(), name, json!({"v": version}), version))
        .await
        .map(|e| e.seq)
}

async fn next_event_in(sub: &mut Subscription, streams: &HashSet<StreamId>) -> i64 {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("timed out waiting for event")
            .expect("subscription ended")
            .expect("subscription failed");
        if streams.contains(&event.stream) {
            return event.seq;
        }
    }
}

#[tokio::test]
async fn initialize_is_idempotent_and_keeps_data() {
    let Some(svc) = service().await else { return };
    let stream = unique_stream("init");
    append(&svc, &stream, "Order.Created", 1).await.unwrap();

    let url = std::env::var("DATABASE_URL").unwrap();
    let gateway = StorageGateway::connect(&url, PoolSettings::default()).await.unwrap();
    schema::initialize(&gateway).await.unwrap();
    schema::initialize(&gateway).await.unwrap();
    gateway.close().await;
    gateway.close().await;

    assert_eq!(svc.read_stream(&stream, false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_version_is_a_conflict_with_no_side_effect() {
    let Some(svc) = service().await else { return };
    let stream = unique_stream("conflict");

    let created = svc
        .append(NewEvent::new(stream.clone(), "Order.Created", json!({"qty": 2}), 1))
        .await
        .unwrap();
    let err = append(&svc, &stream, "Order.Cancelled", 1).await.unwrap_err();
    assert!(err.is_conflict(), "{err:?}");

    let events = svc.read_stream(&stream, false).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, created.id);
    assert_eq!(events[0].name, "Order.Created");
    assert_eq!(events[0].body, json!({"qty": 2}));
}

#[tokio::test]
async fn concurrent_same_version_appends_have_one_winner() {
    let Some(svc) = service().await else { return };
    let stream = unique_stream("race");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let svc = svc.clone();
        let stream = stream.clone();
        handles.push(tokio::spawn(async move { append(&svc, &stream, "Order.Created", 1).await }));
    }

    let (mut ok, mut conflicts) = (0, 0);
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error {e:?}"),
        }
    }
    assert_eq!((ok, conflicts), (1, 7));
    assert_eq!(svc.read_stream(&stream, false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_read_uses_the_latest_snapshot() {
    let Some(svc) = service().await else { return };
    let stream = unique_stream("snap");
    for v in 1..=5 {
        let name = if v == 3 { "Order.Snapshot" } else { "Order.Changed" };
        append(&svc, &stream, name, v).await.unwrap();
    }

    let compacted = svc.read_stream(&stream, true).await.unwrap();
    let versions: Vec<i64> = compacted.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![3, 4, 5]);

    assert_eq!(svc.read_stream(&stream, false).await.unwrap().len(), 5);
    assert!(svc.read_stream(&unique_stream("empty"), true).await.unwrap().is_empty());
}

#[tokio::test]
async fn subscription_sees_concurrent_appends_in_seq_order() {
    let Some(svc) = service().await else { return };
    let streams: Vec<StreamId> = (0..4).map(|i| unique_stream(&format!("sub{i}"))).collect();
    let wanted: HashSet<StreamId> = streams.iter().cloned().collect();

    let mut sub = svc.subscribe(None).await.unwrap();
    assert!(sub.start() >= 0);

    let mut handles = Vec::new();
    for stream in streams {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            let mut seqs = Vec::new();
            for v in 1..=10 {
                seqs.push(append(&svc, &stream, "Thing.Changed", v).await.unwrap());
            }
            seqs
        }));
    }
    let mut appended = Vec::new();
    for h in handles {
        appended.extend(h.await.unwrap());
    }
    appended.sort_unstable();

    let mut received = Vec::new();
    for _ in 0..appended.len() {
        received.push(next_event_in(&mut sub, &wanted).await);
    }
    assert_eq!(received, appended);

    let head = svc.log().head().await.unwrap();
    assert!(head >= *appended.last().unwrap());

    sub.cancel();
    assert_eq!(sub.stopped().await, estore_infra::SubscriptionState::Cancelled);
}
