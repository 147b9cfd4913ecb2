use converge_crdt::LWWElementSet;
use converge_sync::{
    ArchiveReason, DiscardArchive, Hub, HubConfig, MemoryArchive, SyncError,
};
use converge_types::{DatasetId, Operation, OrderingKey, ReplicaId};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

fn spawn_hub() -> Hub {
    Hub::spawn(DatasetId::new(), &HubConfig::default(), Arc::new(DiscardArchive))
}

fn add(key: &str, value: &str, ts: u64, origin: &str) -> Operation {
    Operation::add(key, value, OrderingKey::new(ts, origin))
}

fn remove(key: &str, ts: u64, origin: &str) -> Operation {
    Operation::remove(key, OrderingKey::new(ts, origin))
}

fn rid(id: &str) -> ReplicaId {
    ReplicaId::new(id)
}

// ── Join ─────────────────────────────────────────────────────────

#[tokio::test]
async fn join_new_dataset_gets_empty_snapshot() {
    let hub = spawn_hub();
    let membership = hub.join(rid("r1")).await.unwrap();

    assert!(membership.snapshot().is_empty());
    assert_eq!(membership.subscription.dataset_id(), hub.dataset_id());
    assert_eq!(membership.subscription.replica_id(), &rid("r1"));
}

#[tokio::test]
async fn join_snapshot_reflects_canonical_state() {
    let hub = spawn_hub();
    hub.submit(add("a", "1", 1, "r1")).await.unwrap();
    hub.submit(add("b", "2", 2, "r1")).await.unwrap();

    let membership = hub.join(rid("r2")).await.unwrap();

    let expected: BTreeMap<String, String> =
        [("a".into(), "1".into()), ("b".into(), "2".into())].into();
    assert_eq!(membership.snapshot(), expected);
}

#[tokio::test]
async fn join_snapshot_carries_tombstones() {
    let hub = spawn_hub();
    hub.submit(add("a", "1", 1, "r1")).await.unwrap();
    hub.submit(remove("a", 5, "r1")).await.unwrap();

    let mut membership = hub.join(rid("r2")).await.unwrap();
    assert!(membership.snapshot().is_empty());
    assert_eq!(membership.state.tombstone_count(), 1);

    // A late add older than the remove must stay hidden at the new replica.
    membership.state.apply(&add("a", "late", 3, "r3"));
    assert_eq!(membership.state.query("a"), None);
}

#[tokio::test]
async fn rejoin_replaces_subscription_without_duplicate_delivery() {
    let hub = spawn_hub();
    let mut first = hub.join(rid("r1")).await.unwrap().subscription;
    let mut second = hub.join(rid("r1")).await.unwrap().subscription;

    assert!(matches!(first.recv().await, Err(SyncError::Gone(_))));

    hub.submit(add("k", "v", 1, "r2")).await.unwrap();
    assert_eq!(second.try_recv().unwrap(), Some(add("k", "v", 1, "r2")));
    assert_eq!(second.try_recv().unwrap(), None);

    let subscribers = hub.subscribers().await.unwrap();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].replica_id, rid("r1"));
    assert_eq!(subscribers[0].delivered, 1);
}

// ── Submit & fan-out ─────────────────────────────────────────────

#[tokio::test]
async fn submit_fans_out_to_everyone_but_origin() {
    let hub = spawn_hub();
    let mut s1 = hub.join(rid("r1")).await.unwrap().subscription;
    let mut s2 = hub.join(rid("r2")).await.unwrap().subscription;
    let mut s3 = hub.join(rid("r3")).await.unwrap().subscription;

    let op = add("a", "1", 5, "r1");
    assert!(hub.submit(op.clone()).await.unwrap());

    assert_eq!(s1.try_recv().unwrap(), None);
    assert_eq!(s2.try_recv().unwrap(), Some(op.clone()));
    assert_eq!(s3.try_recv().unwrap(), Some(op));
}

#[tokio::test]
async fn submit_from_non_subscriber_reaches_all_subscribers() {
    let hub = spawn_hub();
    let mut s1 = hub.join(rid("r1")).await.unwrap().subscription;

    let op = remove("a", 1, "outsider");
    hub.submit(op.clone()).await.unwrap();

    assert_eq!(s1.recv().await.unwrap(), op);
}

#[tokio::test]
async fn stale_operation_is_acknowledged_and_still_forwarded() {
    let hub = spawn_hub();
    let mut s2 = hub.join(rid("r2")).await.unwrap().subscription;

    assert!(hub.submit(add("a", "new", 9, "r1")).await.unwrap());
    assert!(!hub.submit(add("a", "old", 3, "r1")).await.unwrap());

    assert_eq!(s2.recv().await.unwrap(), add("a", "new", 9, "r1"));
    assert_eq!(s2.recv().await.unwrap(), add("a", "old", 3, "r1"));
    assert_eq!(hub.snapshot().await.unwrap().query("a"), Some("new"));
}

#[tokio::test]
async fn remove_of_unknown_key_is_accepted() {
    let hub = spawn_hub();
    assert!(hub.submit(remove("ghost", 1, "r1")).await.unwrap());

    let canonical = hub.snapshot().await.unwrap();
    assert_eq!(canonical.query("ghost"), None);
    assert_eq!(canonical.tombstone_count(), 1);
}

#[tokio::test]
async fn equal_timestamp_add_and_remove_resolve_to_absent() {
    let hub = spawn_hub();
    hub.submit(add("a", "1", 5, "r1")).await.unwrap();
    hub.submit(remove("a", 5, "r2")).await.unwrap();
    assert_eq!(hub.snapshot().await.unwrap().query("a"), None);

    let other = spawn_hub();
    other.submit(remove("a", 5, "r2")).await.unwrap();
    other.submit(add("a", "1", 5, "r1")).await.unwrap();
    assert_eq!(other.snapshot().await.unwrap().query("a"), None);
}

#[tokio::test]
async fn submit_rejects_malformed_operations() {
    let hub = spawn_hub();

    let empty_key = add("", "v", 1, "r1");
    assert!(matches!(
        hub.submit(empty_key).await,
        Err(SyncError::Malformed(_))
    ));

    let no_origin = Operation::add("k", "v", OrderingKey::new(1, ""));
    assert!(matches!(
        hub.submit(no_origin).await,
        Err(SyncError::Malformed(_))
    ));

    assert!(hub.snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_submissions_all_land_in_canonical_state() {
    let hub = spawn_hub();
    let mut tasks = Vec::new();
    for replica in 0..8 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..25u64 {
                let origin = format!("r{replica}");
                hub.submit(add(&format!("{origin}-{i}"), "v", i + 1, &origin))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }

    assert_eq!(hub.snapshot().await.unwrap().len(), 200);
}

// ── Leave ────────────────────────────────────────────────────────

#[tokio::test]
async fn leave_removes_subscriber() {
    let hub = spawn_hub();
    let _s1 = hub.join(rid("r1")).await.unwrap();
    let mut s2 = hub.join(rid("r2")).await.unwrap().subscription;

    assert!(hub.leave(&rid("r2")).await.unwrap());
    assert!(matches!(s2.recv().await, Err(SyncError::Gone(_))));

    let ids: Vec<_> = hub
        .subscribers()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.replica_id)
        .collect();
    assert_eq!(ids, vec![rid("r1")]);
}

#[tokio::test]
async fn leave_unknown_replica_returns_false() {
    let hub = spawn_hub();
    assert!(!hub.leave(&rid("nobody")).await.unwrap());
}

#[tokio::test]
async fn last_leave_hands_state_to_archive() {
    let archive = Arc::new(MemoryArchive::new());
    let dataset_id = DatasetId::new();
    let hub = Hub::spawn(dataset_id, &HubConfig::default(), archive.clone());

    let _membership = hub.join(rid("r1")).await.unwrap();
    hub.submit(add("a", "1", 1, "r1")).await.unwrap();
    assert!(archive.is_empty());

    hub.leave(&rid("r1")).await.unwrap();

    let (state, reason) = archive.get(&dataset_id).unwrap();
    assert_eq!(reason, ArchiveReason::Idle);
    assert_eq!(state.query("a"), Some("1"));
    // Idle hubs keep running.
    assert!(!hub.is_closed());
    assert!(hub.join(rid("r1")).await.is_ok());
}

#[tokio::test]
async fn dropped_subscription_is_pruned_on_next_fan_out() {
    let hub = spawn_hub();
    let _s1 = hub.join(rid("r1")).await.unwrap();
    drop(hub.join(rid("r2")).await.unwrap());

    hub.submit(add("a", "1", 1, "r1")).await.unwrap();

    let subscribers = hub.subscribers().await.unwrap();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].replica_id, rid("r1"));
}

// ── Seeding ──────────────────────────────────────────────────────

#[tokio::test]
async fn spawn_with_state_serves_seeded_state() {
    let mut seed = LWWElementSet::new();
    seed.apply_add("a", "1", OrderingKey::new(1, "r1"));
    seed.apply_remove("b", OrderingKey::new(2, "r1"));

    let hub = Hub::spawn_with_state(
        DatasetId::new(),
        seed.clone(),
        &HubConfig::default(),
        Arc::new(DiscardArchive),
    );

    assert_eq!(hub.snapshot().await.unwrap(), seed);
    assert!(hub.subscribers().await.unwrap().is_empty());
}
