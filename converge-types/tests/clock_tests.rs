use converge_types::{HybridClock, OrderingKey, ReplicaId};
use proptest::prelude::*;

// ── OrderingKey ──────────────────────────────────────────────────

#[test]
fn key_components() {
    let key = OrderingKey::new(42, "r1");
    assert_eq!(key.timestamp(), 42);
    assert_eq!(key.origin(), &ReplicaId::new("r1"));
}

#[test]
fn ordering_by_timestamp() {
    let a = OrderingKey::new(100, "zzz");
    let b = OrderingKey::new(200, "aaa");
    assert!(a < b);
}

#[test]
fn ordering_by_origin_when_timestamp_equal() {
    let a = OrderingKey::new(5, "r1");
    let b = OrderingKey::new(5, "r2");
    assert!(a < b);
    assert!(a.is_concurrent_with(&b));
}

#[test]
fn equal_keys() {
    let a = OrderingKey::new(7, "r1");
    let b = OrderingKey::new(7, "r1");
    assert_eq!(a, b);
    assert!(!a.is_concurrent_with(&b));
    assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
}

#[test]
fn display_format() {
    assert_eq!(OrderingKey::new(3, "r9").to_string(), "(3, r9)");
}

#[test]
fn serialization_roundtrip() {
    let key = OrderingKey::new(12, "replica-a");
    let json = serde_json::to_string(&key).unwrap();
    let parsed: OrderingKey = serde_json::from_str(&json).unwrap();
    assert_eq!(key, parsed);
}

// ── HybridClock ──────────────────────────────────────────────────

#[test]
fn logical_clock_counts_from_one() {
    let mut clock = HybridClock::logical("r1");
    assert_eq!(clock.tick(), OrderingKey::new(1, "r1"));
    assert_eq!(clock.tick(), OrderingKey::new(2, "r1"));
    assert_eq!(clock.last(), 2);
}

#[test]
fn system_clock_tracks_wall_time() {
    let wall_ms = || {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap();
        u64::try_from(elapsed.as_millis()).unwrap()
    };
    let before = wall_ms();
    let mut clock = HybridClock::new("r1");
    let ts = clock.tick().timestamp();
    let after = wall_ms();
    assert!(ts >= before, "tick {ts} is behind the wall clock {before}");
    assert!(ts <= after, "tick {ts} is ahead of the wall clock {after}");
}

#[test]
fn system_clock_is_strictly_monotonic() {
    let mut clock = HybridClock::new("r1");
    let mut prev = clock.tick();
    for _ in 0..1000 {
        let next = clock.tick();
        assert!(next > prev);
        prev = next;
    }
}

#[test]
fn observe_moves_clock_past_remote() {
    let mut clock = HybridClock::logical("r1");
    clock.tick();
    clock.observe(&OrderingKey::new(500, "r2"));
    let next = clock.tick();
    assert_eq!(next.timestamp(), 501);
    assert!(next > OrderingKey::new(500, "r2"));
}

#[test]
fn observe_older_key_is_ignored() {
    let mut clock = HybridClock::logical("r1");
    for _ in 0..10 {
        clock.tick();
    }
    clock.observe(&OrderingKey::new(3, "r2"));
    assert_eq!(clock.last(), 10);
}

#[test]
fn keys_carry_clock_origin() {
    let mut clock = HybridClock::logical("origin-x");
    assert_eq!(clock.origin().as_str(), "origin-x");
    assert_eq!(clock.tick().origin().as_str(), "origin-x");
}

proptest! {
    #[test]
    fn ordering_is_total_and_antisymmetric(
        t1 in 0u64..50, t2 in 0u64..50,
        o1 in "[a-c]{1,2}", o2 in "[a-c]{1,2}",
    ) {
        let a = OrderingKey::new(t1, o1);
        let b = OrderingKey::new(t2, o2);
        let ab = a.cmp(&b);
        prop_assert_eq!(ab, b.cmp(&a).reverse());
        prop_assert_eq!(ab == std::cmp::Ordering::Equal, a == b);
    }

    #[test]
    fn ticks_after_observe_dominate(remote in 0u64..1_000_000) {
        let mut clock = HybridClock::logical("r1");
        let seen = OrderingKey::new(remote, "r2");
        clock.observe(&seen);
        prop_assert!(clock.tick().timestamp() > remote);
    }
}
