use converge_types::{DatasetId, ReplicaId};
use std::collections::HashSet;
use std::str::FromStr;

// ── DatasetId ────────────────────────────────────────────────────

#[test]
fn dataset_id_new_is_unique() {
    let a = DatasetId::new();
    let b = DatasetId::new();
    assert_ne!(a, b);
}

#[test]
fn dataset_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    let id = DatasetId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn dataset_id_display_and_parse() {
    let id = DatasetId::new();
    let parsed = DatasetId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
    let from_str = DatasetId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, from_str);
}

#[test]
fn dataset_id_parse_invalid() {
    let err: uuid::Error = DatasetId::parse("not-a-uuid").unwrap_err();
    assert!(!err.to_string().is_empty());
    assert!("not-a-uuid".parse::<DatasetId>().is_err());
}

#[test]
fn dataset_id_hash_and_eq() {
    let id = DatasetId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

#[test]
fn dataset_id_serializes_as_plain_string() {
    let id = DatasetId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let parsed: DatasetId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}

// ── ReplicaId ────────────────────────────────────────────────────

#[test]
fn replica_id_orders_lexicographically() {
    let a = ReplicaId::new("r1");
    let b = ReplicaId::new("r2");
    let c = ReplicaId::new("r10");
    assert!(a < b);
    assert!(a < c);
    assert!(c < b);
}

#[test]
fn replica_id_conversions() {
    let from_str: ReplicaId = "node-a".into();
    let from_string: ReplicaId = String::from("node-a").into();
    assert_eq!(from_str, from_string);
    assert_eq!(from_str.as_str(), "node-a");
    assert_eq!(from_str.to_string(), "node-a");
}

#[test]
fn replica_id_generate_is_unique() {
    let a = ReplicaId::generate();
    let b = ReplicaId::generate();
    assert_ne!(a, b);
    assert!(!a.is_empty());
}

#[test]
fn replica_id_empty() {
    assert!(ReplicaId::new("").is_empty());
}

#[test]
fn replica_id_serialization_roundtrip() {
    let id = ReplicaId::new("laptop");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"laptop\"");
    let parsed: ReplicaId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}
