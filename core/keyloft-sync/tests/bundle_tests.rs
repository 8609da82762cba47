mod common;

use chrono::Duration;
use common::{entry, ts};
use keyloft_sync::bundle::bundle_unit;
use keyloft_sync::LocalTree;
use keyloft_types::{Bundle, BundleKind, Index, SyncUnit};
use serde_json::json;
use tempfile::TempDir;

fn retention() -> Duration {
    Duration::days(30)
}

fn now() -> chrono::DateTime<chrono::Utc> {
    ts("2025-06-15T00:00:00Z")
}

#[tokio::test]
async fn absent_unit_bundles_to_none() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());

    let bundle = bundle_unit(&tree, &SyncUnit::favorites("macros"), retention(), now())
        .await
        .unwrap();
    assert!(bundle.is_none());

    let bundle = bundle_unit(&tree, &SyncUnit::settings("kb-1"), retention(), now())
        .await
        .unwrap();
    assert!(bundle.is_none());
}

#[tokio::test]
async fn settings_unit_bundles_the_single_document() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let doc = json!({ "_updatedAt": "2025-06-01T00:00:00Z", "layers": 4 });
    tree.write_settings("kb-1", &doc).await.unwrap();

    let bundle = bundle_unit(&tree, &SyncUnit::settings("kb-1"), retention(), now())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(bundle.kind, BundleKind::Settings);
    assert_eq!(bundle.key, "kb-1");
    assert!(bundle.index.is_none());
    let roundtrip: serde_json::Value =
        serde_json::from_str(&bundle.files[Bundle::SETTINGS_FILE]).unwrap();
    assert_eq!(roundtrip, doc);
}

#[tokio::test]
async fn indexed_unit_bundles_index_and_data_files() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let unit = SyncUnit::favorites("macros");
    let a = entry("a", "2025-06-01T00:00:00Z");
    tree.write_data_file(&unit, &a.filename, "{\"macro\":\"a\"}")
        .await
        .unwrap();
    tree.write_index(
        &unit,
        &Index {
            key: "macros".to_string(),
            entries: vec![a],
        },
    )
    .await
    .unwrap();

    let bundle = bundle_unit(&tree, &unit, retention(), now())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(bundle.kind, BundleKind::Favorite);
    assert_eq!(bundle.files["a.json"], "{\"macro\":\"a\"}");

    // The serialized index travels inside files too.
    let packed: Index = serde_json::from_str(&bundle.files[Bundle::INDEX_FILE]).unwrap();
    assert_eq!(Some(packed), bundle.index);
}

#[tokio::test]
async fn snapshots_bundle_as_layout_kind() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let unit = SyncUnit::snapshots("kb-1");
    tree.write_index(&unit, &Index::empty("kb-1")).await.unwrap();

    let bundle = bundle_unit(&tree, &unit, retention(), now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bundle.kind, BundleKind::Layout);
    assert_eq!(bundle.key, "kb-1");
}

#[tokio::test]
async fn expired_tombstones_are_dropped_before_packing() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let unit = SyncUnit::favorites("macros");

    let live = entry("live", "2025-06-01T00:00:00Z");
    let mut recent = entry("recent", "2025-06-01T00:00:00Z");
    recent.delete(ts("2025-06-10T00:00:00Z"));
    let mut expired = entry("expired", "2025-01-01T00:00:00Z");
    expired.delete(ts("2025-02-01T00:00:00Z"));

    tree.write_data_file(&unit, "live.json", "{}").await.unwrap();
    tree.write_index(
        &unit,
        &Index {
            key: "macros".to_string(),
            entries: vec![live, recent, expired],
        },
    )
    .await
    .unwrap();

    let bundle = bundle_unit(&tree, &unit, retention(), now())
        .await
        .unwrap()
        .unwrap();

    let index = bundle.index.unwrap();
    let ids: Vec<&str> = index.entries.iter().map(|e| e.id.as_str()).collect();
    // An upload can never resurrect an already-expired tombstone.
    assert_eq!(ids, vec!["live", "recent"]);
    // Tombstones carry no data file.
    assert!(!bundle.files.contains_key("recent.json"));
}

#[tokio::test]
async fn missing_data_file_is_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let unit = SyncUnit::favorites("macros");
    tree.write_index(
        &unit,
        &Index {
            key: "macros".to_string(),
            entries: vec![entry("ghost", "2025-06-01T00:00:00Z")],
        },
    )
    .await
    .unwrap();

    let bundle = bundle_unit(&tree, &unit, retention(), now())
        .await
        .unwrap()
        .unwrap();

    // Index row survives; the file heals from another replica later.
    assert_eq!(bundle.index.unwrap().entries.len(), 1);
    assert!(!bundle.files.contains_key("ghost.json"));
}
