mod common;

use common::entry;
use keyloft_sync::{LocalTree, SyncError};
use keyloft_types::{Index, SyncUnit};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn enumerates_every_unit_shape_sorted() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());

    tree.write_index(&SyncUnit::favorites("macros"), &Index::empty("macros"))
        .await
        .unwrap();
    tree.write_index(&SyncUnit::favorites("combos"), &Index::empty("combos"))
        .await
        .unwrap();
    tree.write_settings("kb-1", &json!({ "layers": 4 }))
        .await
        .unwrap();
    tree.write_index(&SyncUnit::snapshots("kb-1"), &Index::empty("kb-1"))
        .await
        .unwrap();

    let units = tree.enumerate_units().await.unwrap();
    assert_eq!(
        units,
        vec![
            SyncUnit::favorites("combos"),
            SyncUnit::favorites("macros"),
            SyncUnit::settings("kb-1"),
            SyncUnit::snapshots("kb-1"),
        ]
    );
}

#[tokio::test]
async fn empty_tree_enumerates_nothing() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    assert!(tree.enumerate_units().await.unwrap().is_empty());
}

#[tokio::test]
async fn keyboard_dir_without_files_is_not_a_unit() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    tokio::fs::create_dir_all(dir.path().join("keyboards").join("kb-empty"))
        .await
        .unwrap();
    assert!(tree.enumerate_units().await.unwrap().is_empty());
}

#[tokio::test]
async fn index_roundtrip() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let unit = SyncUnit::favorites("macros");
    let index = Index {
        key: "macros".to_string(),
        entries: vec![entry("a", "2025-06-01T00:00:00Z")],
    };

    assert!(tree.read_index(&unit).await.unwrap().is_none());
    tree.write_index(&unit, &index).await.unwrap();
    assert_eq!(tree.read_index(&unit).await.unwrap(), Some(index));
}

#[tokio::test]
async fn settings_roundtrip() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let doc = json!({ "_updatedAt": "2025-06-01T00:00:00Z", "layers": 4 });

    assert!(tree.read_settings("kb-1").await.unwrap().is_none());
    tree.write_settings("kb-1", &doc).await.unwrap();
    assert_eq!(tree.read_settings("kb-1").await.unwrap(), Some(doc));
}

#[tokio::test]
async fn traversal_filenames_are_rejected() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let unit = SyncUnit::favorites("macros");

    for bad in ["../escape.json", "a/b.json", "..", ".", "", "a\\b.json"] {
        let err = tree.write_data_file(&unit, bad, "{}").await.unwrap_err();
        assert!(
            matches!(err, SyncError::InvalidFilename(_)),
            "{bad:?} got {err:?}"
        );
        let err = tree.read_data_file(&unit, bad).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidFilename(_)));
    }
}

#[tokio::test]
async fn reserved_filenames_are_rejected() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let unit = SyncUnit::favorites("macros");

    for bad in ["index.json", "settings.json"] {
        let err = tree.write_data_file(&unit, bad, "{}").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidFilename(_)));
    }
}

#[tokio::test]
async fn data_file_roundtrip_and_remove() {
    let dir = TempDir::new().unwrap();
    let tree = LocalTree::new(dir.path());
    let unit = SyncUnit::snapshots("kb-1");

    assert!(tree.read_data_file(&unit, "snap.json").await.unwrap().is_none());
    tree.write_data_file(&unit, "snap.json", "{\"layout\":1}")
        .await
        .unwrap();
    assert_eq!(
        tree.read_data_file(&unit, "snap.json").await.unwrap().as_deref(),
        Some("{\"layout\":1}")
    );

    tree.remove_data_file(&unit, "snap.json").await.unwrap();
    assert!(tree.read_data_file(&unit, "snap.json").await.unwrap().is_none());
    // Removing again is fine.
    tree.remove_data_file(&unit, "snap.json").await.unwrap();
}
