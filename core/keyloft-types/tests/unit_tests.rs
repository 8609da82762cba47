use keyloft_types::SyncUnit;

#[test]
fn favorites_roundtrip() {
    let unit = SyncUnit::favorites("macros");
    assert_eq!(unit.to_string(), "favorites/macros");
    assert_eq!("favorites/macros".parse::<SyncUnit>().unwrap(), unit);
}

#[test]
fn settings_roundtrip() {
    let unit = SyncUnit::settings("kb-3f2a");
    assert_eq!(unit.to_string(), "keyboards/kb-3f2a/settings");
    assert_eq!("keyboards/kb-3f2a/settings".parse::<SyncUnit>().unwrap(), unit);
}

#[test]
fn snapshots_roundtrip() {
    let unit = SyncUnit::snapshots("kb-3f2a");
    assert_eq!(unit.to_string(), "keyboards/kb-3f2a/snapshots");
    assert_eq!("keyboards/kb-3f2a/snapshots".parse::<SyncUnit>().unwrap(), unit);
}

#[test]
fn rejects_unknown_shapes() {
    for bad in [
        "",
        "favorites",
        "favorites/",
        "keyboards/kb-1",
        "keyboards/kb-1/firmware",
        "keyboards//settings",
        "password-check",
        "favorites/a/b",
    ] {
        assert!(bad.parse::<SyncUnit>().is_err(), "accepted {bad:?}");
    }
}

#[test]
fn keyboard_uid_only_for_keyboard_units() {
    assert_eq!(SyncUnit::favorites("macros").keyboard_uid(), None);
    assert_eq!(SyncUnit::settings("k1").keyboard_uid(), Some("k1"));
    assert_eq!(SyncUnit::snapshots("k1").keyboard_uid(), Some("k1"));
}

#[test]
fn indexed_units() {
    assert!(SyncUnit::favorites("macros").is_indexed());
    assert!(SyncUnit::snapshots("k1").is_indexed());
    assert!(!SyncUnit::settings("k1").is_indexed());
}

#[test]
fn serde_uses_path_form() {
    let unit = SyncUnit::favorites("macros");
    let json = serde_json::to_string(&unit).unwrap();
    assert_eq!(json, "\"favorites/macros\"");
    let back: SyncUnit = serde_json::from_str(&json).unwrap();
    assert_eq!(back, unit);
}
