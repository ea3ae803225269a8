use std::fs;
use std::io::Write;

use pretty_assertions::assert_eq;
use tempfile::{NamedTempFile, TempDir};
use toolchange_core::{advance, FilamentInfo, MetadataOrigin, ProgressState, ToolChangeEvent};
use toolchange_engine::{ensure_state_dir, AtomicFileWriter, InvalidState, StateStore, StoreError};

fn two_change_state() -> ProgressState {
    let events = vec![
        ToolChangeEvent::new(0, 10, FilamentInfo::unknown()),
        ToolChangeEvent::new(1, 20, FilamentInfo::unknown()),
    ];
    ProgressState::from_scan(events, None, MetadataOrigin::Placeholder)
}

#[test]
fn save_then_load_returns_same_state() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("tool_changes.json"));
    let state = two_change_state();

    store.save(&state).unwrap();
    assert!(store.exists());
    assert_eq!(store.load(), state);
}

#[test]
fn saved_document_uses_plain_field_names() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("state.json"));
    store.save(&two_change_state()).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(value["total_changes"], 2);
    assert_eq!(value["current_change"], 0);
    assert_eq!(value["changes"][1]["tool_number"], 1);
    assert_eq!(value["changes"][1]["line"], 20);
    assert_eq!(value["changes"][1]["color"], "Unknown");
    assert_eq!(value["metadata"], "placeholder");
}

#[test]
fn missing_state_dir_is_created() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("nested").join("deeper").join("s.json"));
    store.save(&two_change_state()).unwrap();
    assert!(store.path().is_file());
}

#[test]
fn missing_document_loads_as_empty_default() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("absent.json"));
    assert!(!store.exists());
    assert_eq!(store.load(), ProgressState::default());
    assert!(matches!(store.read_document(), Ok(None)));
}

#[test]
fn corrupt_documents_load_as_empty_default() {
    tracker_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    let store = StateStore::new(path.clone());

    let cases = [
        "{ not json",
        "[]",
        r#"{"total_changes": 1, "current_change": 0}"#,
        r#"{"total_changes": 1, "current_change": "0", "changes": []}"#,
        r#"{"total_changes": 1, "current_change": 0, "changes": {}}"#,
        r#"{"total_changes": 1, "current_change": 0, "changes": [{"color": "red"}]}"#,
        r#"{"total_changes": 3, "current_change": 0, "changes": []}"#,
        r#"{"total_changes": 0, "current_change": 4, "changes": []}"#,
    ];
    for case in cases {
        fs::write(&path, case).unwrap();
        assert_eq!(store.load(), ProgressState::default(), "document {case}");
        assert!(store.read_document().is_err(), "document {case}");
    }
}

#[test]
fn inconsistent_document_reports_reason() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    fs::write(&path, r#"{"total_changes": 2, "current_change": 0, "changes": []}"#).unwrap();
    let store = StateStore::new(path);
    assert!(matches!(
        store.read_document(),
        Err(InvalidState::Inconsistent(_))
    ));
}

#[test]
fn interrupted_write_leaves_previous_document_intact() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("state.json"));
    let state = two_change_state();
    store.save(&state).unwrap();

    // A writer that died before its rename leaves only a stray temp file.
    let mut stray = NamedTempFile::new_in(temp.path()).unwrap();
    stray.write_all(b"{\"total_changes\": 2, \"curr").unwrap();
    let (_file, _kept) = stray.keep().unwrap();

    assert_eq!(store.load(), state);
    assert!(store.read_document().unwrap().is_some());
}

#[test]
fn failed_write_leaves_no_document() {
    let temp = TempDir::new().unwrap();
    let not_a_dir = temp.path().join("not_a_dir");
    fs::write(&not_a_dir, "x").unwrap();

    let store = StateStore::new(not_a_dir.join("state.json"));
    assert!(matches!(
        store.save(&two_change_state()),
        Err(StoreError::Persist(_))
    ));
    assert!(!store.exists());
    assert!(ensure_state_dir(&not_a_dir).is_err());
}

#[test]
fn atomic_writer_replaces_existing_content() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().join("doc.json"));
    writer.write("first").unwrap();
    writer.write("second").unwrap();
    assert_eq!(fs::read_to_string(writer.target()).unwrap(), "second");

    let leftovers = fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn commit_refuses_when_document_moved_on() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("state.json"));
    let loaded = two_change_state();
    store.save(&loaded).unwrap();

    // Someone else advanced first.
    let (theirs, _) = advance(loaded.clone());
    store.save(&theirs).unwrap();

    let (ours, _) = advance(loaded.clone());
    assert!(matches!(
        store.commit(&loaded, &ours),
        Err(StoreError::Conflict(_))
    ));
    assert_eq!(store.load(), theirs);

    let (next, _) = advance(theirs.clone());
    store.commit(&theirs, &next).unwrap();
    assert_eq!(store.load().current_change(), 2);
}

#[cfg(unix)]
#[test]
fn save_keeps_document_readable_by_other_users() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("tool_changes.json"));
    let mode = |path: &std::path::Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;

    store.save(&two_change_state()).unwrap();
    assert_eq!(mode(store.path()), 0o644);

    fs::set_permissions(store.path(), fs::Permissions::from_mode(0o664)).unwrap();
    let (next, _) = advance(two_change_state());
    store.commit(&two_change_state(), &next).unwrap();
    assert_eq!(mode(store.path()), 0o664);
}
