mod common;

use std::time::Duration;

use ban_sweep_rs::store;
use ban_sweep_rs::verifier::Verifier;
use common::{record, FakeLookup};
use time::macros::datetime;
use tokio_util::sync::CancellationToken;

const A: &str = "76561198000000001";
const B: &str = "76561198000000002";
const C: &str = "76561198000000003";

fn write_store(dir: &tempfile::TempDir) -> (std::path::PathBuf, Vec<String>) {
    let records = vec![
        record(A, datetime!(2025-01-01 10:00:00)),
        record(B, datetime!(2025-01-02 10:00:00)),
        record(C, datetime!(2025-01-03 10:00:00)),
    ];
    let text = store::serialize(&records);
    let blocks = store::split_blocks(&text)
        .into_iter()
        .map(str::to_string)
        .collect();
    let path = dir.path().join("output.txt");
    std::fs::write(&path, &text).unwrap();
    (path, blocks)
}

#[tokio::test]
async fn active_record_removed_others_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (path, blocks) = write_store(&dir);
    let lookup = FakeLookup {
        active: vec![B.to_string()],
        ..FakeLookup::default()
    };
    let verifier = Verifier::new(&lookup).with_pause(Duration::ZERO);

    let summary = verifier
        .verify_store(&path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.checked, 3);
    assert_eq!(summary.removed, 1);
    let rewritten = std::fs::read_to_string(&path).unwrap();
    assert_eq!(rewritten, format!("{}{}", blocks[0], blocks[2]));
}

#[tokio::test]
async fn lookup_failure_keeps_record() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_store(&dir);
    let before = std::fs::read_to_string(&path).unwrap();
    let lookup = FakeLookup {
        failing: vec![A.to_string(), C.to_string()],
        ..FakeLookup::default()
    };
    let verifier = Verifier::new(&lookup).with_pause(Duration::ZERO);

    let summary = verifier
        .verify_store(&path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.lookup_failures, 2);
    assert_eq!(summary.removed, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn verify_keeps_order_and_drops_duplicates_of_active_ids() {
    let lookup = FakeLookup {
        active: vec![A.to_string()],
        ..FakeLookup::default()
    };
    let verifier = Verifier::new(&lookup).with_pause(Duration::ZERO);
    let created = datetime!(2025-01-01 10:00:00);
    let records = vec![record(A, created), record(C, created), record(A, created), record(B, created)];

    let (kept, summary) = verifier.verify(records, &CancellationToken::new()).await;

    let ids: Vec<_> = kept.iter().map(|r| r.steamid.as_str()).collect();
    assert_eq!(ids, vec![C, B]);
    assert_eq!(summary.removed, 2);
    // One lookup per distinct steamid.
    assert_eq!(lookup.calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn missing_store_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = FakeLookup::default();
    let verifier = Verifier::new(&lookup);

    let err = verifier
        .verify_store(dir.path().join("absent.txt"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ban_sweep_rs::Error::Store { .. }));
}
