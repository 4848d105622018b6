//! Integration coverage for the staging queue lifecycle (C2), exercising
//! the terminal-folder invariants end to end against a real temp
//! filesystem rather than mocked I/O.

use mailsentry::maildir::MaildirStore;
use tempfile::tempdir;

#[tokio::test]
async fn safe_message_lifecycle_lands_in_delivered() {
    let dir = tempdir().unwrap();
    let store = MaildirStore::new(dir.path().to_path_buf(), "alice");
    store.ensure_layout().await.unwrap();

    let raw = b"From: news@linkedin.com\r\nTo: alice@example.com\r\nSubject: Weekly digest\r\n\r\nBody.\r\n".to_vec();
    let staged_name = store.save_to_staging(&raw).await.unwrap();

    let claimed = store.claim_staging().await.unwrap();
    assert_eq!(claimed.len(), 1);
    let (processing_name, bytes) = &claimed[0];
    assert_eq!(bytes, &raw);

    // Simulate a SAFE verdict followed by successful delivery.
    store.archive_delivered(&raw, "msg-1").await;
    store.remove_staging(processing_name).await.unwrap();

    assert_eq!(store.count_staging().await, 0);
    let _ = staged_name;
}

#[tokio::test]
async fn quarantine_message_lifecycle_lands_in_quarantine_cur() {
    let dir = tempdir().unwrap();
    let store = MaildirStore::new(dir.path().to_path_buf(), "alice");
    store.ensure_layout().await.unwrap();

    let raw = b"From: security@amaz0n-support.com\r\nTo: alice@example.com\r\nSubject: Verify\r\n\r\nBody.\r\n".to_vec();
    store.save_to_staging(&raw).await.unwrap();

    let claimed = store.claim_staging().await.unwrap();
    let (processing_name, _) = &claimed[0];

    let quarantine_name = store.quarantine(&raw, "Typosquatting domain").await.unwrap();
    store.remove_staging(processing_name).await.unwrap();

    assert_eq!(store.count_staging().await, 0);
    let quarantine_path = dir
        .path()
        .join("alice")
        .join(".Quarantine")
        .join("cur")
        .join(&quarantine_name);
    assert!(quarantine_path.exists());
    assert_eq!(tokio::fs::read(quarantine_path).await.unwrap(), raw);
}

#[tokio::test]
async fn retry_then_success_ends_with_single_delivered_copy() {
    let dir = tempdir().unwrap();
    let store = MaildirStore::new(dir.path().to_path_buf(), "alice");
    store.ensure_layout().await.unwrap();

    let raw = b"From: a@b.com\r\nTo: c@d.com\r\nSubject: X\r\n\r\nBody.\r\n".to_vec();
    store.save_to_staging(&raw).await.unwrap();

    // First attempt: temporary failure, released back to staging.
    let claimed = store.claim_staging().await.unwrap();
    let (processing_name, _) = &claimed[0];
    store.release_to_staging(processing_name).await.unwrap();
    assert_eq!(store.count_staging().await, 1);

    // Second cycle: claim again, succeed this time.
    let claimed_again = store.claim_staging().await.unwrap();
    let (processing_name_2, _) = &claimed_again[0];
    store.archive_delivered(&raw, "msg-2").await;
    store.remove_staging(processing_name_2).await.unwrap();

    assert_eq!(store.count_staging().await, 0);
}

#[tokio::test]
async fn permanent_failure_past_cap_lands_in_failed() {
    let dir = tempdir().unwrap();
    let store = MaildirStore::new(dir.path().to_path_buf(), "alice");
    store.ensure_layout().await.unwrap();

    let raw = b"From: a@b.com\r\nTo: c@d.com\r\nSubject: X\r\n\r\nBody.\r\n".to_vec();
    store.save_to_staging(&raw).await.unwrap();

    let max_retries = 3;
    let mut retry_count = 0;
    for _ in 0..max_retries {
        let claimed = store.claim_staging().await.unwrap();
        let (processing_name, _) = &claimed[0];
        retry_count += 1;
        if retry_count >= max_retries {
            store
                .move_to_failed(&raw, "Max retries exceeded")
                .await
                .unwrap();
            store.remove_staging(processing_name).await.unwrap();
        } else {
            store.release_to_staging(processing_name).await.unwrap();
        }
    }

    assert_eq!(store.count_staging().await, 0);
    assert_eq!(store.count_failed().await, 1);
}
