use std::collections::BTreeMap;

use super::{open_memory, Direction, NewTransfer, PartBitmap, TransferDb, TransferState};

fn download(src: &str) -> NewTransfer {
    NewTransfer {
        direction: Direction::Download,
        source: src.to_string(),
        destination: "/tmp/out.mp4".to_string(),
        total_bytes: 1000,
        chunk_size: 256,
        etag: Some("e1".to_string()),
        fingerprint: None,
    }
}

#[tokio::test]
async fn start_find_and_remove() {
    let db = open_memory().await.unwrap();
    let rec = db.start(&download("Games/a.mp4")).await.unwrap();
    assert_eq!(rec.chunk_count(), 4);
    assert_eq!(rec.state, TransferState::Active);

    let found = db
        .find(Direction::Download, "Games/a.mp4", "/tmp/out.mp4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, rec.id);
    assert_eq!(found.etag.as_deref(), Some("e1"));
    assert!(db
        .find(Direction::Upload, "Games/a.mp4", "/tmp/out.mp4")
        .await
        .unwrap()
        .is_none());

    db.remove(rec.id).await.unwrap();
    assert!(db.get(rec.id).await.unwrap().is_none());
}

#[tokio::test]
async fn restart_replaces_previous_record() {
    let db = open_memory().await.unwrap();
    let first = db.start(&download("k")).await.unwrap();
    db.set_checkpoint(first.id, 512).await.unwrap();
    let second = db.start(&download("k")).await.unwrap();
    assert_ne!(first.id, second.id);
    let all = db.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].checkpoint, 0);
}

#[tokio::test]
async fn checkpoint_never_moves_backwards() {
    let db = open_memory().await.unwrap();
    let rec = db.start(&download("k")).await.unwrap();
    db.set_checkpoint(rec.id, 256).await.unwrap();
    db.set_checkpoint(rec.id, 768).await.unwrap();
    db.set_checkpoint(rec.id, 512).await.unwrap();
    let got = db.get(rec.id).await.unwrap().unwrap();
    assert_eq!(got.checkpoint, 768);
    assert_eq!(got.bytes_transferred, 768);
}

#[tokio::test]
async fn error_state_attempts_and_parts_persist() {
    let db = open_memory().await.unwrap();
    let rec = db
        .start(&NewTransfer {
            direction: Direction::Upload,
            source: "/w/compressed/x.mp4".to_string(),
            destination: "Games/x.mp4".to_string(),
            total_bytes: 3000,
            chunk_size: 1000,
            etag: None,
            fingerprint: Some("3000-17".to_string()),
        })
        .await
        .unwrap();
    db.set_upload_id(rec.id, Some("up-1")).await.unwrap();
    let mut bitmap = PartBitmap::new(3);
    bitmap.set(0);
    bitmap.set(2);
    let etags = BTreeMap::from([(1u32, "a".to_string()), (3u32, "c".to_string())]);
    db.set_parts(rec.id, &bitmap, &etags, 2000).await.unwrap();
    db.add_attempts(rec.id, 4).await.unwrap();
    db.mark_error(rec.id, "timeout after 10 attempts").await.unwrap();

    let got = db.get(rec.id).await.unwrap().unwrap();
    assert_eq!(got.upload_id.as_deref(), Some("up-1"));
    assert!(got.committed_parts.is_set(0));
    assert!(!got.committed_parts.is_set(1));
    assert!(got.committed_parts.is_set(2));
    assert_eq!(got.part_etags.get(&3).map(String::as_str), Some("c"));
    assert_eq!(got.bytes_transferred, 2000);
    assert_eq!(got.attempt_count, 4);
    assert_eq!(got.state, TransferState::Error);
    assert_eq!(got.last_error.as_deref(), Some("timeout after 10 attempts"));
    assert_eq!(got.fingerprint.as_deref(), Some("3000-17"));

    db.mark_active(rec.id).await.unwrap();
    let got = db.get(rec.id).await.unwrap().unwrap();
    assert_eq!(got.state, TransferState::Active);
    assert!(got.last_error.is_none());
}

#[tokio::test]
async fn open_at_persists_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state dir/transfers.db");
    {
        let db = TransferDb::open_at(&path).await.unwrap();
        let rec = db.start(&download("k")).await.unwrap();
        db.set_checkpoint(rec.id, 256).await.unwrap();
    }
    let db = TransferDb::open_at(&path).await.unwrap();
    let rec = db
        .find(Direction::Download, "k", "/tmp/out.mp4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.checkpoint, 256);
}

#[tokio::test]
async fn prunable_covers_failed_and_orphaned_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let kept = dir.path().join("kept.mp4");
    std::fs::write(&kept, b"x").unwrap();
    let db = open_memory().await.unwrap();
    let upload = |src: &std::path::Path| NewTransfer {
        direction: Direction::Upload,
        source: src.display().to_string(),
        destination: "Games/a.mp4".to_string(),
        total_bytes: 1,
        chunk_size: 1,
        etag: None,
        fingerprint: Some("1-0".to_string()),
    };

    let live = db.start(&upload(&kept)).await.unwrap();
    assert!(!live.prunable());
    let orphan = db.start(&upload(&dir.path().join("gone.mp4"))).await.unwrap();
    assert!(orphan.prunable());
    let fetching = db.start(&download("Games/b.mp4")).await.unwrap();
    assert!(!fetching.prunable());
    db.mark_error(fetching.id, "timed out").await.unwrap();
    assert!(db.get(fetching.id).await.unwrap().unwrap().prunable());
}
