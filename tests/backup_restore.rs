//! Backup streaming: cancellation, framing and restore

mod common;

use common::fixtures::{backends, memory, seed};
use larder::storage::{
    BackupMetadata, BackupSink, CancellationToken, RedbStorage, Repository, StorageError,
};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Sink that records everything it is given, shareable with the test body
#[derive(Clone, Default)]
struct Recorder {
    bytes: Arc<Mutex<Vec<u8>>>,
    metadata: Arc<Mutex<Option<BackupMetadata>>>,
    /// Cancelled as soon as the first chunk arrives
    cancel_on_write: Option<CancellationToken>,
}

impl Write for Recorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        if let Some(token) = &self.cancel_on_write {
            token.cancel();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BackupSink for Recorder {
    fn set_metadata(&mut self, metadata: &BackupMetadata) -> io::Result<()> {
        *self.metadata.lock().unwrap() = Some(metadata.clone());
        Ok(())
    }
}

#[tokio::test]
async fn already_cancelled_returns_without_blocking() {
    for b in backends() {
        seed(b.repo.as_ref(), "posts", 100);

        let token = CancellationToken::new();
        token.cancel();
        let sink = Recorder::default();

        let started = Instant::now();
        let err = b.repo.backup(&token, Box::new(sink.clone())).await.unwrap_err();
        assert!(matches!(err, StorageError::Cancelled), "{}", b.name);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(sink.bytes.lock().unwrap().is_empty(), "{}", b.name);
    }
}

#[tokio::test]
async fn cancel_mid_stream_stops_redb_walk() {
    let dir = tempfile::tempdir().unwrap();
    let repo = RedbStorage::open(dir.path().join("system.db")).unwrap();
    seed(&repo, "posts", 600);

    let token = CancellationToken::new();
    let sink = Recorder {
        cancel_on_write: Some(token.clone()),
        ..Recorder::default()
    };

    let err = repo.backup(&token, Box::new(sink.clone())).await.unwrap_err();
    assert!(matches!(err, StorageError::Cancelled));

    let declared = sink.metadata.lock().unwrap().clone().unwrap().content_length;
    let written = sink.bytes.lock().unwrap().len();
    assert!(written > 0);
    assert!((written as u64) < declared);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.bytes.lock().unwrap().len(), written);

    // the snapshot's read transaction is gone and the store carries on
    repo.update("posts", b"after", b"cancel").unwrap();
    let full = Recorder::default();
    repo.backup(&CancellationToken::new(), Box::new(full.clone()))
        .await
        .unwrap();
    let declared = full.metadata.lock().unwrap().clone().unwrap().content_length;
    assert_eq!(full.bytes.lock().unwrap().len() as u64, declared);
}

#[tokio::test]
async fn metadata_describes_stream() {
    for b in backends() {
        seed(b.repo.as_ref(), "posts", 5);

        let sink = Recorder::default();
        b.repo
            .backup(&CancellationToken::new(), Box::new(sink.clone()))
            .await
            .unwrap();

        let metadata = sink.metadata.lock().unwrap().clone().unwrap();
        assert_eq!(metadata.content_type, "application/octet-stream");
        let ts = metadata
            .filename
            .strip_prefix("system-")
            .and_then(|rest| rest.strip_suffix(".db.bak"))
            .unwrap();
        assert!(ts.parse::<i64>().unwrap() > 0, "{}", b.name);
        assert_eq!(
            metadata.content_length,
            sink.bytes.lock().unwrap().len() as u64,
            "{}",
            b.name
        );
    }
}

#[tokio::test]
async fn memory_snapshot_restores_into_redb() {
    let source = memory();
    seed(source.repo.as_ref(), "posts", 5);
    source.repo.update("__users", b"a@b.c", b"{\"id\":1}").unwrap();
    source.repo.next_sequence("__users").unwrap();

    let sink = Recorder::default();
    source
        .repo
        .backup(&CancellationToken::new(), Box::new(sink.clone()))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let bytes = sink.bytes.lock().unwrap().clone();
    let restored = RedbStorage::restore(dir.path().join("restored.db"), bytes.as_slice()).unwrap();

    assert_eq!(restored.buckets().unwrap(), source.repo.buckets().unwrap());
    assert_eq!(
        restored.get_all("posts").unwrap(),
        source.repo.get_all("posts").unwrap()
    );
    assert_eq!(restored.next_sequence("__users").unwrap(), 2);
}

#[tokio::test]
async fn truncated_snapshot_is_rejected() {
    let source = memory();
    seed(source.repo.as_ref(), "posts", 5);

    let sink = Recorder::default();
    source
        .repo
        .backup(&CancellationToken::new(), Box::new(sink.clone()))
        .await
        .unwrap();

    let bytes = sink.bytes.lock().unwrap().clone();
    let cut = &bytes[..bytes.len() / 2];

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("restored.db");
    let err = RedbStorage::restore(&target, cut).err().unwrap();
    assert!(matches!(err, StorageError::InvalidSnapshot(_)));
    assert!(!target.exists());
}
