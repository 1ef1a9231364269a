//! Snapshot backups
//!
//! A snapshot is a sequence of bincode-encoded [`Frame`]s: one `Header`, then
//! for each bucket a `Bucket` frame followed by its `Record`s in key order,
//! then `End`. Every frame of one snapshot comes from a single read
//! transaction, so the stream is consistent even while writers keep going.

use crate::{Result, StorageError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{self, BufWriter, Read, Write};
use tokio_util::sync::CancellationToken;

pub const CONTENT_TYPE: &str = "application/octet-stream";
pub const FORMAT_VERSION: u32 = 1;

/// Framing information handed to the sink before the first byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupMetadata {
    pub content_type: &'static str,
    /// Suggested file name, `system-<unix-ts>.db.bak`
    pub filename: String,
    /// Exact number of bytes that will follow
    pub content_length: u64,
}

impl BackupMetadata {
    pub fn new(timestamp: i64, content_length: u64) -> Self {
        Self {
            content_type: CONTENT_TYPE,
            filename: format!("system-{}.db.bak", timestamp),
            content_length,
        }
    }
}

/// Destination for a snapshot
///
/// An HTTP response adapter would map the metadata onto `Content-Type`,
/// `Content-Disposition` and `Content-Length` headers.
pub trait BackupSink: Write + Send {
    fn set_metadata(&mut self, _metadata: &BackupMetadata) -> io::Result<()> {
        Ok(())
    }
}

impl BackupSink for Vec<u8> {}

impl BackupSink for std::fs::File {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Frame<'a> {
    Header { version: u32, created_at: i64 },
    Bucket { name: Cow<'a, str>, sequence: u64 },
    Record { key: Cow<'a, [u8]>, value: Cow<'a, [u8]> },
    End,
}

/// A point-in-time view of a store that can enumerate its body frames
pub(crate) trait Snapshot: Send + 'static {
    /// Visit every `Bucket` and `Record` frame, in snapshot order.
    fn for_each_frame(&self, visit: &mut dyn FnMut(&Frame<'_>) -> Result<()>) -> Result<()>;
}

/// Stream `snapshot` into `sink` on a blocking task, racing `cancel`.
///
/// On cancellation the writer is stopped at its next frame and joined before
/// this returns, so the read transaction behind `snapshot` is released and no
/// more bytes reach the sink once the call is over.
pub(crate) async fn stream<S: Snapshot>(
    snapshot: S,
    sink: Box<dyn BackupSink>,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }

    // Also cancelled if this future is dropped mid-select.
    let task_token = cancel.child_token();
    let _guard = task_token.clone().drop_guard();

    let writer_token = task_token.clone();
    let mut task =
        tokio::task::spawn_blocking(move || write_snapshot(&snapshot, sink, writer_token));

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            task_token.cancel();
            // The writer's outcome no longer matters, only that it has stopped.
            let _ = (&mut task).await;
            Err(StorageError::Cancelled)
        }
        joined = &mut task => match joined {
            Ok(result) => result,
            Err(e) => Err(StorageError::BackupTask(e.to_string())),
        },
    }
}

fn checkpoint(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(StorageError::Cancelled);
    }
    Ok(())
}

fn write_snapshot<S: Snapshot>(
    snapshot: &S,
    sink: Box<dyn BackupSink>,
    token: CancellationToken,
) -> Result<()> {
    let result = write_frames(snapshot, sink, &token);
    match result {
        // a refused write surfaces as an io error from deep inside bincode
        Err(_) if token.is_cancelled() => Err(StorageError::Cancelled),
        other => other,
    }
}

fn write_frames<S: Snapshot>(
    snapshot: &S,
    mut sink: Box<dyn BackupSink>,
    token: &CancellationToken,
) -> Result<()> {
    let created_at = Utc::now().timestamp();
    let header = Frame::Header {
        version: FORMAT_VERSION,
        created_at,
    };

    let mut content_length =
        bincode::serialized_size(&header)? + bincode::serialized_size(&Frame::End)?;
    snapshot.for_each_frame(&mut |frame| {
        checkpoint(token)?;
        content_length += bincode::serialized_size(frame)?;
        Ok(())
    })?;

    checkpoint(token)?;
    sink.set_metadata(&BackupMetadata::new(created_at, content_length))?;
    checkpoint(token)?;

    let mut out = BufWriter::new(CancelWriter {
        inner: sink,
        token: token.clone(),
    });
    bincode::serialize_into(&mut out, &header)?;
    snapshot.for_each_frame(&mut |frame| {
        checkpoint(token)?;
        bincode::serialize_into(&mut out, frame)?;
        Ok(())
    })?;
    bincode::serialize_into(&mut out, &Frame::End)?;
    out.flush()?;
    Ok(())
}

/// Refuses further writes once its token is cancelled
struct CancelWriter<W> {
    inner: W,
    token: CancellationToken,
}

impl<W: Write> CancelWriter<W> {
    fn check(&self) -> io::Result<()> {
        if self.token.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "backup cancelled"));
        }
        Ok(())
    }
}

impl<W: Write> Write for CancelWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

/// Decode a snapshot, calling `visit` for each `Bucket` and `Record` frame.
///
/// Fails with `InvalidSnapshot` on a version mismatch, a record outside any
/// bucket, or a stream that ends before its `End` frame.
pub(crate) fn read_frames<R: Read>(
    mut reader: R,
    mut visit: impl FnMut(Frame<'static>) -> Result<()>,
) -> Result<()> {
    match next_frame(&mut reader)? {
        Frame::Header { version, .. } if version == FORMAT_VERSION => {}
        Frame::Header { version, .. } => {
            return Err(StorageError::InvalidSnapshot(format!(
                "unsupported format version {}",
                version
            )))
        }
        _ => return Err(StorageError::InvalidSnapshot("missing header".into())),
    }

    let mut in_bucket = false;
    loop {
        let frame = next_frame(&mut reader)?;
        match frame {
            Frame::End => return Ok(()),
            Frame::Header { .. } => {
                return Err(StorageError::InvalidSnapshot("duplicate header".into()))
            }
            Frame::Bucket { .. } => in_bucket = true,
            Frame::Record { .. } if !in_bucket => {
                return Err(StorageError::InvalidSnapshot(
                    "record before any bucket".into(),
                ))
            }
            Frame::Record { .. } => {}
        }
        visit(frame)?;
    }
}

fn next_frame<R: Read>(reader: &mut R) -> Result<Frame<'static>> {
    bincode::deserialize_from(reader).map_err(|err| {
        if let bincode::ErrorKind::Io(e) = err.as_ref() {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return StorageError::InvalidSnapshot("truncated stream".into());
            }
        }
        StorageError::Serialization(err)
    })
}
