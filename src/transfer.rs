//! Transfer engine
//!
//! Streams an arrival file to its destination in fixed-size chunks. Bytes go
//! to a hidden `.<name>.partial` sibling which is renamed into place only when
//! the copy completes, so the destination path never holds a truncated file.
//! A failed attempt deletes its partial file and the whole copy is retried
//! with a fixed delay.

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::retry::{IsRetryable, with_retry};
use crate::types::Event;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;

/// One failed copy attempt
#[derive(Debug)]
struct AttemptError(io::Error);

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl IsRetryable for AttemptError {
    fn is_retryable(&self) -> bool {
        // A missing source or an unwritable destination will not fix itself
        !matches!(
            self.0.kind(),
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
        )
    }
}

/// Copies arrival files to their destination with retry
#[derive(Clone)]
pub struct TransferEngine {
    config: TransferConfig,
    event_tx: broadcast::Sender<Event>,
}

impl TransferEngine {
    /// Create an engine that reports progress on `event_tx`
    pub fn new(config: TransferConfig, event_tx: broadcast::Sender<Event>) -> Self {
        Self { config, event_tx }
    }

    /// Copy `source` to `dest`, returning the number of bytes written
    pub async fn copy(&self, source: &Path, dest: &Path) -> Result<u64, TransferError> {
        self.copy_with(source, dest, |path| async move {
            tokio::fs::File::open(path).await
        })
        .await
    }

    /// Copy using a caller-supplied way of opening the source
    ///
    /// `open` is called once per attempt.
    pub async fn copy_with<F, Fut, R>(
        &self,
        source: &Path,
        dest: &Path,
        open: F,
    ) -> Result<u64, TransferError>
    where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = io::Result<R>>,
        R: AsyncRead + Unpin,
    {
        let filename = file_name_of(dest);
        let total_bytes = tokio::fs::metadata(source)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        tracing::info!(
            filename = %filename,
            source = %source.display(),
            dest = %dest.display(),
            total_bytes,
            "starting transfer"
        );
        self.emit(Event::TransferStarted {
            filename: filename.clone(),
            source: source.to_path_buf(),
            total_bytes,
        });

        let attempts = AtomicU32::new(0);
        let attempts_ref = &attempts;
        let open_ref = &open;
        let filename_ref = filename.as_str();

        let result = with_retry(&self.config.retry_policy(), move || async move {
            attempts_ref.fetch_add(1, Ordering::SeqCst);
            self.copy_once(source, dest, filename_ref, total_bytes, open_ref)
                .await
                .map_err(AttemptError)
        })
        .await;

        match result {
            Ok(bytes) => {
                tracing::info!(
                    filename = %filename,
                    dest = %dest.display(),
                    bytes,
                    attempts = attempts.load(Ordering::SeqCst),
                    "transfer complete"
                );
                Ok(bytes)
            }
            Err(AttemptError(e)) => Err(TransferError {
                source_path: source.to_path_buf(),
                dest_path: dest.to_path_buf(),
                attempts: attempts.load(Ordering::SeqCst),
                reason: e.to_string(),
            }),
        }
    }

    async fn copy_once<F, Fut, R>(
        &self,
        source: &Path,
        dest: &Path,
        filename: &str,
        total_bytes: u64,
        open: &F,
    ) -> io::Result<u64>
    where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = io::Result<R>>,
        R: AsyncRead + Unpin,
    {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(dest);
        let result = self
            .write_partial(source, &partial, filename, total_bytes, open)
            .await;

        match result {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::rename(&partial, dest).await {
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e);
                }
                Ok(bytes)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&partial).await
                    && remove_err.kind() != io::ErrorKind::NotFound
                {
                    tracing::warn!(
                        path = %partial.display(),
                        error = %remove_err,
                        "failed to remove partial file"
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_partial<F, Fut, R>(
        &self,
        source: &Path,
        partial: &Path,
        filename: &str,
        total_bytes: u64,
        open: &F,
    ) -> io::Result<u64>
    where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = io::Result<R>>,
        R: AsyncRead + Unpin,
    {
        let mut reader = open(source.to_path_buf()).await?;
        let mut out = tokio::fs::File::create(partial).await?;
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let mut written: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            written += n as u64;

            self.emit(Event::TransferProgress {
                filename: filename.to_string(),
                bytes_transferred: written,
                total_bytes,
            });
        }

        out.flush().await?;
        out.sync_all().await?;
        Ok(written)
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Hidden sibling used while a copy is in progress
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = file_name_of(dest);
    dest.with_file_name(format!(".{}.partial", name))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
