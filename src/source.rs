//! Where the importer takes payloads from.

use crate::broker::{AckHandle, BrokerError, Subscription};
use crate::payload::{RawPayload, timestamp_from_file_name, unix_timestamp};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// A payload and, for queue-backed sources, the handle acknowledging it.
#[derive(Debug)]
pub struct Delivery {
    pub payload: RawPayload,
    pub ack: Option<AckHandle>,
}

/// Replays `{ts}.json` files from a directory, oldest first.
///
/// The directory is listed once when opened; files added later are not
/// seen. Files whose names carry no timestamp come last, by name.
pub struct DirectorySource {
    entries: std::vec::IntoIter<PathBuf>,
}

impl DirectorySource {
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self, SourceError> {
        let directory = directory.as_ref();
        let list_err = |source| SourceError::List {
            path: directory.to_path_buf(),
            source,
        };

        let mut read_dir = tokio::fs::read_dir(directory).await.map_err(list_err)?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(list_err)? {
            let path = entry.path();
            // metadata follows symlinks, so linked snapshots are replayed too
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => entries.push(path),
                Ok(_) => debug!(path = %path.display(), "Skipping non-file entry"),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable entry"),
            }
        }
        entries.sort_by_key(|path| replay_order(path));

        info!("Ready to import {} files...", entries.len());
        Ok(Self {
            entries: entries.into_iter(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    async fn next_delivery(&mut self) -> Option<Result<Delivery, SourceError>> {
        let path = self.entries.next()?;

        let received_at = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(timestamp_from_file_name)
            .unwrap_or_else(|| {
                debug!(path = %path.display(), "File name carries no timestamp");
                unix_timestamp()
            });

        Some(match tokio::fs::read(&path).await {
            Ok(body) => Ok(Delivery {
                payload: RawPayload::new(body, received_at),
                ack: None,
            }),
            Err(source) => Err(SourceError::Read { path, source }),
        })
    }
}

fn replay_order(path: &Path) -> (bool, Option<i64>, Option<std::ffi::OsString>) {
    let name = path.file_name();
    let ts = name
        .and_then(|name| name.to_str())
        .and_then(timestamp_from_file_name);
    (ts.is_none(), ts, name.map(ToOwned::to_owned))
}

/// Consumes messages from a queue subscription; ends only if the
/// subscription does.
pub struct QueueSource {
    subscription: Box<dyn Subscription>,
}

impl QueueSource {
    pub fn new(subscription: impl Subscription + 'static) -> Self {
        Self {
            subscription: Box::new(subscription),
        }
    }

    async fn next_delivery(&mut self) -> Option<Result<Delivery, SourceError>> {
        let message = match self.subscription.next_message().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok(Delivery {
            payload: RawPayload::received_now(message.body),
            ack: Some(message.ack),
        }))
    }
}

pub enum Source {
    Directory(DirectorySource),
    Queue(QueueSource),
}

impl Source {
    /// The next payload, an error for a unit that could not be obtained, or
    /// `None` once the source is exhausted.
    pub async fn next_delivery(&mut self) -> Option<Result<Delivery, SourceError>> {
        match self {
            Source::Directory(source) => source.next_delivery().await,
            Source::Queue(source) => source.next_delivery().await,
        }
    }
}
