//! Where the poller hands each fetched payload.

use crate::broker::{BrokerError, Publish};
use crate::payload::{RawPayload, local_time, payload_path};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to publish to exchange '{destination}': {source}")]
    Publish {
        destination: String,
        #[source]
        source: BrokerError,
    },
}

/// Writes each payload to `{directory}/{receivedAt}.json`.
///
/// The directory must already exist. Two payloads received in the same
/// second share a path and the later one wins.
#[derive(Debug, Clone)]
pub struct FileSink {
    directory: PathBuf,
}

impl FileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn deliver(&self, payload: &RawPayload) -> Result<(), SinkError> {
        let path = payload_path(&self.directory, payload.received_at());
        info!("Writing result to {}", path.display());
        if let Err(source) = tokio::fs::write(&path, payload.body()).await {
            return Err(SinkError::Write { path, source });
        }
        Ok(())
    }
}

/// Publishes each payload as one message.
pub struct QueueSink {
    publisher: Box<dyn Publish>,
}

impl QueueSink {
    pub fn new(publisher: impl Publish + 'static) -> Self {
        Self {
            publisher: Box::new(publisher),
        }
    }

    async fn deliver(&self, payload: &RawPayload) -> Result<(), SinkError> {
        let destination = self.publisher.destination();
        self.publisher
            .publish(payload.body())
            .await
            .map_err(|source| SinkError::Publish {
                destination: destination.to_string(),
                source,
            })?;
        info!(
            exchange = destination,
            "[{}] SIRI VM message sent to exchange.",
            local_time(payload.received_at())
        );
        Ok(())
    }
}

pub enum Sink {
    File(FileSink),
    Queue(QueueSink),
}

impl Sink {
    /// Delivers one payload. Failures are returned, never retried here.
    pub async fn deliver(&self, payload: &RawPayload) -> Result<(), SinkError> {
        match self {
            Sink::File(sink) => sink.deliver(payload).await,
            Sink::Queue(sink) => sink.deliver(payload).await,
        }
    }
}
