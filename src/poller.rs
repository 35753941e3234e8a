//! Fixed-delay polling loop against the SIRI VM feed.

use crate::fetch::{FeedRequest, FetchError, HttpClient, fetch_feed};
use crate::sink::{Sink, SinkError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A fresh correlation token for one poller process.
pub fn generate_requestor_id() -> String {
    Uuid::new_v4().to_string()
}

/// Repeats fetch, deliver, wait until the process exits.
///
/// The `requestorId` inside `request` is fixed for the poller's lifetime, so
/// the feed sees one logical client and can answer with deltas.
pub struct Poller<C> {
    client: C,
    request: FeedRequest,
    sink: Sink,
    interval: Duration,
}

impl<C: HttpClient> Poller<C> {
    pub fn new(client: C, request: FeedRequest, sink: Sink, interval: Duration) -> Self {
        Self {
            client,
            request,
            sink,
            interval,
        }
    }

    pub fn requestor_id(&self) -> &str {
        self.request.requestor_id()
    }

    /// One fetch followed by one delivery.
    pub async fn poll_once(&self) -> Result<(), PollError> {
        let payload = fetch_feed(&self.client, &self.request).await?;
        debug!(bytes = payload.len(), "Feed response received");
        self.sink.deliver(&payload).await?;
        Ok(())
    }

    /// Polls forever. A failed cycle is logged and followed by the normal
    /// wait; the delay is measured from the end of a cycle, so the effective
    /// period is `interval` plus request time.
    #[tracing::instrument(
        skip_all,
        fields(requestor_id = %self.request.requestor_id(), dataset_id = %self.request.dataset_id())
    )]
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs_f64(), "fetching SIRI. ctrl-c to quit.");
        loop {
            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Poll cycle failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
