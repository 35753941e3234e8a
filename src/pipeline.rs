//! Source → extractor → projector, one payload at a time.
//!
//! A payload is acknowledged only after every activity in it has been
//! attempted, whether or not the attempts succeeded. Malformed payloads are
//! acknowledged too, so the broker does not redeliver them forever.

use crate::broker::BrokerError;
use crate::geo::GeoIndex;
use crate::parser::extract_activities;
use crate::payload::local_time;
use crate::projector::Projector;
use crate::source::{Delivery, Source, SourceError};
use crate::stats::{ImportStats, PayloadOutcome};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct Pipeline<I> {
    source: Source,
    projector: Projector<I>,
    interval: Duration,
    stats: ImportStats,
}

impl<I: GeoIndex> Pipeline<I> {
    pub fn new(source: Source, projector: Projector<I>, interval: Duration) -> Self {
        Self {
            source,
            projector,
            interval,
            stats: ImportStats::default(),
        }
    }

    pub fn projector(&self) -> &Projector<I> {
        &self.projector
    }

    pub fn stats(&self) -> &ImportStats {
        &self.stats
    }

    /// Drains the source. Returns when a finite source is exhausted or a
    /// subscription ends; nothing that goes wrong along the way stops it.
    #[tracing::instrument(skip_all, fields(track_key = %self.projector.track_key()))]
    pub async fn run(&mut self) -> ImportStats {
        while let Some(next) = self.source.next_delivery().await {
            match next {
                Ok(delivery) => {
                    self.process(delivery).await;
                }
                Err(SourceError::Broker(e)) => {
                    self.stats.record_source_error();
                    report_broker_error(&e);
                }
                Err(e) => {
                    self.stats.record_source_error();
                    error!(error = %e, "Failed to obtain payload");
                }
            }
            tokio::time::sleep(self.interval).await;
        }

        info!(
            payloads = self.stats.payloads,
            projected = self.stats.projected,
            failed = self.stats.failed_projections,
            malformed = self.stats.malformed_payloads,
            "Import finished"
        );
        self.stats.clone()
    }

    /// Extracts and projects one payload, then acknowledges it.
    #[tracing::instrument(skip_all, fields(received_at = delivery.payload.received_at()))]
    pub async fn process(&mut self, delivery: Delivery) -> PayloadOutcome {
        let Delivery { payload, ack } = delivery;
        let mut outcome = PayloadOutcome::default();

        let activities = match extract_activities(&payload) {
            Ok(extraction) => {
                outcome.dropped = extraction.dropped;
                extraction.activities
            }
            Err(e) => {
                outcome.malformed = true;
                warn!(error = %e, bytes = payload.len(), "Skipping malformed payload");
                Vec::new()
            }
        };
        outcome.activities = activities.len();

        info!(
            "[{}] Processing {} entries",
            local_time(payload.received_at()),
            activities.len()
        );

        for activity in &activities {
            match self.projector.project(activity).await {
                Ok(()) => outcome.projected += 1,
                Err(e) => {
                    outcome.failed += 1;
                    error!(error = %e, "Projection failed");
                }
            }
        }

        self.stats.record(&outcome);

        if let Some(ack) = ack {
            match ack.ack().await {
                Ok(()) => outcome.acked = true,
                Err(e) => warn!(error = %e, "Failed to acknowledge message"),
            }
            self.stats.record_ack(outcome.acked);
        }

        debug!(?outcome, "Payload done");
        outcome
    }
}

fn report_broker_error(err: &BrokerError) {
    match err {
        BrokerError::ConnectionClosed
        | BrokerError::ChannelClosed
        | BrokerError::ChannelCancelled => warn!("{err}"),
        other => warn!(error = %other, "Broker error"),
    }
}
