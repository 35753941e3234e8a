use serde::Serialize;

/// What happened to one payload.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadOutcome {
    pub activities: usize,
    pub projected: usize,
    pub failed: usize,
    pub dropped: usize,
    pub malformed: bool,
    pub acked: bool,
}

/// Running totals for one importer run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub payloads: usize,
    pub malformed_payloads: usize,

    // activities
    pub activities: usize,
    pub projected: usize,
    pub failed_projections: usize,
    pub dropped_activities: usize,

    // delivery
    pub acked: usize,
    pub ack_failures: usize,
    pub source_errors: usize,
}

impl ImportStats {
    pub fn record(&mut self, outcome: &PayloadOutcome) {
        self.payloads += 1;
        if outcome.malformed {
            self.malformed_payloads += 1;
        }

        self.activities += outcome.activities;
        self.projected += outcome.projected;
        self.failed_projections += outcome.failed;
        self.dropped_activities += outcome.dropped;
    }

    pub fn record_ack(&mut self, ok: bool) {
        if ok {
            self.acked += 1;
        } else {
            self.ack_failures += 1;
        }
    }

    pub fn record_source_error(&mut self) {
        self.source_errors += 1;
    }
}
