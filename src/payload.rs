//! Raw feed snapshots and the `{unixSeconds}.json` file layout they are
//! stored under.

use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};

/// One undecoded SIRI VM snapshot, as returned by the feed or carried by a
/// queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    body: Bytes,
    received_at: i64,
}

impl RawPayload {
    pub fn new(body: impl Into<Bytes>, received_at: i64) -> Self {
        Self {
            body: body.into(),
            received_at,
        }
    }

    /// Wraps `body` stamped with the current time.
    pub fn received_now(body: impl Into<Bytes>) -> Self {
        Self::new(body, unix_timestamp())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Arrival time in Unix seconds.
    pub fn received_at(&self) -> i64 {
        self.received_at
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Current time in whole Unix seconds.
pub fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Renders a Unix timestamp in the local time zone for log lines.
pub fn local_time(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(utc) => utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

/// Path a payload received at `ts` is written to: `{directory}/{ts}.json`.
pub fn payload_path(directory: &Path, ts: i64) -> PathBuf {
    directory.join(format!("{ts}.json"))
}

/// Parses the timestamp back out of a `{ts}.json` file name.
///
/// Returns `None` for names that do not follow the layout.
pub fn timestamp_from_file_name(name: &str) -> Option<i64> {
    name.strip_suffix(".json")?.parse().ok()
}
