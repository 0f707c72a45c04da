//! Tracking policies: per-statistic running aggregates fed while scanning a stream.

use serde::{Deserialize, Serialize};

/// Aggregate kind a statistic is tracked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingKind {
    Max,
    Min,
    Last,
}

/// A running aggregate. `get` is `None` until the first `post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracker {
    kind: TrackingKind,
    value: Option<i64>,
}

impl Tracker {
    pub fn new(kind: TrackingKind) -> Self { Self { kind, value: None } }

    pub fn kind(&self) -> TrackingKind { self.kind }

    /// Incorporate one more observed reading.
    pub fn post(&mut self, value: i64) {
        self.value = Some(match (self.kind, self.value) {
            (_, None) => value,
            (TrackingKind::Max, Some(cur)) => cur.max(value),
            (TrackingKind::Min, Some(cur)) => cur.min(value),
            (TrackingKind::Last, Some(_)) => value,
        });
    }

    pub fn get(&self) -> Option<i64> { self.value }
}
