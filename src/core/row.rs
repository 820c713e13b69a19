use derive_more::{Display, From};

/// `statistics_meta.id` of a statistic.
#[derive(Copy, Clone, Debug, Display, From, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MetadataId(pub i64);

/// Derived statistics are always hourly.
pub const HOUR_SECS: i64 = 3600;

/// New row of the `statistics` table.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DerivedRow {
    pub created_ts: i64,
    pub metadata_id: MetadataId,
    pub start_ts: i64,
    pub state: f64,
    pub sum: f64,
}

impl DerivedRow {
    pub const fn new(metadata_id: MetadataId, start_ts: i64, state: f64, sum: f64) -> Self {
        Self { created_ts: start_ts + HOUR_SECS, metadata_id, start_ts, state, sum }
    }
}
