use itertools::{EitherOrBoth, Itertools};

use crate::quantity::energy::KilowattHours;

/// One hourly row of a source statistic as recorded by Home Assistant.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    /// Start of the hour in Unix seconds.
    pub start_ts: i64,

    /// Recorder-maintained running total, independent of the meter's own counter.
    pub sum: Option<f64>,

    /// Meter reading at the hour boundary.
    pub state: Option<f64>,
}

impl Sample {
    /// Counterpart for a timestamp that the other series does not have.
    pub const fn missing(start_ts: i64) -> Self {
        Self { start_ts, sum: Some(0.0), state: None }
    }

    /// Cumulative sum with `NULL` and negative values read as zero.
    pub fn cumulative_sum(&self) -> KilowattHours {
        KilowattHours(self.sum.unwrap_or_default()).non_negative()
    }

    pub fn state(&self) -> Option<KilowattHours> {
        self.state.map(KilowattHours)
    }
}

/// Samples of the two battery sources sharing the same hour.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JoinedSample {
    pub start_ts: i64,
    pub base: Sample,
    pub injection: Sample,
}

/// Full outer join of two series ordered by `start_ts`.
///
/// A timestamp present in only one of the series gets a [`Sample::missing`] counterpart.
pub fn outer_join(base: &[Sample], injection: &[Sample]) -> Vec<JoinedSample> {
    base.iter()
        .merge_join_by(injection, |base, injection| base.start_ts.cmp(&injection.start_ts))
        .map(|pair| match pair {
            EitherOrBoth::Both(base, injection) => {
                JoinedSample { start_ts: base.start_ts, base: *base, injection: *injection }
            }
            EitherOrBoth::Left(base) => JoinedSample {
                start_ts: base.start_ts,
                base: *base,
                injection: Sample::missing(base.start_ts),
            },
            EitherOrBoth::Right(injection) => JoinedSample {
                start_ts: injection.start_ts,
                base: Sample::missing(injection.start_ts),
                injection: *injection,
            },
        })
        .collect()
}
