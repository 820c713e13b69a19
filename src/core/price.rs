use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::quantity::rate::KilowattHourRate;

/// Price period as configured by the user.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
pub struct PricePeriod {
    /// First day of the period.
    pub from: NaiveDate,

    /// The period ends at the start of this day.
    pub to: NaiveDate,

    pub price: KilowattHourRate,
}

/// Closed-open `[start_ts, end_ts)` interval with a constant price.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PriceRange {
    /// Inclusive, Unix seconds.
    pub start_ts: i64,

    /// Exclusive, Unix seconds.
    pub end_ts: i64,

    pub price: KilowattHourRate,
}

impl PriceRange {
    #[must_use]
    pub const fn contains(&self, timestamp: i64) -> bool {
        self.start_ts <= timestamp && timestamp < self.end_ts
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end_ts <= self.start_ts
    }
}

impl From<PricePeriod> for PriceRange {
    fn from(period: PricePeriod) -> Self {
        Self {
            start_ts: midnight_utc(period.from),
            end_ts: midnight_utc(period.to),
            price: period.price,
        }
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Price ranges ordered by their start.
///
/// Overlaps are not rejected: the earliest matching range wins.
#[must_use]
#[derive(Clone, Debug, Default)]
pub struct PriceRanges(Vec<PriceRange>);

impl FromIterator<PriceRange> for PriceRanges {
    fn from_iter<T: IntoIterator<Item = PriceRange>>(iter: T) -> Self {
        let mut ranges: Vec<PriceRange> = iter.into_iter().collect();
        ranges.sort_by_key(|range| range.start_ts);
        Self(ranges)
    }
}

impl PriceRanges {
    /// Price in effect at the timestamp, zero when no range covers it.
    pub fn price_at(&self, timestamp: i64) -> KilowattHourRate {
        self.0
            .iter()
            .find(|range| range.contains(timestamp))
            .map_or(KilowattHourRate::ZERO, |range| range.price)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
