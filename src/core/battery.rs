//! Virtual battery: injected energy is stored, and the base consumption is served from it first.

use crate::{
    core::{
        reconciler::Reconciler,
        row::{DerivedRow, MetadataId},
        sample::JoinedSample,
    },
    quantity::energy::KilowattHours,
};

/// Something for each of the five derived battery statistics.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BatterySeries<T> {
    pub battery_in: T,
    pub battery_out: T,
    pub capacity: T,
    pub base_emulated: T,
    pub injection_emulated: T,
}

impl<T> BatterySeries<T> {
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> BatterySeries<U> {
        BatterySeries {
            battery_in: f(self.battery_in),
            battery_out: f(self.battery_out),
            capacity: f(self.capacity),
            base_emulated: f(self.base_emulated),
            injection_emulated: f(self.injection_emulated),
        }
    }

    pub fn into_array(self) -> [T; 5] {
        [
            self.battery_in,
            self.battery_out,
            self.capacity,
            self.base_emulated,
            self.injection_emulated,
        ]
    }
}

impl<T: Copy> BatterySeries<T> {
    pub fn zip<U: Copy>(&self, other: &BatterySeries<U>) -> BatterySeries<(T, U)> {
        BatterySeries {
            battery_in: (self.battery_in, other.battery_in),
            battery_out: (self.battery_out, other.battery_out),
            capacity: (self.capacity, other.capacity),
            base_emulated: (self.base_emulated, other.base_emulated),
            injection_emulated: (self.injection_emulated, other.injection_emulated),
        }
    }
}

/// Value of a derived statistic at the end of an interval.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Point {
    pub state: KilowattHours,
    pub sum: KilowattHours,
}

/// Final values of a battery derivation, used to seed the live sensors.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BatteryTotals {
    pub battery_in: KilowattHours,
    pub battery_out: KilowattHours,
    pub capacity: KilowattHours,
    pub base_emulated: KilowattHours,
    pub last_base_state: Option<KilowattHours>,
    pub last_injection_state: Option<KilowattHours>,
}

#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct BatteryModel {
    base: Reconciler,
    injection: Reconciler,

    /// Total energy that went into the battery, including the starting capacity.
    battery_in: KilowattHours,

    /// Total energy taken from the battery, never more than [`Self::battery_in`].
    battery_out: KilowattHours,

    base_total: KilowattHours,

    battery_in_sum: KilowattHours,
    battery_out_sum: KilowattHours,
    base_emulated_sum: KilowattHours,
    injection_emulated_sum: KilowattHours,

    injection_state: Option<KilowattHours>,
}

impl BatteryModel {
    pub fn new(starting_capacity: KilowattHours) -> Self {
        Self {
            base: Reconciler::default(),
            injection: Reconciler::default(),
            battery_in: starting_capacity.non_negative(),
            battery_out: KilowattHours::ZERO,
            base_total: KilowattHours::ZERO,
            battery_in_sum: KilowattHours::ZERO,
            battery_out_sum: KilowattHours::ZERO,
            base_emulated_sum: KilowattHours::ZERO,
            injection_emulated_sum: KilowattHours::ZERO,
            injection_state: None,
        }
    }

    /// Reconcile the next pair of source samples and advance the battery.
    pub fn step(&mut self, sample: &JoinedSample) -> BatterySeries<Point> {
        let delta_base = self.base.delta(&sample.base);
        let delta_injection = self.injection.delta(&sample.injection);
        self.apply(delta_base, delta_injection, sample.injection.state())
    }

    /// Advance the battery by already reconciled interval deltas.
    pub fn apply(
        &mut self,
        delta_base: KilowattHours,
        delta_injection: KilowattHours,
        injection_state: Option<KilowattHours>,
    ) -> BatterySeries<Point> {
        self.battery_in += delta_injection;
        let delta_out = delta_base.min(self.capacity());
        self.battery_out = (self.battery_out + delta_out).min(self.battery_in);
        self.base_total += delta_base;
        let delta_emulated = (delta_base - delta_out).non_negative();

        self.battery_in_sum += delta_injection;
        self.battery_out_sum += delta_out;
        self.base_emulated_sum += delta_emulated;
        self.injection_emulated_sum += delta_injection;

        self.injection_state = injection_state.or(self.injection_state);

        BatterySeries {
            battery_in: Point { state: self.battery_in, sum: self.battery_in_sum },
            battery_out: Point { state: self.battery_out, sum: self.battery_out_sum },
            capacity: Point { state: self.capacity(), sum: KilowattHours::ZERO },
            base_emulated: Point { state: self.base_emulated(), sum: self.base_emulated_sum },
            injection_emulated: Point {
                state: self.injection_state.unwrap_or(self.injection_emulated_sum),
                sum: self.injection_emulated_sum,
            },
        }
    }

    /// Energy currently stored.
    pub fn capacity(&self) -> KilowattHours {
        (self.battery_in - self.battery_out).non_negative()
    }

    /// Part of the base consumption that was not covered by the battery.
    pub fn base_emulated(&self) -> KilowattHours {
        (self.base_total - self.battery_out).non_negative()
    }

    pub fn totals(&self) -> BatteryTotals {
        BatteryTotals {
            battery_in: self.battery_in,
            battery_out: self.battery_out,
            capacity: self.capacity(),
            base_emulated: self.base_emulated(),
            last_base_state: self.base.last_state(),
            last_injection_state: self.injection.last_state(),
        }
    }
}

#[must_use]
pub struct BatteryDerivation {
    pub rows: Vec<DerivedRow>,
    pub totals: BatteryTotals,
}

/// Run the battery model over the whole joined history.
pub fn derive(
    samples: &[JoinedSample],
    starting_capacity: KilowattHours,
    metadata_ids: BatterySeries<MetadataId>,
) -> BatteryDerivation {
    let mut model = BatteryModel::new(starting_capacity);
    let mut rows = Vec::with_capacity(samples.len() * 5);
    for sample in samples {
        let points = model.step(sample);
        rows.extend(metadata_ids.zip(&points).into_array().into_iter().map(
            |(metadata_id, point)| {
                DerivedRow::new(metadata_id, sample.start_ts, point.state.0, point.sum.0)
            },
        ));
    }
    BatteryDerivation { rows, totals: model.totals() }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::core::sample::Sample;

    const IDS: BatterySeries<MetadataId> = BatterySeries {
        battery_in: MetadataId(10),
        battery_out: MetadataId(11),
        capacity: MetadataId(12),
        base_emulated: MetadataId(13),
        injection_emulated: MetadataId(14),
    };

    fn joined(start_ts: i64, base: f64, injection: f64) -> JoinedSample {
        JoinedSample {
            start_ts,
            base: Sample { start_ts, sum: Some(base), state: Some(base) },
            injection: Sample { start_ts, sum: Some(injection), state: Some(injection) },
        }
    }

    #[test]
    fn charge_then_capped_discharge() {
        let mut model = BatteryModel::new(KilowattHours::ZERO);

        let points = model.apply(KilowattHours(2.0), KilowattHours(5.0), None);
        assert_eq!(points.battery_in.state, KilowattHours(5.0));
        assert_eq!(points.battery_out.state, KilowattHours(2.0));
        assert_eq!(points.capacity.state, KilowattHours(3.0));
        assert_eq!(points.base_emulated.state, KilowattHours::ZERO);

        let points = model.apply(KilowattHours(4.0), KilowattHours::ZERO, None);
        assert_eq!(points.battery_in.state, KilowattHours(5.0));
        assert_eq!(points.battery_out.state, KilowattHours(5.0));
        assert_eq!(points.capacity.state, KilowattHours::ZERO);
        assert_eq!(points.base_emulated.state, KilowattHours(1.0));
        assert_eq!(points.base_emulated.sum, KilowattHours(1.0));
        assert_eq!(points.capacity.sum, KilowattHours::ZERO);
    }

    #[test]
    fn starting_capacity_is_seeded_and_clamped() {
        let mut model = BatteryModel::new(KilowattHours(2.0));
        let points = model.apply(KilowattHours(3.0), KilowattHours::ZERO, None);
        assert_eq!(points.battery_out.state, KilowattHours(2.0));
        assert_eq!(points.base_emulated.state, KilowattHours(1.0));

        let model = BatteryModel::new(KilowattHours(-4.0));
        assert_eq!(model.totals().battery_in, KilowattHours::ZERO);
    }

    #[test]
    fn discharge_never_exceeds_charge() {
        let deltas = [
            (1.0, 0.0),
            (0.0, 2.5),
            (3.0, 0.5),
            (0.2, 0.0),
            (7.0, 4.1),
            (0.0, 0.0),
            (1.5, 1.3),
            (9.0, 0.1),
            (0.0, 8.0),
            (2.7, 0.3),
        ];
        let mut model = BatteryModel::new(KilowattHours(0.5));
        for (base, injection) in deltas {
            let points = model.apply(KilowattHours(base), KilowattHours(injection), None);
            assert!(points.battery_out.state <= points.battery_in.state);
            assert!(points.capacity.state >= KilowattHours::ZERO);
            assert!(points.base_emulated.state >= KilowattHours::ZERO);
        }
    }

    #[test]
    fn injection_emulated_follows_the_meter() {
        let mut model = BatteryModel::new(KilowattHours::ZERO);
        let points = model.apply(KilowattHours::ZERO, KilowattHours(1.0), None);
        assert_eq!(points.injection_emulated.state, KilowattHours(1.0));
        let points = model.apply(KilowattHours::ZERO, KilowattHours(1.0), Some(KilowattHours(40.0)));
        assert_eq!(points.injection_emulated.state, KilowattHours(40.0));
        assert_eq!(points.injection_emulated.sum, KilowattHours(2.0));
        let points = model.apply(KilowattHours::ZERO, KilowattHours::ZERO, None);
        assert_eq!(points.injection_emulated.state, KilowattHours(40.0));
    }

    #[test]
    fn derive_rows_ok() {
        let samples = [joined(0, 100.0, 50.0), joined(3600, 102.0, 55.0), joined(7200, 106.0, 55.0)];
        let derivation = derive(&samples, KilowattHours::ZERO, IDS);

        assert_eq!(derivation.rows.len(), 15);
        assert!(derivation.rows.iter().all(|row| row.created_ts == row.start_ts + 3600));

        let battery_out: Vec<_> =
            derivation.rows.iter().filter(|row| row.metadata_id == IDS.battery_out).collect();
        assert_eq!(battery_out.len(), 3);
        assert_eq!(battery_out.iter().map(|row| row.start_ts).collect::<Vec<_>>(), [0, 3600, 7200]);
        assert_abs_diff_eq!(battery_out[2].state, 5.0);

        let capacity: Vec<_> =
            derivation.rows.iter().filter(|row| row.metadata_id == IDS.capacity).collect();
        assert_abs_diff_eq!(capacity[1].state, 3.0);
        assert_abs_diff_eq!(capacity[2].state, 0.0);
        assert!(capacity.iter().all(|row| row.sum == 0.0));

        assert_eq!(derivation.totals.battery_in, KilowattHours(5.0));
        assert_eq!(derivation.totals.battery_out, KilowattHours(5.0));
        assert_eq!(derivation.totals.capacity, KilowattHours::ZERO);
        assert_eq!(derivation.totals.base_emulated, KilowattHours(1.0));
        assert_eq!(derivation.totals.last_base_state, Some(KilowattHours(106.0)));
        assert_eq!(derivation.totals.last_injection_state, Some(KilowattHours(55.0)));
    }
}
