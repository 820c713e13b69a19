use crate::{
    core::{
        price::PriceRanges,
        reconciler::Reconciler,
        row::{DerivedRow, MetadataId},
        sample::Sample,
    },
    quantity::{cost::Cost, energy::KilowattHours},
};

/// Final values of a cost derivation.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CostTotals {
    pub cost: Cost,
    pub last_energy_state: Option<KilowattHours>,
}

/// Accumulates the energy cost at the price in effect for each interval.
#[must_use]
#[derive(Copy, Clone, Debug, Default)]
pub struct CostModel {
    energy: Reconciler,
    cost: Cost,
}

impl CostModel {
    /// Reconcile the next energy sample and return the running cost.
    pub fn step(&mut self, sample: &Sample, prices: &PriceRanges) -> Cost {
        let delta = self.energy.delta(sample);
        self.cost += delta * prices.price_at(sample.start_ts);
        self.cost
    }

    pub fn totals(&self) -> CostTotals {
        CostTotals { cost: self.cost, last_energy_state: self.energy.last_state() }
    }
}

#[must_use]
pub struct CostDerivation {
    pub rows: Vec<DerivedRow>,
    pub totals: CostTotals,
}

/// Run the cost model over the whole energy history.
///
/// The cost statistic state and sum are the same running total.
pub fn derive(samples: &[Sample], prices: &PriceRanges, metadata_id: MetadataId) -> CostDerivation {
    let mut model = CostModel::default();
    let rows = samples
        .iter()
        .map(|sample| {
            let cost = model.step(sample, prices);
            DerivedRow::new(metadata_id, sample.start_ts, cost.0, cost.0)
        })
        .collect();
    CostDerivation { rows, totals: model.totals() }
}
