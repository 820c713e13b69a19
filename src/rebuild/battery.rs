use tokio::task::spawn_blocking;

use crate::{
    core::{
        battery::{self, BatterySeries, BatteryTotals},
        sample::outer_join,
    },
    prelude::*,
    quantity::energy::KilowattHours,
    rebuild::{Job, RebuildError, read_source, resolve_target},
    recorder::{
        metadata::StatisticMetadata,
        store::{StatisticsSession, replace_rows},
    },
};

/// Virtual battery rebuild of one configuration entry.
#[must_use]
#[derive(Clone, Debug)]
pub struct BatteryRebuild {
    pub entry_id: String,

    /// Base consumption meter.
    pub base: String,

    /// Grid injection meter.
    pub injection: String,

    pub starting_capacity: KilowattHours,

    pub derived: BatterySeries<StatisticMetadata>,
}

#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct BatteryOutcome {
    pub totals: BatteryTotals,
    pub n_rows: usize,
}

impl Job for BatteryRebuild {
    type Outcome = BatteryOutcome;

    fn entry_id(&self) -> &str {
        &self.entry_id
    }

    #[instrument(skip_all, fields(entry_id = %self.entry_id))]
    async fn run<S: StatisticsSession>(&self, session: &mut S) -> Result<BatteryOutcome, RebuildError> {
        let base = read_source(session, &self.base).await?;
        let injection = read_source(session, &self.injection).await?;

        let metadata_ids = BatterySeries {
            battery_in: resolve_target(session, &self.derived.battery_in).await?,
            battery_out: resolve_target(session, &self.derived.battery_out).await?,
            capacity: resolve_target(session, &self.derived.capacity).await?,
            base_emulated: resolve_target(session, &self.derived.base_emulated).await?,
            injection_emulated: resolve_target(session, &self.derived.injection_emulated).await?,
        };

        let starting_capacity = self.starting_capacity;
        let derivation = spawn_blocking(move || {
            let samples = outer_join(&base, &injection);
            battery::derive(&samples, starting_capacity, metadata_ids)
        })
        .await
        .context("the battery derivation has failed")?;

        let n_rows =
            replace_rows(session, &metadata_ids.into_array(), &derivation.rows).await?;
        info!(
            n_rows,
            battery_in = %derivation.totals.battery_in,
            battery_out = %derivation.totals.battery_out,
            capacity = %derivation.totals.capacity,
            "rebuilt",
        );
        Ok(BatteryOutcome { totals: derivation.totals, n_rows })
    }
}
