use tokio::task::spawn_blocking;

use crate::{
    core::{
        cost::{self, CostTotals},
        price::PriceRanges,
    },
    prelude::*,
    rebuild::{Job, RebuildError, read_source, resolve_target},
    recorder::{
        metadata::StatisticMetadata,
        store::{StatisticsSession, replace_rows},
    },
};

/// Energy cost rebuild of one configuration entry.
#[must_use]
#[derive(Clone, Debug)]
pub struct CostRebuild {
    pub entry_id: String,

    /// Energy meter the cost is derived from.
    pub energy: String,

    pub cost: StatisticMetadata,

    pub prices: PriceRanges,
}

#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct CostOutcome {
    pub totals: CostTotals,
    pub n_rows: usize,
}

impl Job for CostRebuild {
    type Outcome = CostOutcome;

    fn entry_id(&self) -> &str {
        &self.entry_id
    }

    #[instrument(skip_all, fields(entry_id = %self.entry_id, n_prices = self.prices.len()))]
    async fn run<S: StatisticsSession>(&self, session: &mut S) -> Result<CostOutcome, RebuildError> {
        let samples = read_source(session, &self.energy).await?;
        let metadata_id = resolve_target(session, &self.cost).await?;

        let prices = self.prices.clone();
        let derivation = spawn_blocking(move || cost::derive(&samples, &prices, metadata_id))
            .await
            .context("the cost derivation has failed")?;

        let n_rows = replace_rows(session, &[metadata_id], &derivation.rows).await?;
        info!(n_rows, cost = %derivation.totals.cost, "rebuilt");
        Ok(CostOutcome { totals: derivation.totals, n_rows })
    }
}
