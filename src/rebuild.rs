//! Rebuild jobs and the host-facing entry point that runs them.

pub mod battery;
pub mod cost;
mod error;
mod lock;

pub use self::error::RebuildError;
use self::{
    battery::{BatteryOutcome, BatteryRebuild},
    cost::{CostOutcome, CostRebuild},
    lock::EntryLocks,
};
use crate::{
    core::{row::MetadataId, sample::Sample},
    prelude::*,
    recorder::{Recorder, metadata::StatisticMetadata, store::StatisticsSession},
};

/// Rebuild of the derived statistics of one configuration entry.
#[allow(async_fn_in_trait)]
pub trait Job {
    type Outcome;

    fn entry_id(&self) -> &str;

    /// Read the sources, derive the rows and replace the derived series.
    async fn run<S: StatisticsSession>(&self, session: &mut S) -> Result<Self::Outcome, RebuildError>;
}

/// Runs rebuild jobs against the recorder, one at a time per entry.
#[must_use]
pub struct Rebuilder {
    recorder: Recorder,
    locks: EntryLocks,
}

impl Rebuilder {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder, locks: EntryLocks::default() }
    }

    /// Returns `None` if the rebuild did not happen, the reason gets logged.
    pub async fn rebuild_battery(&self, job: &BatteryRebuild) -> Option<BatteryOutcome> {
        self.rebuild(job).await
    }

    /// Returns `None` if the rebuild did not happen, the reason gets logged.
    pub async fn rebuild_cost(&self, job: &CostRebuild) -> Option<CostOutcome> {
        self.rebuild(job).await
    }

    pub async fn rebuild<J: Job>(&self, job: &J) -> Option<J::Outcome> {
        match self.try_rebuild(job).await {
            Ok(outcome) => Some(outcome),
            Err(error @ RebuildError::NoSamples(_)) => {
                warn!(entry_id = job.entry_id(), "nothing to rebuild: {error:#}");
                None
            }
            Err(error) => {
                error!(
                    entry_id = job.entry_id(),
                    transient = error.is_transient(),
                    "rebuild failed: {error:#}",
                );
                None
            }
        }
    }

    /// Run the job while holding the entry's lock, and commit on success.
    #[instrument(skip_all, fields(entry_id = job.entry_id(), dialect = %self.recorder.dialect()))]
    pub async fn try_rebuild<J: Job>(&self, job: &J) -> Result<J::Outcome, RebuildError> {
        let _guard = self.locks.lock(job.entry_id()).await;
        info!("rebuilding…");
        match &self.recorder {
            Recorder::Sqlite(recorder) => execute(recorder.begin().await?, job).await,
            Recorder::MySql(recorder) => execute(recorder.session(), job).await,
        }
    }
}

async fn execute<S: StatisticsSession, J: Job>(
    mut session: S,
    job: &J,
) -> Result<J::Outcome, RebuildError> {
    match job.run(&mut session).await {
        Ok(outcome) => {
            session.commit().await?;
            Ok(outcome)
        }
        Err(error) => {
            session.abort().await;
            Err(error)
        }
    }
}

/// Read all samples of an existing source statistic.
async fn read_source<S: StatisticsSession>(
    session: &mut S,
    statistic_id: &str,
) -> Result<Vec<Sample>, RebuildError> {
    let metadata_id = session
        .get_or_create_metadata(&StatisticMetadata::source(statistic_id), false)
        .await?
        .ok_or_else(|| RebuildError::MissingSource(statistic_id.to_owned()))?;
    let samples = session.query_samples(metadata_id).await?;
    if samples.is_empty() {
        return Err(RebuildError::NoSamples(statistic_id.to_owned()));
    }
    info!(statistic_id, %metadata_id, n_samples = samples.len(), "read the source");
    Ok(samples)
}

/// Find or create a derived statistic.
async fn resolve_target<S: StatisticsSession>(
    session: &mut S,
    metadata: &StatisticMetadata,
) -> Result<MetadataId, RebuildError> {
    let metadata_id = session
        .get_or_create_metadata(metadata, true)
        .await?
        .with_context(|| format!("`{}` has not been created", metadata.statistic_id))?;
    Ok(metadata_id)
}
