use crate::{
    core::{
        row::{DerivedRow, MetadataId},
        sample::Sample,
    },
    prelude::*,
    recorder::metadata::StatisticMetadata,
};

/// Statistics operations of one rebuild, bound to the dialect's transaction model.
///
/// Whatever has not been committed is rolled back when the session is dropped.
#[allow(async_fn_in_trait)]
pub trait StatisticsSession {
    /// Look up the statistic and optionally create it.
    ///
    /// Returns `None` when the statistic does not exist and `create` is not set.
    async fn get_or_create_metadata(
        &mut self,
        metadata: &StatisticMetadata,
        create: bool,
    ) -> Result<Option<MetadataId>>;

    /// All samples of the statistic, ordered by start timestamp.
    async fn query_samples(&mut self, metadata_id: MetadataId) -> Result<Vec<Sample>>;

    /// Delete the long- and short-term statistics of the series.
    ///
    /// Returns the number of deleted rows.
    async fn delete_rows(&mut self, metadata_ids: &[MetadataId]) -> Result<u64>;

    /// Returns the number of inserted rows.
    async fn bulk_insert(&mut self, rows: &[DerivedRow]) -> Result<usize>;

    async fn commit(self) -> Result;

    /// Roll back whatever has not been committed, and release the connection.
    async fn abort(self);
}

/// Replace the derived series with the new rows.
#[instrument(skip_all, fields(n_series = metadata_ids.len(), n_rows = rows.len()))]
pub async fn replace_rows<S: StatisticsSession>(
    session: &mut S,
    metadata_ids: &[MetadataId],
    rows: &[DerivedRow],
) -> Result<usize> {
    let n_deleted = session.delete_rows(metadata_ids).await?;
    info!(n_deleted, "deleted the old statistics");
    let n_inserted = session.bulk_insert(rows).await?;
    info!(n_inserted, "inserted the new statistics");
    Ok(n_inserted)
}
