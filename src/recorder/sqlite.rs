use std::{path::PathBuf, time::Duration};

use sqlx::{
    QueryBuilder,
    Sqlite,
    SqlitePool,
    Transaction,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    core::{
        row::{DerivedRow, MetadataId},
        sample::Sample,
    },
    prelude::*,
    rebuild::RebuildError,
    recorder::{
        SampleRow,
        metadata::StatisticMetadata,
        sample_from_row,
        store::StatisticsSession,
        to_timestamp,
        wait::WaitPolicy,
    },
};

// language=sqlite
const SELECT_METADATA_ID: &str = "SELECT id FROM statistics_meta WHERE statistic_id = ?1";

// language=sqlite
const INSERT_METADATA: &str = "
    INSERT INTO statistics_meta
        (statistic_id, source, unit_of_measurement, unit_class, has_mean, has_sum, name, mean_type)
    VALUES (?1, 'recorder', ?2, ?3, ?4, ?5, NULL, ?6)
";

// language=sqlite
const SELECT_SAMPLES: &str =
    "SELECT start_ts, state, sum FROM statistics WHERE metadata_id = ?1 ORDER BY start_ts";

// language=sqlite
const INSERT_ROWS: &str = "INSERT INTO statistics (created_ts, metadata_id, start_ts, state, sum) ";

/// Takes the write lock upfront: a deferred transaction that has already read
/// cannot be upgraded once the recorder commits to the WAL in between.
// language=sqlite
const BEGIN_IMMEDIATE: &str = "BEGIN IMMEDIATE";

/// Recorder's own writer may hold the database lock for a while.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows per insert statement, keeps the bind parameters under SQLite's limit.
const ROWS_PER_STATEMENT: usize = 1000;

/// SQLite recorder file.
#[must_use]
pub struct SqliteRecorder {
    path: PathBuf,
}

impl SqliteRecorder {
    /// Wait until the recorder database file appears.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn wait_for(path: PathBuf, wait: WaitPolicy) -> Result<Self, RebuildError> {
        let probe_path = &path;
        wait.poll(move || async move {
            ensure!(probe_path.try_exists()?, "`{}` does not exist", probe_path.display());
            Ok(())
        })
        .await
        .ok_or_else(|| {
            RebuildError::Unavailable(format!("`{}` did not appear in time", path.display()))
        })?;
        Ok(Self { path })
    }

    /// Open the exclusive connection and start the rebuild transaction.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn begin(&self) -> Result<SqliteSession> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(false)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        match pool.begin_with(BEGIN_IMMEDIATE).await {
            Ok(transaction) => Ok(SqliteSession { pool, transaction }),
            Err(error) => {
                pool.close().await;
                Err(Error::from(error).context("failed to start the transaction"))
            }
        }
    }
}

/// Single write transaction spanning the whole rebuild.
///
/// The connection gets closed on both [`StatisticsSession::commit`] and [`StatisticsSession::abort`].
pub struct SqliteSession {
    pool: SqlitePool,
    transaction: Transaction<'static, Sqlite>,
}

impl SqliteSession {
    async fn select_metadata_id(&mut self, statistic_id: &str) -> Result<Option<MetadataId>> {
        let id = sqlx::query_scalar::<_, i64>(SELECT_METADATA_ID)
            .bind(statistic_id)
            .fetch_optional(&mut *self.transaction)
            .await
            .with_context(|| format!("failed to look up `{statistic_id}`"))?;
        Ok(id.map(MetadataId))
    }
}

impl StatisticsSession for SqliteSession {
    #[instrument(skip_all, fields(statistic_id = %metadata.statistic_id, create))]
    async fn get_or_create_metadata(
        &mut self,
        metadata: &StatisticMetadata,
        create: bool,
    ) -> Result<Option<MetadataId>> {
        if let Some(metadata_id) = self.select_metadata_id(&metadata.statistic_id).await? {
            return Ok(Some(metadata_id));
        }
        if !create {
            return Ok(None);
        }
        let metadata_id = sqlx::query(INSERT_METADATA)
            .bind(metadata.statistic_id.as_str())
            .bind(metadata.unit.as_str())
            .bind(metadata.unit_class.as_str())
            .bind(metadata.has_mean)
            .bind(metadata.has_sum)
            .bind(metadata.mean_type)
            .execute(&mut *self.transaction)
            .await
            .with_context(|| format!("failed to create `{}`", metadata.statistic_id))?
            .last_insert_rowid();
        let metadata_id = MetadataId(metadata_id);
        info!(%metadata_id, "created the statistic");
        Ok(Some(metadata_id))
    }

    #[instrument(skip_all, fields(metadata_id = %metadata_id))]
    async fn query_samples(&mut self, metadata_id: MetadataId) -> Result<Vec<Sample>> {
        let rows = sqlx::query_as::<_, SampleRow>(SELECT_SAMPLES)
            .bind(metadata_id.0)
            .fetch_all(&mut *self.transaction)
            .await
            .context("failed to query the samples")?;
        debug!(n_samples = rows.len(), "fetched");
        Ok(rows.into_iter().map(sample_from_row).collect())
    }

    #[instrument(skip_all, fields(n_series = metadata_ids.len()))]
    async fn delete_rows(&mut self, metadata_ids: &[MetadataId]) -> Result<u64> {
        if metadata_ids.is_empty() {
            return Ok(0);
        }
        let mut n_deleted = 0;
        for table in ["statistics", "statistics_short_term"] {
            let mut query =
                QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table} WHERE metadata_id IN ("));
            let mut separated = query.separated(", ");
            for metadata_id in metadata_ids {
                separated.push_bind(metadata_id.0);
            }
            separated.push_unseparated(")");
            n_deleted += query
                .build()
                .execute(&mut *self.transaction)
                .await
                .with_context(|| format!("failed to delete from `{table}`"))?
                .rows_affected();
        }
        Ok(n_deleted)
    }

    #[instrument(skip_all, fields(n_rows = rows.len()))]
    async fn bulk_insert(&mut self, rows: &[DerivedRow]) -> Result<usize> {
        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            insert_statement(chunk)
                .build()
                .execute(&mut *self.transaction)
                .await
                .context("failed to insert the rows")?;
        }
        Ok(rows.len())
    }

    async fn commit(self) -> Result {
        let result = self.transaction.commit().await;
        self.pool.close().await;
        result.context("failed to commit")
    }

    async fn abort(self) {
        if let Err(error) = self.transaction.rollback().await {
            warn!("failed to roll back: {error:#}");
        }
        self.pool.close().await;
    }
}

fn insert_statement(rows: &[DerivedRow]) -> QueryBuilder<'static, Sqlite> {
    let mut query = QueryBuilder::new(INSERT_ROWS);
    query.push_values(rows, |mut values, row| {
        values
            .push_bind(to_timestamp(row.created_ts))
            .push_bind(row.metadata_id.0)
            .push_bind(to_timestamp(row.start_ts))
            .push_bind(row.state)
            .push_bind(row.sum);
    });
    query
}
