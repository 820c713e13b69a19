use std::{str::FromStr, time::Duration};

use sqlx::{
    MySql,
    MySqlPool,
    QueryBuilder,
    mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPoolOptions},
};
use tokio::time::sleep;

use crate::{
    core::{
        row::{DerivedRow, MetadataId},
        sample::Sample,
    },
    prelude::*,
    rebuild::RebuildError,
    recorder::{
        SampleRow,
        dialect::Dialect,
        metadata::StatisticMetadata,
        retry::Backoff,
        sample_from_row,
        store::StatisticsSession,
        to_timestamp,
        wait::WaitPolicy,
    },
};

// language=mysql
const SET_LOCK_WAIT_TIMEOUT: &str = "SET SESSION innodb_lock_wait_timeout = 120";

// language=mysql
const SELECT_METADATA_ID: &str = "SELECT id FROM statistics_meta WHERE statistic_id = ?";

// language=mysql
const INSERT_METADATA: &str = "
    INSERT IGNORE INTO statistics_meta
        (statistic_id, source, unit_of_measurement, unit_class, has_mean, has_sum, name, mean_type)
    VALUES (?, 'recorder', ?, ?, ?, ?, NULL, ?)
";

// language=mysql
const SELECT_SAMPLES: &str =
    "SELECT start_ts, state, `sum` FROM statistics WHERE metadata_id = ? ORDER BY start_ts";

// language=mysql
const INSERT_ROWS: &str = "INSERT INTO statistics (created_ts, metadata_id, start_ts, state, `sum`) ";

/// 300 rows per insert transaction, with a pause between the chunks
/// so that the recorder can get its own writes through.
const CHUNKING: Chunking = Chunking { size: 300, pause: Duration::from_millis(100) };

const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

const fn is_lock_contention_code(number: u16) -> bool {
    matches!(number, ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK)
}

/// Whether the error is caused by a lock wait timeout or a deadlock.
pub fn is_lock_contention(error: &Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .filter_map(sqlx::Error::as_database_error)
        .filter_map(|error| error.try_downcast_ref::<MySqlDatabaseError>())
        .any(|error| is_lock_contention_code(error.number()))
}

/// MySQL or MariaDB recorder.
///
/// Every operation takes its own connection and transaction from the pool,
/// so that no lock is held across the whole rebuild.
#[must_use]
pub struct MySqlRecorder {
    dialect: Dialect,
    pool: MySqlPool,
    backoff: Backoff,
}

impl MySqlRecorder {
    /// Create the pool and wait until the server accepts connections.
    #[instrument(skip_all, fields(dialect = %dialect))]
    pub async fn connect(dialect: Dialect, url: &str, wait: WaitPolicy) -> Result<Self, RebuildError> {
        let options = MySqlConnectOptions::from_str(url)
            .map_err(|error| RebuildError::Configuration(format!("invalid database URL: {error}")))?;
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(wait.timeout)
            .after_connect(|connection, _metadata| {
                Box::pin(async move {
                    if let Err(error) = sqlx::query(SET_LOCK_WAIT_TIMEOUT).execute(connection).await {
                        warn!("failed to raise the lock wait timeout: {error:#}");
                    }
                    Ok(())
                })
            })
            .connect_lazy_with(options);
        let probe_pool = &pool;
        wait.poll(move || async move {
            probe_pool.acquire().await.context("failed to connect")?;
            Ok(())
        })
        .await
        .ok_or_else(|| RebuildError::Unavailable("database server did not respond in time".into()))?;
        Ok(Self { dialect, pool, backoff: Backoff::default() })
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub const fn session(&self) -> MySqlSession<'_> {
        MySqlSession(self)
    }

    async fn select_metadata_id<'c>(
        executor: impl sqlx::Executor<'c, Database = MySql>,
        statistic_id: &str,
    ) -> Result<Option<MetadataId>> {
        let id = sqlx::query_scalar::<_, i64>(SELECT_METADATA_ID)
            .bind(statistic_id)
            .fetch_optional(executor)
            .await
            .with_context(|| format!("failed to look up `{statistic_id}`"))?;
        Ok(id.map(MetadataId))
    }

    async fn resolve_metadata(
        &self,
        metadata: &StatisticMetadata,
        create: bool,
    ) -> Result<Option<MetadataId>> {
        let mut transaction = self.pool.begin().await.context("failed to start a transaction")?;
        let existing = Self::select_metadata_id(&mut *transaction, &metadata.statistic_id).await?;
        if existing.is_some() || !create {
            return Ok(existing);
        }
        sqlx::query(INSERT_METADATA)
            .bind(metadata.statistic_id.as_str())
            .bind(metadata.unit.as_str())
            .bind(metadata.unit_class.as_str())
            .bind(metadata.has_mean)
            .bind(metadata.has_sum)
            .bind(metadata.mean_type)
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("failed to create `{}`", metadata.statistic_id))?;
        // A concurrent writer may have won the race, hence the re-select:
        let metadata_id = Self::select_metadata_id(&mut *transaction, &metadata.statistic_id)
            .await?
            .with_context(|| format!("`{}` is missing right after creation", metadata.statistic_id))?;
        transaction.commit().await.context("failed to commit the new statistic")?;
        info!(%metadata_id, "created the statistic");
        Ok(Some(metadata_id))
    }

    async fn delete(&self, metadata_ids: &[MetadataId]) -> Result<u64> {
        let mut transaction = self.pool.begin().await.context("failed to start a transaction")?;
        let mut n_deleted = 0;
        for table in ["statistics", "statistics_short_term"] {
            n_deleted += delete_statement(table, metadata_ids)
                .build()
                .execute(&mut *transaction)
                .await
                .with_context(|| format!("failed to delete from `{table}`"))?
                .rows_affected();
        }
        transaction.commit().await.context("failed to commit the deletion")?;
        Ok(n_deleted)
    }

    async fn insert_chunk(&self, rows: &[DerivedRow]) -> Result {
        let mut transaction = self.pool.begin().await.context("failed to start a transaction")?;
        insert_statement(rows)
            .build()
            .execute(&mut *transaction)
            .await
            .context("failed to insert the chunk")?;
        transaction.commit().await.context("failed to commit the chunk")?;
        Ok(())
    }
}

fn delete_statement(table: &str, metadata_ids: &[MetadataId]) -> QueryBuilder<'static, MySql> {
    let mut query = QueryBuilder::new(format!("DELETE FROM {table} WHERE metadata_id IN ("));
    let mut separated = query.separated(", ");
    for metadata_id in metadata_ids {
        separated.push_bind(metadata_id.0);
    }
    separated.push_unseparated(")");
    query
}

fn insert_statement(rows: &[DerivedRow]) -> QueryBuilder<'static, MySql> {
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

#[derive(Copy, Clone, Debug)]
struct Chunking {
    size: usize,
    pause: Duration,
}

impl Chunking {
    /// Insert the rows chunk by chunk, each chunk retried on its own.
    async fn insert<'a, F, Fut>(
        self,
        rows: &'a [DerivedRow],
        backoff: &Backoff,
        is_transient: impl Fn(&Error) -> bool,
        mut insert_chunk: F,
    ) -> Result<usize>
    where
        F: FnMut(&'a [DerivedRow]) -> Fut,
        Fut: Future<Output = Result>,
    {
        for (i, chunk) in rows.chunks(self.size).enumerate() {
            if i != 0 {
                sleep(self.pause).await;
            }
            backoff.retry(&is_transient, || insert_chunk(chunk)).await?;
            debug!(i, n_rows = chunk.len(), "committed the chunk");
        }
        Ok(rows.len())
    }
}

/// Rebuild operations against the MySQL recorder.
///
/// Everything is committed as it goes. If a later chunk fails, the committed
/// chunks before it stay in the database until the next successful rebuild.
pub struct MySqlSession<'r>(&'r MySqlRecorder);

impl StatisticsSession for MySqlSession<'_> {
    #[instrument(skip_all, fields(statistic_id = %metadata.statistic_id, create))]
    async fn get_or_create_metadata(
        &mut self,
        metadata: &StatisticMetadata,
        create: bool,
    ) -> Result<Option<MetadataId>> {
        let recorder = self.0;
        recorder
            .backoff
            .retry(is_lock_contention, move || async move {
                recorder.resolve_metadata(metadata, create).await
            })
            .await
    }

    #[instrument(skip_all, fields(metadata_id = %metadata_id))]
    async fn query_samples(&mut self, metadata_id: MetadataId) -> Result<Vec<Sample>> {
        let rows = sqlx::query_as::<_, SampleRow>(SELECT_SAMPLES)
            .bind(metadata_id.0)
            .fetch_all(&self.0.pool)
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
        let recorder = self.0;
        recorder
            .backoff
            .retry(is_lock_contention, move || async move { recorder.delete(metadata_ids).await })
            .await
    }

    #[instrument(skip_all, fields(n_rows = rows.len()))]
    async fn bulk_insert(&mut self, rows: &[DerivedRow]) -> Result<usize> {
        let recorder = self.0;
        CHUNKING
            .insert(rows, &recorder.backoff, is_lock_contention, move |chunk| async move {
                recorder.insert_chunk(chunk).await
            })
            .await
    }

    async fn commit(self) -> Result {
        Ok(())
    }

    async fn abort(self) {}
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        time::Instant,
    };

    use tokio::time::timeout;

    use super::*;

    #[test]
    fn lock_contention_codes() {
        assert!(is_lock_contention_code(1205));
        assert!(is_lock_contention_code(1213));
        assert!(!is_lock_contention_code(1062));
    }

    #[test]
    fn other_errors_are_not_contention() {
        assert!(!is_lock_contention(&anyhow!("connection refused")));
        assert!(!is_lock_contention(&Error::from(sqlx::Error::RowNotFound).context("lookup")));
    }

    #[test]
    fn insert_statement_ok() {
        let rows = [
            DerivedRow::new(MetadataId(1), 0, 1.0, 1.0),
            DerivedRow::new(MetadataId(2), 3600, 2.0, 2.0),
        ];
        let statement = insert_statement(&rows);
        assert_eq!(
            statement.sql(),
            "INSERT INTO statistics (created_ts, metadata_id, start_ts, state, `sum`) \
             VALUES (?, ?, ?, ?, ?), (?, ?, ?, ?, ?)"
        );
    }

    #[test]
    fn delete_statement_ok() {
        let statement = delete_statement("statistics_short_term", &[MetadataId(3), MetadataId(4)]);
        assert_eq!(statement.sql(), "DELETE FROM statistics_short_term WHERE metadata_id IN (?, ?)");
    }

    #[derive(Debug, thiserror::Error)]
    #[error("deadlock")]
    struct Deadlock;

    fn is_deadlock(error: &Error) -> bool {
        error.downcast_ref::<Deadlock>().is_some()
    }

    const FAST: Backoff = Backoff { n_attempts: 3, base_delay: Duration::from_millis(1) };

    fn rows(n_rows: i64) -> Vec<DerivedRow> {
        (0..n_rows).map(|i| DerivedRow::new(MetadataId(1), i * 3600, 0.0, 0.0)).collect()
    }

    #[tokio::test]
    async fn rows_are_chunked_with_pauses() -> Result {
        let chunking = Chunking { pause: Duration::from_millis(20), ..CHUNKING };
        let rows = rows(701);
        let calls = &RefCell::new(Vec::new());

        let n_inserted = chunking
            .insert(&rows, &FAST, is_deadlock, move |chunk| async move {
                calls.borrow_mut().push((Instant::now(), chunk.len()));
                Ok(())
            })
            .await?;

        assert_eq!(n_inserted, 701);
        let calls = calls.take();
        assert_eq!(calls.iter().map(|(_, len)| *len).collect::<Vec<_>>(), [300, 300, 101]);
        for window in calls.windows(2) {
            assert!(window[1].0 - window[0].0 >= chunking.pause);
        }
        Ok(())
    }

    #[tokio::test]
    async fn single_chunk_is_not_paused() -> Result {
        let chunking = Chunking { pause: Duration::from_secs(60), ..CHUNKING };
        let rows = rows(300);
        let insert = chunking.insert(&rows, &FAST, is_deadlock, |_| async { Ok(()) });
        assert_eq!(timeout(Duration::from_secs(5), insert).await??, 300);
        Ok(())
    }

    #[tokio::test]
    async fn only_the_failed_chunk_is_retried() -> Result {
        let rows = rows(701);
        let calls = &RefCell::new(Vec::new());

        CHUNKING
            .insert(&rows, &FAST, is_deadlock, move |chunk| async move {
                let start_ts = chunk[0].start_ts;
                let is_first_attempt = !calls.borrow().contains(&start_ts);
                calls.borrow_mut().push(start_ts);
                if start_ts == 300 * 3600 && is_first_attempt { Err(Deadlock.into()) } else { Ok(()) }
            })
            .await?;

        assert_eq!(calls.take(), [0, 300 * 3600, 300 * 3600, 600 * 3600]);
        Ok(())
    }

    #[tokio::test]
    async fn permanent_chunk_failure_stops_the_insert() {
        let rows = rows(701);
        let n_calls = &Cell::new(0);

        let error = CHUNKING
            .insert(&rows, &FAST, is_deadlock, move |_| async move {
                n_calls.set(n_calls.get() + 1);
                Err(anyhow!("syntax error"))
            })
            .await
            .unwrap_err();

        assert_eq!(n_calls.get(), 1);
        assert!(error.to_string().contains("syntax error"));
    }
}
