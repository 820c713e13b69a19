//! On-disk recorder database with the statistics schema, for tests.

use std::path::PathBuf;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tempfile::TempDir;

use crate::{
    core::row::{DerivedRow, MetadataId},
    prelude::*,
    recorder::{
        from_timestamp,
        sqlite::SqliteRecorder,
        to_timestamp,
        wait::WaitPolicy,
    },
};

// language=sqlite
const SCHEMA: &str = "
    CREATE TABLE statistics_meta (
        id INTEGER NOT NULL PRIMARY KEY,
        statistic_id VARCHAR(255),
        source VARCHAR(32),
        unit_of_measurement VARCHAR(255),
        unit_class VARCHAR(255),
        has_mean BOOLEAN,
        has_sum BOOLEAN,
        name VARCHAR(255),
        mean_type INTEGER NOT NULL DEFAULT 0
    );
    CREATE UNIQUE INDEX ix_statistics_meta_statistic_id ON statistics_meta (statistic_id);

    CREATE TABLE statistics (
        id INTEGER NOT NULL PRIMARY KEY,
        created_ts FLOAT,
        metadata_id INTEGER,
        start_ts FLOAT,
        mean FLOAT,
        min FLOAT,
        max FLOAT,
        last_reset_ts FLOAT,
        state FLOAT,
        sum FLOAT,
        FOREIGN KEY(metadata_id) REFERENCES statistics_meta (id) ON DELETE CASCADE
    );
    CREATE UNIQUE INDEX ix_statistics_statistic_id_start_ts ON statistics (metadata_id, start_ts);

    CREATE TABLE statistics_short_term (
        id INTEGER NOT NULL PRIMARY KEY,
        created_ts FLOAT,
        metadata_id INTEGER,
        start_ts FLOAT,
        mean FLOAT,
        min FLOAT,
        max FLOAT,
        last_reset_ts FLOAT,
        state FLOAT,
        sum FLOAT,
        FOREIGN KEY(metadata_id) REFERENCES statistics_meta (id) ON DELETE CASCADE
    );
    CREATE UNIQUE INDEX ix_statistics_short_term_statistic_id_start_ts
        ON statistics_short_term (metadata_id, start_ts);
";

pub struct RecorderFixture {
    path: PathBuf,
    pool: SqlitePool,

    /// Removes the database when dropped.
    _directory: TempDir,
}

impl RecorderFixture {
    pub async fn new() -> Result<Self> {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("home-assistant_v2.db");
        let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { path, pool, _directory: directory })
    }

    /// Switch to write-ahead logging, the way Home Assistant runs its database.
    pub async fn enable_wal(&self) -> Result {
        sqlx::query("PRAGMA journal_mode = WAL").execute(&self.pool).await?;
        Ok(())
    }

    /// SQLAlchemy-style URL, the way Home Assistant configures it.
    pub fn url(&self) -> String {
        format!("sqlite:///{}", self.path.display())
    }

    pub async fn recorder(&self) -> Result<SqliteRecorder> {
        Ok(SqliteRecorder::wait_for(self.path.clone(), WaitPolicy::default()).await?)
    }

    pub async fn add_statistic(&self, statistic_id: &str) -> Result<MetadataId> {
        let id = sqlx::query(
            "INSERT INTO statistics_meta (statistic_id, source, unit_of_measurement, unit_class, has_sum)
             VALUES (?1, 'recorder', 'kWh', 'energy', 1)",
        )
        .bind(statistic_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(MetadataId(id))
    }

    /// Add `(start_ts, sum, state)` samples.
    pub async fn add_samples(
        &self,
        metadata_id: MetadataId,
        samples: &[(i64, Option<f64>, Option<f64>)],
    ) -> Result {
        for (start_ts, sum, state) in samples {
            sqlx::query(
                "INSERT INTO statistics (created_ts, metadata_id, start_ts, state, sum)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(to_timestamp(start_ts + 3600))
            .bind(metadata_id.0)
            .bind(to_timestamp(*start_ts))
            .bind(*state)
            .bind(*sum)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn add_short_term_samples(&self, metadata_id: MetadataId, start_ts: &[i64]) -> Result {
        for start_ts in start_ts {
            sqlx::query(
                "INSERT INTO statistics_short_term (created_ts, metadata_id, start_ts, state, sum)
                 VALUES (?1, ?2, ?3, 0.0, 0.0)",
            )
            .bind(to_timestamp(start_ts + 300))
            .bind(metadata_id.0)
            .bind(to_timestamp(*start_ts))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn metadata_id(&self, statistic_id: &str) -> Result<Option<MetadataId>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM statistics_meta WHERE statistic_id = ?1")
            .bind(statistic_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.map(MetadataId))
    }

    /// Unit, unit class and whether the statistic has a sum.
    pub async fn metadata_attributes(&self, statistic_id: &str) -> Result<(String, String, bool)> {
        Ok(sqlx::query_as(
            "SELECT unit_of_measurement, unit_class, has_sum FROM statistics_meta WHERE statistic_id = ?1",
        )
        .bind(statistic_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Long-term rows of the statistic, ordered by start timestamp.
    pub async fn rows(&self, metadata_id: MetadataId) -> Result<Vec<DerivedRow>> {
        let rows = sqlx::query_as::<_, (f64, i64, f64, f64, f64)>(
            "SELECT created_ts, metadata_id, start_ts, state, sum FROM statistics
             WHERE metadata_id = ?1 ORDER BY start_ts",
        )
        .bind(metadata_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(created_ts, metadata_id, start_ts, state, sum)| DerivedRow {
                created_ts: from_timestamp(created_ts),
                metadata_id: MetadataId(metadata_id),
                start_ts: from_timestamp(start_ts),
                state,
                sum,
            })
            .collect())
    }

    pub async fn n_rows(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM statistics").fetch_one(&self.pool).await?)
    }

    pub async fn n_short_term_rows(&self, metadata_id: MetadataId) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM statistics_short_term WHERE metadata_id = ?1")
            .bind(metadata_id.0)
            .fetch_one(&self.pool)
            .await?)
    }
}
