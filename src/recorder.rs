//! Home Assistant recorder database: the `statistics_meta`, `statistics` and
//! `statistics_short_term` tables on either SQLite or MySQL/MariaDB.

pub mod dialect;
pub mod metadata;
pub mod mysql;
pub mod retry;
pub mod sqlite;
pub mod store;
#[cfg(test)]
pub mod testing;
pub mod wait;

use crate::{
    core::sample::Sample,
    prelude::*,
    rebuild::RebuildError,
    recorder::{
        dialect::{Dialect, Location},
        mysql::MySqlRecorder,
        sqlite::SqliteRecorder,
        wait::WaitPolicy,
    },
};

/// Connected recorder of one of the supported dialects.
pub enum Recorder {
    Sqlite(SqliteRecorder),
    MySql(MySqlRecorder),
}

impl Recorder {
    /// Parse the database URL and wait until the database becomes available.
    #[instrument(skip_all)]
    pub async fn connect(url: &str, wait: WaitPolicy) -> Result<Self, RebuildError> {
        let location: Location = url.parse()?;
        info!(dialect = %location.dialect(), "connecting to the recorder…");
        match location {
            Location::Sqlite(path) => Ok(Self::Sqlite(SqliteRecorder::wait_for(path, wait).await?)),
            Location::MySql { dialect, url } => {
                Ok(Self::MySql(MySqlRecorder::connect(dialect, &url, wait).await?))
            }
        }
    }

    pub const fn dialect(&self) -> Dialect {
        match self {
            Self::Sqlite(_) => Dialect::Sqlite,
            Self::MySql(recorder) => recorder.dialect(),
        }
    }
}

/// The recorder keeps timestamps as floating-point seconds.
#[expect(clippy::cast_precision_loss)]
fn to_timestamp(seconds: i64) -> f64 {
    seconds as f64
}

#[expect(clippy::cast_possible_truncation)]
fn from_timestamp(timestamp: f64) -> i64 {
    timestamp.round() as i64
}

/// Raw `(start_ts, state, sum)` as selected from the `statistics` table.
type SampleRow = (f64, Option<f64>, Option<f64>);

fn sample_from_row((start_ts, state, sum): SampleRow) -> Sample {
    Sample { start_ts: from_timestamp(start_ts), sum, state }
}
