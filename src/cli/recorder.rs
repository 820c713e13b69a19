use clap::Parser;

use crate::{
    rebuild::RebuildError,
    recorder::{Recorder, wait::WaitPolicy},
};

#[derive(Parser)]
pub struct RecorderArgs {
    /// Recorder database URL, for example: `sqlite:////config/home-assistant_v2.db`.
    #[clap(long = "recorder-url", env = "RECORDER_DB_URL")]
    url: String,

    /// How long to wait for the database to become available.
    #[clap(long, env = "RECORDER_WAIT_TIMEOUT", default_value = "60s")]
    wait_timeout: humantime::Duration,

    #[clap(long, env = "RECORDER_WAIT_INTERVAL", default_value = "2s")]
    wait_interval: humantime::Duration,
}

impl RecorderArgs {
    pub async fn connect(&self) -> Result<Recorder, RebuildError> {
        let wait =
            WaitPolicy { timeout: self.wait_timeout.into(), interval: self.wait_interval.into() };
        Recorder::connect(&self.url, wait).await
    }
}
