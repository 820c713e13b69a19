use std::path::PathBuf;

use clap::Parser;

use crate::{
    cli::recorder::RecorderArgs,
    config::Config,
    prelude::*,
    rebuild::Rebuilder,
    tables::{build_battery_table, build_cost_table},
};

#[derive(Parser)]
pub struct RebuildArgs {
    #[clap(flatten)]
    recorder: RecorderArgs,

    /// Rebuild entries.
    #[clap(long = "config", env = "BACKFILL_CONFIG", default_value = "backfill.toml")]
    config_path: PathBuf,

    /// Only rebuild the entry with this identifier.
    #[clap(long = "entry", env = "BACKFILL_ENTRY")]
    entry_id: Option<String>,

    /// Rebuild the entries even if their `rebuild` flag is off.
    #[clap(long)]
    force: bool,
}

impl RebuildArgs {
    #[instrument(skip_all)]
    pub async fn run(self) -> Result {
        let config = Config::read(&self.config_path)?;
        let rebuilder = Rebuilder::new(self.recorder.connect().await?);
        let mut n_failed = 0_usize;

        for entry in &config.battery {
            if !self.is_selected(&entry.entry_id, entry.rebuild) {
                continue;
            }
            let outcome = match entry.to_job() {
                Ok(job) => rebuilder.rebuild_battery(&job).await,
                Err(error) => {
                    error!(entry_id = %entry.entry_id, "{error:#}");
                    None
                }
            };
            match outcome {
                Some(outcome) => println!("{}", build_battery_table(&entry.entry_id, &outcome)),
                None => n_failed += 1,
            }
        }

        for entry in &config.cost {
            if !self.is_selected(&entry.entry_id, entry.rebuild) {
                continue;
            }
            let outcome = match entry.to_job() {
                Ok(job) => rebuilder.rebuild_cost(&job).await,
                Err(error) => {
                    error!(entry_id = %entry.entry_id, "{error:#}");
                    None
                }
            };
            match outcome {
                Some(outcome) => println!("{}", build_cost_table(&entry.entry_id, &outcome)),
                None => n_failed += 1,
            }
        }

        ensure!(n_failed == 0, "{n_failed} rebuild(s) did not succeed");
        info!("done");
        Ok(())
    }

    fn is_selected(&self, entry_id: &str, rebuild: bool) -> bool {
        if self.entry_id.as_deref().is_some_and(|selected| selected != entry_id) {
            return false;
        }
        if !rebuild && !self.force {
            info!(entry_id, "rebuild is off, skipping");
            return false;
        }
        true
    }
}
