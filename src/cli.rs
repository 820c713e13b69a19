mod rebuild;
mod recorder;

use clap::{Parser, Subcommand};

use crate::{cli::rebuild::RebuildArgs, prelude::*};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Rebuild the derived statistics of the configured entries.
    #[clap(name = "rebuild")]
    Rebuild(Box<RebuildArgs>),
}

impl Args {
    pub async fn run(self) -> Result {
        match self.command {
            Command::Rebuild(args) => args.run().await,
        }
    }
}
