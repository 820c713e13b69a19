use crate::{prelude::Error, recorder::retry::Contention};

/// Why a rebuild did not happen.
#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("source statistic `{0}` does not exist")]
    MissingSource(String),

    #[error("source statistic `{0}` has no samples")]
    NoSamples(String),

    #[error("recorder is unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported database dialect `{0}`")]
    UnsupportedDialect(String),

    #[error("write contention: {0:#}")]
    Contention(Error),

    #[error(transparent)]
    Backend(Error),
}

impl RebuildError {
    /// Whether trying again later may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Contention(_))
    }
}

impl From<Error> for RebuildError {
    fn from(error: Error) -> Self {
        if error.downcast_ref::<Contention>().is_some() {
            Self::Contention(error)
        } else {
            Self::Backend(error)
        }
    }
}
