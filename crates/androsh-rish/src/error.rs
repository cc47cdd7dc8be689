use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures while staging the loader payload.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("payload {name} not found (looked in {searched:?})")]
    SourceMissing { name: String, searched: Vec<PathBuf> },

    #[error("staged payload {path} still differs from its source after re-copy")]
    IntegrityMismatch { path: PathBuf },

    #[error("io error staging {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Transport-level failures of a single channel launch.
///
/// `CommandChannel::run` folds these into a synthetic `CommandResult`; they
/// surface as values only from `drun_status` and `check_connection`.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("asset staging failed: {0}")]
    Stage(#[from] StageError),

    #[error("failed to spawn loader {loader}: {source}")]
    Spawn {
        loader: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("exit status marker missing from loader output: {0}")]
    Undecodable(String),

    #[error("privileged shell unreachable: {0}")]
    Unreachable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
