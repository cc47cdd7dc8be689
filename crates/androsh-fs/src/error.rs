use std::io;

use thiserror::Error;

use crate::backend::BackendKind;

/// Why a single file operation failed on one backend.
///
/// The boolean/optional contract on [`crate::FileBackend`] folds these into
/// `false`/`None` after logging; they are only seen by callers of the
/// `try_*` methods.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("empty path")]
    EmptyPath,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{backend} backend cannot {capability}")]
    Unsupported {
        backend: BackendKind,
        capability: String,
    },

    #[error("command exited {code}: {output}")]
    Command { code: i32, output: String },

    /// The channel could not run the command at all.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected {what} output: {input:?}")]
    Parse { what: &'static str, input: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("checksum mismatch for {path} after {attempts} attempt(s): expected {expected}, got {actual:?}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: Option<String>,
        attempts: u32,
    },

    #[error("refetch failed: {0}")]
    Refetch(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Map a native error onto the same variants the shell backends produce.
    pub fn from_io(path: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_string()),
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied(path.to_string()),
            _ => FsError::Io {
                path: path.to_string(),
                source,
            },
        }
    }

    pub(crate) fn unsupported(backend: BackendKind, capability: impl Into<String>) -> Self {
        FsError::Unsupported {
            backend,
            capability: capability.into(),
        }
    }

    pub(crate) fn parse(what: &'static str, input: impl Into<String>) -> Self {
        FsError::Parse {
            what,
            input: input.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, FsError::AlreadyExists(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, FsError::Unsupported { .. })
    }
}
