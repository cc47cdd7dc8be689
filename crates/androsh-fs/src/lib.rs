//! One file-operation contract over three backends: native calls, a raw
//! POSIX shell and a busybox-augmented shell, plus the ordered fallback
//! between them.

pub mod backend;
pub mod direct;
pub mod error;
pub mod info;
pub mod retry;
pub mod selector;
pub mod shell;
pub mod toolbox;

pub use backend::{BackendKind, FileBackend, HashAlgorithm};
pub use direct::DirectBackend;
pub use error::FsError;
pub use info::{DiskUsage, FileInfo, FileKind};
pub use retry::{RetryPolicy, verify_with_retry};
pub use selector::BackendSelector;
pub use shell::{BusyboxBackend, RawShellBackend, ShellBackend};
pub use toolbox::{Availability, BusyboxToolbox, DEFAULT_BUSYBOX_PATH, PosixToolbox, Toolbox};
