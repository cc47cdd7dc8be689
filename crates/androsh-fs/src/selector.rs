use std::sync::Arc;

use androsh_rish::Runner;
use tracing::debug;

use crate::backend::{BackendKind, FileBackend, HashAlgorithm};
use crate::direct::DirectBackend;
use crate::shell::ShellBackend;

/// Ordered fallback over several backends: the first one that succeeds wins.
pub struct BackendSelector {
    backends: Vec<Box<dyn FileBackend>>,
}

impl BackendSelector {
    pub fn new(backends: Vec<Box<dyn FileBackend>>) -> Self {
        Self { backends }
    }

    /// Direct, then busybox, then the raw shell, sharing one runner.
    pub fn standard<R>(runner: Arc<R>, busybox_path: impl Into<String>) -> Self
    where
        R: Runner + 'static,
    {
        Self::new(vec![
            Box::new(DirectBackend::new()),
            Box::new(ShellBackend::busybox(Arc::clone(&runner), busybox_path)),
            Box::new(ShellBackend::raw(runner)),
        ])
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub fn backends(&self) -> impl Iterator<Item = &dyn FileBackend> {
        self.backends.iter().map(|b| b.as_ref())
    }

    /// First `Some` produced by `op`, trying backends in order.
    pub fn first<T>(&self, op: &str, mut f: impl FnMut(&dyn FileBackend) -> Option<T>) -> Option<T> {
        for backend in self.backends() {
            if let Some(value) = f(backend) {
                debug!(op, backend = %backend.kind(), "served");
                return Some(value);
            }
            debug!(op, backend = %backend.kind(), "falling through");
        }
        None
    }

    /// `true` as soon as one backend reports success.
    pub fn attempt(&self, op: &str, mut f: impl FnMut(&dyn FileBackend) -> bool) -> bool {
        self.first(op, |backend| f(backend).then_some(())).is_some()
    }

    /// First non-empty digest; disagreement between backends is not reconciled.
    pub fn checksum(&self, path: &str, algorithm: HashAlgorithm) -> Option<String> {
        self.first("checksum", |backend| {
            backend
                .checksum(path, algorithm)
                .filter(|digest| !digest.is_empty())
        })
    }

    pub fn verify_checksum(&self, path: &str, expected: &str, algorithm: HashAlgorithm) -> bool {
        self.checksum(path, algorithm)
            .is_some_and(|actual| actual.eq_ignore_ascii_case(expected.trim()))
    }
}
