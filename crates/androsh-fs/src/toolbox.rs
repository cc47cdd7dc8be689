//! How a shell backend names the utilities it runs.

use std::sync::OnceLock;
use std::time::Duration;

use androsh_rish::{Runner, shell_quote};
use tracing::{info, warn};

use crate::backend::BackendKind;
use crate::error::FsError;

pub const DEFAULT_BUSYBOX_PATH: &str = "/data/local/tmp/androsh/busybox/busybox";
const DETECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the command word(s) for each utility a shell backend dispatches.
pub trait Toolbox {
    const KIND: BackendKind;
    /// Whether `df` parsing is offered.
    const DISK_USAGE: bool = false;

    /// A baseline POSIX utility; always dispatched, failures surface at run time.
    fn baseline<R: Runner + ?Sized>(&self, runner: &R, utility: &str) -> String;

    /// A utility outside the baseline set. `Err` means it is known to be absent
    /// and nothing should be dispatched.
    fn extended<R: Runner + ?Sized>(&self, runner: &R, utility: &str) -> Result<String, FsError>;
}

/// Whatever the target shell resolves from its `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixToolbox;

impl Toolbox for PosixToolbox {
    const KIND: BackendKind = BackendKind::Shell;

    fn baseline<R: Runner + ?Sized>(&self, _runner: &R, utility: &str) -> String {
        utility.to_string()
    }

    fn extended<R: Runner + ?Sized>(&self, _runner: &R, utility: &str) -> Result<String, FsError> {
        Ok(utility.to_string())
    }
}

/// Detection state; starts `Unknown` and settles once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unknown,
    Available,
    Unavailable,
}

/// A multi-call busybox binary on the target, detected lazily.
#[derive(Debug)]
pub struct BusyboxToolbox {
    path: String,
    available: OnceLock<bool>,
    applets: OnceLock<Vec<String>>,
}

impl BusyboxToolbox {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            available: OnceLock::new(),
            applets: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current detection state without running the check.
    pub fn availability(&self) -> Availability {
        match self.available.get() {
            None => Availability::Unknown,
            Some(true) => Availability::Available,
            Some(false) => Availability::Unavailable,
        }
    }

    /// One `--help` self-test, remembered for the life of this toolbox.
    pub fn is_available<R: Runner + ?Sized>(&self, runner: &R) -> bool {
        *self.available.get_or_init(|| {
            let result = runner.run(
                &format!("{} --help", shell_quote(&self.path)),
                Some(DETECT_TIMEOUT),
            );
            let output = result.output();
            let available = output.contains("BusyBox");
            if available {
                info!(
                    "busybox available at {}: {}",
                    self.path,
                    output.lines().next().unwrap_or_default().trim()
                );
            } else {
                warn!(
                    "busybox at {} not usable (exit {})",
                    self.path, result.exit_code
                );
            }
            available
        })
    }

    /// Applet names from one `--list`, in listing order without duplicates.
    pub fn applets<R: Runner + ?Sized>(&self, runner: &R) -> &[String] {
        self.applets.get_or_init(|| {
            if !self.is_available(runner) {
                return Vec::new();
            }
            let result = runner.run(
                &format!("{} --list", shell_quote(&self.path)),
                Some(DETECT_TIMEOUT),
            );
            if !result.success() {
                warn!("busybox --list failed: {}", result.stderr.trim());
                return Vec::new();
            }
            let mut applets: Vec<String> = Vec::new();
            for name in result.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if !applets.iter().any(|a| a == name) {
                    applets.push(name.to_string());
                }
            }
            applets
        })
    }

    pub fn has_applet<R: Runner + ?Sized>(&self, runner: &R, applet: &str) -> bool {
        self.applets(runner).iter().any(|a| a == applet)
    }

    fn prefixed(&self, utility: &str) -> String {
        format!("{} {utility}", shell_quote(&self.path))
    }
}

impl Toolbox for BusyboxToolbox {
    const KIND: BackendKind = BackendKind::Busybox;
    const DISK_USAGE: bool = true;

    /// Prefixed when the applet is confirmed; otherwise the plain utility.
    fn baseline<R: Runner + ?Sized>(&self, runner: &R, utility: &str) -> String {
        if self.has_applet(runner, utility) {
            self.prefixed(utility)
        } else {
            utility.to_string()
        }
    }

    fn extended<R: Runner + ?Sized>(&self, runner: &R, utility: &str) -> Result<String, FsError> {
        if !self.is_available(runner) {
            return Err(FsError::unsupported(
                Self::KIND,
                format!("run {utility} (busybox unavailable at {})", self.path),
            ));
        }
        if !self.has_applet(runner, utility) {
            return Err(FsError::unsupported(
                Self::KIND,
                format!("run {utility} (applet missing)"),
            ));
        }
        Ok(self.prefixed(utility))
    }
}
