//! File operations dispatched as single shell commands through a [`Runner`].
//!
//! Every path and content argument passes through [`shell_quote`]. The
//! [`Toolbox`] decides the command word for each utility, which is the only
//! difference between the raw-shell and busybox variants.

use std::time::Duration;

use androsh_rish::{CommandResult, Runner, shell_quote};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::backend::{BackendKind, FileBackend, HashAlgorithm};
use crate::error::FsError;
use crate::info::{DiskUsage, FileInfo, FileKind, STAT_FORMAT, base_name, parse_epoch};
use crate::toolbox::{Availability, BusyboxToolbox, PosixToolbox, Toolbox};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub type RawShellBackend<R> = ShellBackend<R, PosixToolbox>;
pub type BusyboxBackend<R> = ShellBackend<R, BusyboxToolbox>;

pub struct ShellBackend<R, T> {
    runner: R,
    toolbox: T,
    timeout: Option<Duration>,
}

impl<R: Runner> ShellBackend<R, PosixToolbox> {
    pub fn raw(runner: R) -> Self {
        Self::with_toolbox(runner, PosixToolbox)
    }
}

impl<R: Runner> ShellBackend<R, BusyboxToolbox> {
    pub fn busybox(runner: R, path: impl Into<String>) -> Self {
        Self::with_toolbox(runner, BusyboxToolbox::new(path))
    }

    pub fn availability(&self) -> Availability {
        self.toolbox.availability()
    }

    pub fn is_available(&self) -> bool {
        self.toolbox.is_available(&self.runner)
    }

    pub fn applets(&self) -> &[String] {
        self.toolbox.applets(&self.runner)
    }

    pub fn has_applet(&self, applet: &str) -> bool {
        self.toolbox.has_applet(&self.runner, applet)
    }
}

impl<R: Runner, T: Toolbox> ShellBackend<R, T> {
    pub fn with_toolbox(runner: R, toolbox: T) -> Self {
        Self {
            runner,
            toolbox,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Per-command wall-clock bound; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn toolbox(&self) -> &T {
        &self.toolbox
    }

    fn base(&self, utility: &str) -> String {
        self.toolbox.baseline(&self.runner, utility)
    }

    fn extended(&self, utility: &str) -> Result<String, FsError> {
        self.toolbox.extended(&self.runner, utility)
    }

    fn dispatch(&self, command: &str) -> CommandResult {
        self.runner.run(command, self.timeout)
    }

    /// Run `command`, returning stdout on exit 0.
    fn expect_ok(&self, command: &str) -> Result<String, FsError> {
        let result = self.dispatch(command);
        if result.success() {
            Ok(result.stdout)
        } else {
            Err(self.failure(&result))
        }
    }

    /// `test`-style query: 0 is true, a silent 1 is false.
    fn query(&self, flag: &str, path: &str) -> Result<bool, FsError> {
        let result = self.dispatch(&format!("{} {flag} {}", self.base("test"), shell_quote(path)));
        match result.exit_code {
            0 => Ok(true),
            1 if result.stderr.trim().is_empty() => Ok(false),
            _ => Err(self.failure(&result)),
        }
    }

    fn failure(&self, result: &CommandResult) -> FsError {
        let output = result.output().trim().to_string();
        if result.is_transport_failure() {
            FsError::Transport(output)
        } else if result.exit_code == 127
            || output.contains("applet not found")
            || output.ends_with("not found")
        {
            FsError::unsupported(T::KIND, format!("find utility ({output})"))
        } else if output.contains("No such file") {
            FsError::NotFound(output)
        } else if output.contains("File exists") {
            FsError::AlreadyExists(output)
        } else if output.contains("Permission denied")
            || output.contains("Operation not permitted")
            || output.contains("Read-only file system")
        {
            FsError::PermissionDenied(output)
        } else {
            FsError::Command {
                code: result.exit_code,
                output,
            }
        }
    }

    /// Grouped so the redirection applies to `printf` alone.
    fn redirect(&self, path: &str, content: &str, op: &str) -> Result<(), FsError> {
        self.expect_ok(&format!(
            "{{ {} '%s' {} {op} {}; }}",
            self.base("printf"),
            shell_quote(content),
            shell_quote(path)
        ))
        .map(drop)
    }

    fn parse_digest(output: &str, algorithm: HashAlgorithm) -> Result<String, FsError> {
        let digest = output
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if digest.len() == algorithm.hex_len() && digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(digest)
        } else {
            Err(FsError::parse("checksum", output))
        }
    }

    /// Separate size/time/type queries for when the batched `stat` fails.
    fn info_fallback(&self, path: &str) -> Result<FileInfo, FsError> {
        let quoted = shell_quote(path);
        let kind = if self.query("-L", path)? {
            FileKind::Symlink
        } else if self.query("-d", path)? {
            FileKind::Directory
        } else if self.query("-f", path)? {
            FileKind::File
        } else if self.query("-e", path)? {
            FileKind::Other
        } else {
            return Err(FsError::NotFound(path.to_string()));
        };

        let stat = self.base("stat");
        let size = match self.expect_ok(&format!("{stat} -c %s {quoted}")) {
            Ok(out) => out.trim().parse::<u64>().ok(),
            Err(_) if kind == FileKind::File => self
                .expect_ok(&format!("{} -c {quoted}", self.base("wc")))
                .ok()
                .and_then(|out| out.split_whitespace().next()?.parse::<u64>().ok()),
            Err(_) => None,
        };
        let modified = self
            .expect_ok(&format!("{stat} -c %Y {quoted}"))
            .ok()
            .and_then(|out| parse_epoch(&out));

        Ok(FileInfo {
            name: base_name(path),
            size: size.unwrap_or(0),
            kind,
            owner: None,
            group: None,
            mode: None,
            modified,
            accessed: None,
            changed: None,
        })
    }
}

impl<R: Runner, T: Toolbox> FileBackend for ShellBackend<R, T> {
    fn kind(&self) -> BackendKind {
        T::KIND
    }

    fn try_exists(&self, path: &str) -> Result<bool, FsError> {
        self.query("-e", path)
    }

    fn try_is_file(&self, path: &str) -> Result<bool, FsError> {
        self.query("-f", path)
    }

    fn try_is_dir(&self, path: &str) -> Result<bool, FsError> {
        self.query("-d", path)
    }

    fn try_mkdir(&self, path: &str, parents: bool) -> Result<(), FsError> {
        let flag = if parents { " -p" } else { "" };
        self.expect_ok(&format!("{}{flag} {}", self.base("mkdir"), shell_quote(path)))
            .map(drop)
    }

    fn try_remove(&self, path: &str, recursive: bool, force: bool) -> Result<(), FsError> {
        let mut flags = String::new();
        if recursive {
            flags.push_str(" -r");
        }
        if force {
            flags.push_str(" -f");
        }
        self.expect_ok(&format!("{}{flags} {}", self.base("rm"), shell_quote(path)))
            .map(drop)
    }

    fn try_copy(&self, src: &str, dst: &str, recursive: bool) -> Result<(), FsError> {
        let flag = if recursive { " -r" } else { "" };
        self.expect_ok(&format!(
            "{}{flag} {} {}",
            self.base("cp"),
            shell_quote(src),
            shell_quote(dst)
        ))
        .map(drop)
    }

    fn try_move(&self, src: &str, dst: &str) -> Result<(), FsError> {
        self.expect_ok(&format!(
            "{} {} {}",
            self.base("mv"),
            shell_quote(src),
            shell_quote(dst)
        ))
        .map(drop)
    }

    fn try_chmod(&self, path: &str, mode: u32, recursive: bool) -> Result<(), FsError> {
        let flag = if recursive { " -R" } else { "" };
        self.expect_ok(&format!(
            "{}{flag} {mode:o} {}",
            self.base("chmod"),
            shell_quote(path)
        ))
        .map(drop)
    }

    fn try_chown(
        &self,
        path: &str,
        owner: &str,
        group: Option<&str>,
        recursive: bool,
    ) -> Result<(), FsError> {
        let chown = self.extended("chown")?;
        let flag = if recursive { " -R" } else { "" };
        let owner_arg = match group {
            Some(group) => format!("{owner}:{group}"),
            None => owner.to_string(),
        };
        self.expect_ok(&format!(
            "{chown}{flag} {} {}",
            shell_quote(&owner_arg),
            shell_quote(path)
        ))
        .map(drop)
    }

    fn try_read(&self, path: &str) -> Result<String, FsError> {
        self.expect_ok(&format!("{} {}", self.base("cat"), shell_quote(path)))
    }

    fn try_read_bytes(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let base64 = self.extended("base64")?;
        let encoded = self.expect_ok(&format!("{base64} {}", shell_quote(path)))?;
        let compact: String = encoded.split_whitespace().collect();
        STANDARD
            .decode(compact.as_bytes())
            .map_err(|_| FsError::parse("base64", encoded))
    }

    fn try_write(&self, path: &str, content: &str) -> Result<(), FsError> {
        self.redirect(path, content, ">")
    }

    fn try_append(&self, path: &str, content: &str) -> Result<(), FsError> {
        self.redirect(path, content, ">>")
    }

    fn try_list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let out = self.expect_ok(&format!("{} -1A {}", self.base("ls"), shell_quote(path)))?;
        Ok(out
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Falls back to md5 when the requested utility is missing.
    fn try_checksum(&self, path: &str, algorithm: HashAlgorithm) -> Result<String, FsError> {
        let mut candidates = vec![algorithm];
        if algorithm != HashAlgorithm::Md5 {
            candidates.push(HashAlgorithm::Md5);
        }

        let mut last = None;
        for candidate in candidates {
            if candidate != algorithm {
                warn!(
                    backend = %T::KIND,
                    path,
                    "{} unavailable, falling back to {}",
                    algorithm.utility(),
                    candidate.utility()
                );
            }
            let command = match self.extended(candidate.utility()) {
                Ok(command) => command,
                Err(err) => {
                    last = Some(err);
                    continue;
                }
            };
            let result = self.dispatch(&format!("{command} {}", shell_quote(path)));
            if result.success() {
                return Self::parse_digest(&result.stdout, candidate);
            }
            let err = self.failure(&result);
            if !err.is_unsupported() {
                return Err(err);
            }
            last = Some(err);
        }
        Err(last.unwrap_or_else(|| FsError::unsupported(T::KIND, "compute checksums")))
    }

    fn try_info(&self, path: &str) -> Result<FileInfo, FsError> {
        let batched = self.expect_ok(&format!(
            "{} -c {} {}",
            self.base("stat"),
            shell_quote(STAT_FORMAT),
            shell_quote(path)
        ));
        match batched {
            Ok(out) => match FileInfo::parse_stat_line(&out, path) {
                Ok(info) => Ok(info),
                Err(err) => {
                    warn!(backend = %T::KIND, path, "batched stat unusable: {err}");
                    self.info_fallback(path)
                }
            },
            Err(err) if err.is_not_found() => Err(err),
            Err(_) => self.info_fallback(path),
        }
    }

    fn try_create_symlink(&self, target: &str, link: &str) -> Result<(), FsError> {
        let ln = self.extended("ln")?;
        self.expect_ok(&format!("{ln} -s {} {}", shell_quote(target), shell_quote(link)))
            .map(drop)
    }

    fn try_read_symlink(&self, link: &str) -> Result<String, FsError> {
        let readlink = self.extended("readlink")?;
        let out = self.expect_ok(&format!("{readlink} {}", shell_quote(link)))?;
        Ok(out.trim_end_matches('\n').to_string())
    }

    fn try_tar_extract(&self, archive: &str, target_dir: &str) -> Result<(), FsError> {
        let tar = self.extended("tar")?;
        self.expect_ok(&format!(
            "{tar} -xpf {} -C {}",
            shell_quote(archive),
            shell_quote(target_dir)
        ))
        .map(drop)
    }

    fn try_disk_usage(&self, path: &str) -> Result<DiskUsage, FsError> {
        if !T::DISK_USAGE {
            return Err(FsError::unsupported(T::KIND, "report disk usage"));
        }
        let df = self.extended("df")?;
        let out = self.expect_ok(&format!("{df} -k {}", shell_quote(path)))?;
        DiskUsage::parse_df(&out)
    }
}
