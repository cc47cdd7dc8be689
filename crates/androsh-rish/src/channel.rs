use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

#[cfg(unix)]
use std::os::unix::process::{CommandExt, ExitStatusExt};

use crate::asset::{AssetConfig, AssetStager};
use crate::codec::{self, StatusToken};
use crate::error::ChannelError;
use crate::result::CommandResult;

pub const DEFAULT_LOADER: &str = "/system/bin/app_process";
pub const APPLICATION_ID_ENV: &str = "RISH_APPLICATION_ID";
pub const DEFAULT_APPLICATION_ID: &str = "com.termux";
/// Replaced in loader arguments with the staged payload path.
pub const CLASSPATH_PLACEHOLDER: &str = "{classpath}";

const CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const OUTPUT_PREVIEW_CHARS: usize = 512;
const COMMAND_PREVIEW_CHARS: usize = 120;

/// Anything that can execute one shell command and report a `CommandResult`.
pub trait Runner {
    fn run(&self, command: &str, timeout: Option<Duration>) -> CommandResult;
}

impl<R: Runner + ?Sized> Runner for &R {
    fn run(&self, command: &str, timeout: Option<Duration>) -> CommandResult {
        (**self).run(command, timeout)
    }
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
    fn run(&self, command: &str, timeout: Option<Duration>) -> CommandResult {
        (**self).run(command, timeout)
    }
}

/// How the privileged-shell loader is launched.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub loader: PathBuf,
    /// Placed before the command arguments; see [`CLASSPATH_PLACEHOLDER`].
    pub loader_args: Vec<String>,
    pub application_id: String,
    /// Export `application_id` even when the caller's environment already has one.
    pub force_application_id: bool,
    /// Applied to `run` calls that pass no timeout of their own.
    pub default_timeout: Option<Duration>,
    pub assets: AssetConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            loader: PathBuf::from(DEFAULT_LOADER),
            loader_args: default_loader_args(),
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            force_application_id: false,
            default_timeout: None,
            assets: AssetConfig::default(),
        }
    }
}

pub fn default_loader_args() -> Vec<String> {
    vec![
        format!("-Djava.class.path={CLASSPATH_PLACEHOLDER}"),
        "/system/bin".to_string(),
        "--nice-name=rish".to_string(),
        "rikka.shizuku.shell.ShizukuShellLoader".to_string(),
    ]
}

/// Cold-spawns the loader once per command; no session is kept between calls.
pub struct CommandChannel {
    config: ChannelConfig,
    stager: AssetStager,
}

impl CommandChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let stager = AssetStager::new(config.assets.clone());
        Self { config, stager }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn stager(&self) -> &AssetStager {
        &self.stager
    }

    /// Run `command` and decode its merged output and exit status.
    ///
    /// Never fails: spawn errors, timeouts and output without a status marker
    /// come back as a result with `exit_code == 1` and the cause in `stderr`.
    pub fn run(&self, command: &str, timeout: Option<Duration>) -> CommandResult {
        let timeout = timeout.or(self.config.default_timeout);
        match self.try_run(command, timeout) {
            Ok(result) => {
                debug!(
                    "command exited {}: {}",
                    result.exit_code,
                    preview(command, COMMAND_PREVIEW_CHARS)
                );
                result
            }
            Err(err) => {
                warn!(
                    "transport failure running {:?}: {err}",
                    preview(command, COMMAND_PREVIEW_CHARS)
                );
                CommandResult::transport_failure(err.to_string())
            }
        }
    }

    /// Hand the terminal to the privileged shell and exit with its status.
    ///
    /// An empty `command` starts an interactive shell. Spawn and staging
    /// errors terminate the process with status 1.
    pub fn drun(&self, command: &str) -> ! {
        let code = match self.drun_status(command) {
            Ok(code) => code,
            Err(err) => {
                error!("execution failed: {err}");
                1
            }
        };
        std::process::exit(code)
    }

    /// `drun` without the process exit: inherit stdio, wait, return the status.
    pub fn drun_status(&self, command: &str) -> Result<i32, ChannelError> {
        let trailing = if command.trim().is_empty() {
            Vec::new()
        } else {
            vec!["-c".to_string(), command.to_string()]
        };
        let mut cmd = self.loader_command(&trailing)?;
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!("handing off: {}", preview(command, COMMAND_PREVIEW_CHARS));
        let status = cmd.status().map_err(|source| ChannelError::Spawn {
            loader: self.config.loader.clone(),
            source,
        })?;
        Ok(exit_code(status))
    }

    /// Run `id` to prove the privileged shell answers.
    pub fn check_connection(&self) -> Result<String, ChannelError> {
        let timeout = self.config.default_timeout.unwrap_or(CHECK_TIMEOUT);
        let result = self.run("id", Some(timeout));
        if result.success() {
            Ok(result.stdout.trim().to_string())
        } else {
            Err(ChannelError::Unreachable(result.stderr.trim().to_string()))
        }
    }

    fn loader_command(&self, trailing: &[String]) -> Result<Command, ChannelError> {
        let payload = self.stager.ensure_staged()?;
        let classpath = payload.display().to_string();

        let mut cmd = Command::new(&self.config.loader);
        for arg in &self.config.loader_args {
            cmd.arg(arg.replace(CLASSPATH_PLACEHOLDER, &classpath));
        }
        cmd.args(trailing);

        if self.config.force_application_id || std::env::var_os(APPLICATION_ID_ENV).is_none() {
            cmd.env(APPLICATION_ID_ENV, &self.config.application_id);
        }
        Ok(cmd)
    }

    fn try_run(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ChannelError> {
        let token = StatusToken::generate();
        let wrapped = codec::wrap(command, &token);

        let mut cmd = self.loader_command(&["-c".to_string(), wrapped])?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group so a timeout can take down the whole tree.
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ChannelError::Spawn {
            loader: self.config.loader.clone(),
            source,
        })?;

        let stdout = spawn_pipe_reader(child.stdout.take());
        let stderr = spawn_pipe_reader(child.stderr.take());

        let status = match timeout {
            Some(limit) => match child.wait_timeout(limit)? {
                Some(status) => status,
                None => {
                    kill_tree(&mut child);
                    return Err(ChannelError::Timeout(limit));
                }
            },
            None => child.wait()?,
        };

        let deadline = timeout.map(|limit| started + limit);
        let mut merged = match collect_pipe(&stdout, deadline) {
            Some(text) => text,
            None => {
                kill_tree(&mut child);
                return Err(ChannelError::Timeout(timeout.unwrap_or_default()));
            }
        };
        match collect_pipe(&stderr, deadline) {
            Some(text) => merged.push_str(&text),
            None => {
                kill_tree(&mut child);
                return Err(ChannelError::Timeout(timeout.unwrap_or_default()));
            }
        }

        match codec::decode(&merged, &token) {
            Some(decoded) => Ok(CommandResult::from_merged(
                decoded.output,
                decoded.exit_code,
            )),
            None => Err(ChannelError::Undecodable(format!(
                "loader exited {}; output: {}",
                exit_code(status),
                preview(&merged, OUTPUT_PREVIEW_CHARS)
            ))),
        }
    }
}

impl Runner for CommandChannel {
    fn run(&self, command: &str, timeout: Option<Duration>) -> CommandResult {
        CommandChannel::run(self, command, timeout)
    }
}

fn spawn_pipe_reader<R>(pipe: Option<R>) -> Receiver<Vec<u8>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Wait for a reader to hit EOF; `None` once the deadline passes.
fn collect_pipe(rx: &Receiver<Vec<u8>>, deadline: Option<Instant>) -> Option<String> {
    let bytes = match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(bytes) => bytes,
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => Vec::new(),
            }
        }
        None => rx.recv().unwrap_or_default(),
    };
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = i32::try_from(child.id()) {
            // SAFETY: signalling the process group created for this child.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Trimmed `text`, cut to `limit` chars with a trailing ellipsis.
fn preview(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(limit).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loader_args_reference_classpath() {
        let args = default_loader_args();
        assert_eq!(args[0], "-Djava.class.path={classpath}");
        assert!(args.iter().any(|a| a == "rikka.shizuku.shell.ShizukuShellLoader"));
    }

    #[test]
    fn missing_payload_is_a_transport_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let channel = CommandChannel::new(ChannelConfig {
            loader: PathBuf::from("/bin/sh"),
            assets: AssetConfig {
                payload_name: "absent.dex".to_string(),
                resources_dir: None,
                assets_dir: temp.path().to_path_buf(),
                cache_dir: temp.path().join("cache"),
            },
            ..ChannelConfig::default()
        });

        let result = channel.run("echo hi", None);
        assert_eq!(result.exit_code, 1);
        assert!(result.stdout.is_empty());
        assert!(result.stderr.contains("asset staging failed"));
    }

    #[test]
    fn preview_truncates_long_output() {
        let long = "x".repeat(OUTPUT_PREVIEW_CHARS + 10);
        let cut = preview(&long, OUTPUT_PREVIEW_CHARS);
        assert!(cut.ends_with('…'));
        assert_eq!(cut.chars().count(), OUTPUT_PREVIEW_CHARS + 1);
    }

    #[test]
    fn logged_commands_are_cut_short() {
        let payload = format!("printf %s {} | base64 -d > /sdcard/blob", "QUJD".repeat(4096));
        let logged = preview(&payload, COMMAND_PREVIEW_CHARS);
        assert_eq!(logged.chars().count(), COMMAND_PREVIEW_CHARS + 1);
        assert!(logged.starts_with("printf %s QUJD"));
        assert!(!logged.contains("/sdcard/blob"));

        assert_eq!(preview("  id\n", COMMAND_PREVIEW_CHARS), "id");
    }

    #[cfg(unix)]
    #[test]
    fn signal_exit_maps_above_128() {
        let status = ExitStatus::from_raw(9);
        assert_eq!(exit_code(status), 137);
    }
}
