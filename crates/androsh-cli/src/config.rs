use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use androsh_fs::DEFAULT_BUSYBOX_PATH;
use androsh_rish::{AssetConfig, ChannelConfig};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::GlobalArgs;

pub const CONFIG_ENV: &str = "ANDROSH_CONFIG";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub channel: ChannelConfig,
    pub busybox: String,
    /// Per-command bound for `run` and the shell file backends.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    loader: Option<PathBuf>,
    loader_args: Option<Vec<String>>,
    application_id: Option<String>,
    force_application_id: Option<bool>,
    timeout_secs: Option<u64>,
    payload_name: Option<String>,
    resources_dir: Option<PathBuf>,
    assets_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    busybox: Option<String>,
}

/// Flag, then config file, then built-in default.
pub fn load_runtime_config(args: &GlobalArgs) -> Result<RuntimeConfig> {
    let file_cfg = match config_path(args) {
        Some(path) => read_file_config(&path)?,
        None => FileConfig::default(),
    };

    let defaults = ChannelConfig::default();
    let timeout_secs = args.timeout.or(file_cfg.timeout_secs);
    let timeout = match timeout_secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => Some(Duration::from_secs(30)),
    };

    let assets = AssetConfig {
        payload_name: file_cfg
            .payload_name
            .unwrap_or(defaults.assets.payload_name),
        resources_dir: args.resources.clone().or(file_cfg.resources_dir),
        assets_dir: file_cfg.assets_dir.unwrap_or(defaults.assets.assets_dir),
        cache_dir: file_cfg.cache_dir.unwrap_or(defaults.assets.cache_dir),
    };

    let channel = ChannelConfig {
        loader: args
            .loader
            .clone()
            .or(file_cfg.loader)
            .unwrap_or(defaults.loader),
        loader_args: file_cfg.loader_args.unwrap_or(defaults.loader_args),
        application_id: args
            .app_id
            .clone()
            .or(file_cfg.application_id)
            .unwrap_or(defaults.application_id),
        force_application_id: args.force_app_id || file_cfg.force_application_id.unwrap_or(false),
        default_timeout: timeout,
        assets,
    };

    Ok(RuntimeConfig {
        channel,
        busybox: args
            .busybox
            .clone()
            .or(file_cfg.busybox)
            .unwrap_or_else(|| DEFAULT_BUSYBOX_PATH.to_string()),
        timeout,
    })
}

/// `--config`, then `$ANDROSH_CONFIG`, then the per-user file when it exists.
fn config_path(args: &GlobalArgs) -> Option<PathBuf> {
    if let Some(path) = &args.config {
        return Some(path.clone());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    default_config_path().filter(|path| path.is_file())
}

fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(xdg).join("androsh/config.toml"));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/androsh/config.toml"))
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str::<FileConfig>(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> GlobalArgs {
        GlobalArgs {
            config: None,
            resources: None,
            loader: None,
            app_id: None,
            force_app_id: false,
            busybox: None,
            timeout: None,
            verbose: 0,
        }
    }

    #[test]
    fn flags_override_file_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
loader = "/file/app_process"
application_id = "org.file"
timeout_secs = 5
busybox = "/file/busybox"
cache_dir = "/file/cache"
"#,
        )
        .expect("write");

        let mut args = args();
        args.config = Some(path);
        args.loader = Some(PathBuf::from("/flag/app_process"));
        args.timeout = Some(9);

        let cfg = load_runtime_config(&args).expect("config");
        assert_eq!(cfg.channel.loader, PathBuf::from("/flag/app_process"));
        assert_eq!(cfg.channel.application_id, "org.file");
        assert_eq!(cfg.timeout, Some(Duration::from_secs(9)));
        assert_eq!(cfg.busybox, "/file/busybox");
        assert_eq!(cfg.channel.assets.cache_dir, PathBuf::from("/file/cache"));
    }

    #[test]
    fn explicit_config_without_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut args = args();
        args.config = Some(temp.path().join("absent.toml"));
        let err = load_runtime_config(&args).expect_err("missing config");
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn malformed_config_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "timeout_secs = \"soon\"").expect("write");
        let mut args = args();
        args.config = Some(path);
        let err = load_runtime_config(&args).expect_err("bad config");
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let mut args = args();
        args.config = Some(PathBuf::from("/dev/null"));
        args.timeout = Some(0);
        let cfg = load_runtime_config(&args).expect("config");
        assert!(cfg.timeout.is_none());
        assert_eq!(cfg.channel.loader, PathBuf::from(androsh_rish::DEFAULT_LOADER));
        assert_eq!(cfg.busybox, DEFAULT_BUSYBOX_PATH);
    }
}
