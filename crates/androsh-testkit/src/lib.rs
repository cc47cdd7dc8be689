#![cfg(unix)]

//! Shared fixtures for the androsh test suites: a stand-in loader that lets
//! the real command channel run on an ordinary Unix host.
//!
//! The script checks the classpath argument the way the real loader needs it,
//! drops the loader prefix and execs `/bin/sh` with the remaining arguments.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use androsh_rish::{AssetConfig, ChannelConfig, CommandChannel, default_loader_args};

const PAYLOAD_NAME: &str = "rish_test.dex";

const LOADER_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  -Djava.class.path=*) payload="${1#-Djava.class.path=}" ;;
  *) echo "fake loader: missing classpath" >&2; exit 90 ;;
esac
if [ ! -f "$payload" ]; then
  echo "fake loader: payload $payload missing" >&2
  exit 91
fi
shift 4
exec /bin/sh "$@"
"#;

pub struct FakeLoader {
    dir: TempDir,
    loader: PathBuf,
}

impl FakeLoader {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let assets = dir.path().join("assets");
        fs::create_dir_all(&assets)?;
        fs::create_dir_all(dir.path().join("cache"))?;
        fs::write(assets.join(PAYLOAD_NAME), b"dex\n035\0fake payload")?;

        let loader = dir.path().join("app_process");
        fs::write(&loader, LOADER_SCRIPT)?;
        fs::set_permissions(&loader, fs::Permissions::from_mode(0o755))?;

        Ok(Self { dir, loader })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Scratch directory for files the test manipulates.
    pub fn workdir(&self) -> io::Result<PathBuf> {
        let work = self.dir.path().join("work");
        fs::create_dir_all(&work)?;
        Ok(work)
    }

    pub fn config(&self) -> ChannelConfig {
        ChannelConfig {
            loader: self.loader.clone(),
            loader_args: default_loader_args(),
            default_timeout: Some(Duration::from_secs(30)),
            assets: AssetConfig {
                payload_name: PAYLOAD_NAME.to_string(),
                resources_dir: None,
                assets_dir: self.dir.path().join("assets"),
                cache_dir: self.dir.path().join("cache"),
            },
            ..ChannelConfig::default()
        }
    }

    pub fn channel(&self) -> CommandChannel {
        CommandChannel::new(self.config())
    }
}
