#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use androsh_fs::{DirectBackend, FileBackend, ShellBackend};
use androsh_rish::CommandChannel;
use androsh_testkit::FakeLoader;

/// Multi-call stand-in: answers `--help` and `--list` and dispatches applets to the host tools.
/// `sha1sum`, `sha512sum` and `chown` are deliberately absent from the list.
const BUSYBOX_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  --help) echo "BusyBox v1.36.1 (test build) multi-call binary."; exit 0 ;;
  --list)
    for applet in base64 cat chmod cp df ln ls md5sum mkdir mv printf readlink rm sha256sum stat tar test wc; do
      echo "$applet"
    done
    exit 0 ;;
esac
applet="$1"
shift
exec "$applet" "$@"
"#;

pub struct Harness {
    pub loader: FakeLoader,
    pub channel: Arc<CommandChannel>,
    pub busybox: PathBuf,
    pub work: PathBuf,
}

impl Harness {
    pub fn new() -> anyhow::Result<Self> {
        let loader = FakeLoader::new()?;
        let work = loader.workdir()?;
        let busybox = loader.root().join("busybox");
        fs::write(&busybox, BUSYBOX_SCRIPT)?;
        fs::set_permissions(&busybox, fs::Permissions::from_mode(0o755))?;
        let channel = Arc::new(loader.channel());
        Ok(Self {
            loader,
            channel,
            busybox,
            work,
        })
    }

    pub fn busybox_path(&self) -> String {
        self.busybox.display().to_string()
    }

    /// Path under the scratch directory as the backends take it.
    pub fn path(&self, name: &str) -> String {
        self.work.join(name).display().to_string()
    }

    pub fn backends(&self) -> Vec<Box<dyn FileBackend>> {
        vec![
            Box::new(DirectBackend::new()),
            Box::new(ShellBackend::busybox(
                Arc::clone(&self.channel),
                self.busybox_path(),
            )),
            Box::new(ShellBackend::raw(Arc::clone(&self.channel))),
        ]
    }
}
