//! Staging of the loader payload.
//!
//! The loader reads its classpath from a copy of the payload kept in a shared
//! cache directory. Before every launch the copy is compared against its
//! source by content hash and replaced (then locked read-only) when stale.

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::StageError;

pub const DEFAULT_PAYLOAD_NAME: &str = "rish_shizuku.dex";
const BUNDLED_ASSETS_DIR: &str = "assets";

/// Where the payload comes from and where its working copy lives.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub payload_name: String,
    /// Checked first; typically the directory the user exported the payload to.
    pub resources_dir: Option<PathBuf>,
    /// Bundled default location.
    pub assets_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            payload_name: DEFAULT_PAYLOAD_NAME.to_string(),
            resources_dir: None,
            assets_dir: default_assets_dir(),
            cache_dir: std::env::temp_dir(),
        }
    }
}

/// Assets shipped next to the running binary, else `./assets`.
pub fn default_assets_dir() -> PathBuf {
    if let Ok(current) = std::env::current_exe()
        && let Some(parent) = current.parent()
    {
        let sibling = parent.join(BUNDLED_ASSETS_DIR);
        if sibling.is_dir() {
            return sibling;
        }
    }
    PathBuf::from(BUNDLED_ASSETS_DIR)
}

/// State of the staged payload after the most recent check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub source: PathBuf,
    pub cached: PathBuf,
    pub sha256: String,
    pub read_only: bool,
}

pub struct AssetStager {
    config: AssetConfig,
    record: Mutex<Option<AssetRecord>>,
}

impl AssetStager {
    pub fn new(config: AssetConfig) -> Self {
        Self {
            config,
            record: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// Record from the last successful `ensure_staged`, if any.
    pub fn record(&self) -> Option<AssetRecord> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn cached_path(&self) -> PathBuf {
        self.config.cache_dir.join(&self.config.payload_name)
    }

    /// Override resource directory first, then the bundled assets directory.
    pub fn resolve_source(&self) -> Result<PathBuf, StageError> {
        let mut searched = Vec::with_capacity(2);
        if let Some(dir) = &self.config.resources_dir {
            let candidate = dir.join(&self.config.payload_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
            searched.push(candidate);
        }

        let bundled = self.config.assets_dir.join(&self.config.payload_name);
        if bundled.is_file() {
            return Ok(bundled);
        }
        searched.push(bundled);

        Err(StageError::SourceMissing {
            name: self.config.payload_name.clone(),
            searched,
        })
    }

    /// Make sure the cached payload matches its source and is read-only.
    pub fn ensure_staged(&self) -> Result<PathBuf, StageError> {
        let source = self.resolve_source()?;
        let cached = self.cached_path();

        let source_hash = sha256_file(&source)?;
        let cached_hash = match fs::metadata(&cached) {
            Ok(_) => Some(sha256_file(&cached)?),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(StageError::io(&cached, err)),
        };

        if cached_hash.as_deref() != Some(source_hash.as_str()) {
            info!(
                "staging payload {} -> {} (cached hash {:?})",
                source.display(),
                cached.display(),
                cached_hash
            );
            restage(&source, &cached)?;
            if sha256_file(&cached)? != source_hash {
                return Err(StageError::IntegrityMismatch { path: cached });
            }
        } else {
            debug!("payload {} is current", cached.display());
        }

        lock_read_only(&cached)?;

        *self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(AssetRecord {
            source,
            cached: cached.clone(),
            sha256: source_hash,
            read_only: true,
        });
        Ok(cached)
    }
}

fn restage(source: &Path, cached: &Path) -> Result<(), StageError> {
    if let Some(parent) = cached.parent() {
        fs::create_dir_all(parent).map_err(|e| StageError::io(parent, e))?;
    }

    match fs::symlink_metadata(cached) {
        Ok(_) => {
            unlock(cached)?;
            fs::remove_file(cached).map_err(|e| StageError::io(cached, e))?;
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(StageError::io(cached, err)),
    }

    fs::copy(source, cached).map_err(|e| StageError::io(cached, e))?;
    Ok(())
}

#[cfg(unix)]
fn unlock(path: &Path) -> Result<(), StageError> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
        .map_err(|e| StageError::io(path, e))
}

#[cfg(not(unix))]
fn unlock(path: &Path) -> Result<(), StageError> {
    let mut perms = fs::metadata(path)
        .map_err(|e| StageError::io(path, e))?
        .permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms).map_err(|e| StageError::io(path, e))
}

#[cfg(unix)]
fn lock_read_only(path: &Path) -> Result<(), StageError> {
    let mode = fs::metadata(path)
        .map_err(|e| StageError::io(path, e))?
        .permissions()
        .mode();
    if mode & 0o222 != 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(0o444))
            .map_err(|e| StageError::io(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_read_only(path: &Path) -> Result<(), StageError> {
    let mut perms = fs::metadata(path)
        .map_err(|e| StageError::io(path, e))?
        .permissions();
    if !perms.readonly() {
        perms.set_readonly(true);
        fs::set_permissions(path, perms).map_err(|e| StageError::io(path, e))?;
    }
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String, StageError> {
    let mut file = fs::File::open(path).map_err(|e| StageError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| StageError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stager(root: &Path, resources: Option<PathBuf>) -> AssetStager {
        AssetStager::new(AssetConfig {
            payload_name: "payload.dex".to_string(),
            resources_dir: resources,
            assets_dir: root.join("assets"),
            cache_dir: root.join("cache"),
        })
    }

    #[test]
    fn missing_source_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = stager(temp.path(), None)
            .ensure_staged()
            .expect_err("no payload anywhere");
        assert!(matches!(err, StageError::SourceMissing { .. }));
    }

    #[test]
    fn stages_bundled_copy_read_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("assets")).expect("mkdir");
        fs::write(temp.path().join("assets/payload.dex"), b"v1").expect("write");

        let stager = stager(temp.path(), None);
        let cached = stager.ensure_staged().expect("staged");
        assert_eq!(cached, temp.path().join("cache/payload.dex"));
        assert_eq!(fs::read(&cached).expect("read"), b"v1");
        assert!(fs::metadata(&cached).expect("meta").permissions().readonly());

        let record = stager.record().expect("record");
        assert!(record.read_only);
        assert_eq!(record.sha256, hex::encode(Sha256::digest(b"v1")));
    }

    #[test]
    fn override_directory_wins() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resources = temp.path().join("resources");
        fs::create_dir_all(temp.path().join("assets")).expect("mkdir");
        fs::create_dir_all(&resources).expect("mkdir");
        fs::write(temp.path().join("assets/payload.dex"), b"bundled").expect("write");
        fs::write(resources.join("payload.dex"), b"override").expect("write");

        let stager = stager(temp.path(), Some(resources.clone()));
        assert_eq!(
            stager.resolve_source().expect("source"),
            resources.join("payload.dex")
        );
        let cached = stager.ensure_staged().expect("staged");
        assert_eq!(fs::read(cached).expect("read"), b"override");
    }

    #[test]
    fn override_without_payload_falls_back_to_bundled() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resources = temp.path().join("resources");
        fs::create_dir_all(temp.path().join("assets")).expect("mkdir");
        fs::create_dir_all(&resources).expect("mkdir");
        fs::write(temp.path().join("assets/payload.dex"), b"bundled").expect("write");

        let stager = stager(temp.path(), Some(resources));
        assert_eq!(
            stager.resolve_source().expect("source"),
            temp.path().join("assets/payload.dex")
        );
    }

    #[test]
    fn stale_copy_is_replaced() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("assets")).expect("mkdir");
        let source = temp.path().join("assets/payload.dex");
        fs::write(&source, b"v1").expect("write");

        let stager = stager(temp.path(), None);
        let cached = stager.ensure_staged().expect("first stage");

        fs::write(&source, b"v2").expect("update source");
        let again = stager.ensure_staged().expect("restage");
        assert_eq!(again, cached);
        assert_eq!(fs::read(&cached).expect("read"), b"v2");
        assert!(fs::metadata(&cached).expect("meta").permissions().readonly());
    }

    #[test]
    fn current_copy_is_left_alone() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("assets")).expect("mkdir");
        fs::write(temp.path().join("assets/payload.dex"), b"same").expect("write");

        let stager = stager(temp.path(), None);
        let cached = stager.ensure_staged().expect("first stage");
        let before = fs::metadata(&cached).expect("meta").modified().expect("mtime");
        stager.ensure_staged().expect("second stage");
        let after = fs::metadata(&cached).expect("meta").modified().expect("mtime");
        assert_eq!(before, after);
    }
}
