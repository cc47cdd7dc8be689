//! The file-operation contract shared by every backend.
//!
//! Implementors supply the fallible `try_*` methods. The provided methods on
//! top of them are the public contract: blank paths are rejected, operations
//! whose target is already in the desired state count as success, every call
//! emits one structured trace record, and failures collapse to
//! `false`/`None`/empty so one backend can stand in for another.

use std::fmt;
use std::str::FromStr;

use globset::Glob;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::FsError;
use crate::info::{DiskUsage, FileInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Direct,
    Busybox,
    Shell,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Direct => "direct",
            BackendKind::Busybox => "busybox",
            BackendKind::Shell => "shell",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(BackendKind::Direct),
            "busybox" => Ok(BackendKind::Busybox),
            "shell" | "raw" => Ok(BackendKind::Shell),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Name of the coreutils/busybox program computing this digest.
    pub fn utility(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5sum",
            HashAlgorithm::Sha1 => "sha1sum",
            HashAlgorithm::Sha256 => "sha256sum",
            HashAlgorithm::Sha512 => "sha512sum",
        }
    }

    /// Length of the digest in hex characters.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(format!("unsupported hash algorithm: {other}")),
        }
    }
}

/// One interchangeable implementation of the file-operation set.
pub trait FileBackend {
    fn kind(&self) -> BackendKind;

    fn try_exists(&self, path: &str) -> Result<bool, FsError>;
    fn try_is_file(&self, path: &str) -> Result<bool, FsError>;
    fn try_is_dir(&self, path: &str) -> Result<bool, FsError>;
    fn try_mkdir(&self, path: &str, parents: bool) -> Result<(), FsError>;
    fn try_remove(&self, path: &str, recursive: bool, force: bool) -> Result<(), FsError>;
    fn try_copy(&self, src: &str, dst: &str, recursive: bool) -> Result<(), FsError>;
    fn try_move(&self, src: &str, dst: &str) -> Result<(), FsError>;
    fn try_chmod(&self, path: &str, mode: u32, recursive: bool) -> Result<(), FsError>;
    fn try_chown(
        &self,
        path: &str,
        owner: &str,
        group: Option<&str>,
        recursive: bool,
    ) -> Result<(), FsError>;
    fn try_read(&self, path: &str) -> Result<String, FsError>;
    fn try_read_bytes(&self, path: &str) -> Result<Vec<u8>, FsError>;
    fn try_write(&self, path: &str, content: &str) -> Result<(), FsError>;
    fn try_append(&self, path: &str, content: &str) -> Result<(), FsError>;
    /// Entry names, dot-files included, in the order the backend lists them.
    fn try_list_dir(&self, path: &str) -> Result<Vec<String>, FsError>;
    /// Lowercase hex digest.
    fn try_checksum(&self, path: &str, algorithm: HashAlgorithm) -> Result<String, FsError>;
    fn try_info(&self, path: &str) -> Result<FileInfo, FsError>;
    fn try_create_symlink(&self, target: &str, link: &str) -> Result<(), FsError>;
    fn try_read_symlink(&self, link: &str) -> Result<String, FsError>;
    fn try_tar_extract(&self, archive: &str, target_dir: &str) -> Result<(), FsError>;
    fn try_disk_usage(&self, path: &str) -> Result<DiskUsage, FsError>;

    fn exists(&self, path: &str) -> bool {
        let outcome = non_blank(path).and_then(|p| self.try_exists(p));
        settle(self.kind(), "exists", path, outcome).unwrap_or(false)
    }

    fn is_file(&self, path: &str) -> bool {
        let outcome = non_blank(path).and_then(|p| self.try_is_file(p));
        settle(self.kind(), "is_file", path, outcome).unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        let outcome = non_blank(path).and_then(|p| self.try_is_dir(p));
        settle(self.kind(), "is_dir", path, outcome).unwrap_or(false)
    }

    /// With `parents`, an existing directory is success.
    fn mkdir(&self, path: &str, parents: bool) -> bool {
        let outcome = non_blank(path).and_then(|p| match self.try_mkdir(p, parents) {
            Err(err) if parents && err.is_already_exists() && matches!(self.try_is_dir(p), Ok(true)) => {
                Ok(())
            }
            other => other,
        });
        settle(self.kind(), "mkdir", path, outcome).is_some()
    }

    /// Removing an absent path is success.
    fn remove(&self, path: &str, recursive: bool, force: bool) -> bool {
        let outcome = non_blank(path).and_then(|p| match self.try_remove(p, recursive, force) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        });
        settle(self.kind(), "remove", path, outcome).is_some()
    }

    /// Empty a directory, dot-files included, and keep the directory itself.
    fn clean_dir(&self, path: &str) -> bool {
        let outcome = non_blank(path).and_then(|p| {
            if !self.try_is_dir(p)? {
                return Err(FsError::NotFound(p.to_string()));
            }
            let parent = p.trim_end_matches('/');
            for name in self.try_list_dir(p)? {
                match self.try_remove(&format!("{parent}/{name}"), true, true) {
                    Err(err) if !err.is_not_found() => return Err(err),
                    _ => {}
                }
            }
            Ok(())
        });
        settle(self.kind(), "clean_dir", path, outcome).is_some()
    }

    fn copy(&self, src: &str, dst: &str, recursive: bool) -> bool {
        let outcome = non_blank(src)
            .and(non_blank(dst))
            .and_then(|_| self.try_copy(src, dst, recursive));
        settle(self.kind(), "copy", &pair(src, dst), outcome).is_some()
    }

    fn move_path(&self, src: &str, dst: &str) -> bool {
        let outcome = non_blank(src)
            .and(non_blank(dst))
            .and_then(|_| self.try_move(src, dst));
        settle(self.kind(), "move", &pair(src, dst), outcome).is_some()
    }

    /// Rename within the same directory.
    fn rename(&self, path: &str, new_name: &str) -> bool {
        let outcome = non_blank(path)
            .and_then(|p| sibling(p, new_name))
            .and_then(|dst| self.try_move(path, &dst));
        settle(self.kind(), "rename", &pair(path, new_name), outcome).is_some()
    }

    fn chmod(&self, path: &str, mode: u32, recursive: bool) -> bool {
        let outcome = non_blank(path).and_then(|p| {
            if mode > 0o7777 {
                return Err(FsError::InvalidArgument(format!("mode {mode:o}")));
            }
            self.try_chmod(p, mode, recursive)
        });
        settle(self.kind(), "chmod", path, outcome).is_some()
    }

    fn chown(&self, path: &str, owner: &str, group: Option<&str>, recursive: bool) -> bool {
        let outcome = non_blank(path).and_then(|p| {
            if owner.trim().is_empty() {
                return Err(FsError::InvalidArgument("empty owner".to_string()));
            }
            self.try_chown(p, owner, group.filter(|g| !g.trim().is_empty()), recursive)
        });
        settle(self.kind(), "chown", path, outcome).is_some()
    }

    /// `Some("")` for an empty file, `None` when it cannot be read.
    fn read(&self, path: &str) -> Option<String> {
        let outcome = non_blank(path).and_then(|p| self.try_read(p));
        settle(self.kind(), "read", path, outcome)
    }

    fn read_bytes(&self, path: &str) -> Option<Vec<u8>> {
        let outcome = non_blank(path).and_then(|p| self.try_read_bytes(p));
        settle(self.kind(), "read_bytes", path, outcome)
    }

    fn write(&self, path: &str, content: &str) -> bool {
        let outcome = non_blank(path)
            .and_then(|p| content_arg(content).and_then(|c| self.try_write(p, c)));
        settle(self.kind(), "write", path, outcome).is_some()
    }

    fn append(&self, path: &str, content: &str) -> bool {
        let outcome = non_blank(path)
            .and_then(|p| content_arg(content).and_then(|c| self.try_append(p, c)));
        settle(self.kind(), "append", path, outcome).is_some()
    }

    /// Entry names, optionally filtered by a glob matched against each name.
    fn list_dir(&self, path: &str, pattern: Option<&str>) -> Vec<String> {
        let outcome = non_blank(path).and_then(|p| {
            let names = self.try_list_dir(p)?;
            filter_names(names, pattern)
        });
        settle(self.kind(), "list_dir", path, outcome).unwrap_or_default()
    }

    fn checksum(&self, path: &str, algorithm: HashAlgorithm) -> Option<String> {
        let outcome = non_blank(path).and_then(|p| self.try_checksum(p, algorithm));
        settle(self.kind(), "checksum", path, outcome)
    }

    /// Case-insensitive comparison of `expected` with the computed digest.
    fn verify_checksum(&self, path: &str, expected: &str, algorithm: HashAlgorithm) -> bool {
        self.checksum(path, algorithm)
            .is_some_and(|actual| actual.eq_ignore_ascii_case(expected.trim()))
    }

    fn get_info(&self, path: &str) -> Option<FileInfo> {
        let outcome = non_blank(path).and_then(|p| self.try_info(p));
        settle(self.kind(), "get_info", path, outcome)
    }

    fn create_symlink(&self, target: &str, link: &str) -> bool {
        let outcome = non_blank(target)
            .and(non_blank(link))
            .and_then(|_| self.try_create_symlink(target, link));
        settle(self.kind(), "create_symlink", &pair(link, target), outcome).is_some()
    }

    fn read_symlink(&self, link: &str) -> Option<String> {
        let outcome = non_blank(link).and_then(|p| self.try_read_symlink(p));
        settle(self.kind(), "read_symlink", link, outcome)
    }

    fn tar_extract(&self, archive: &str, target_dir: &str) -> bool {
        let outcome = non_blank(archive)
            .and(non_blank(target_dir))
            .and_then(|_| self.try_tar_extract(archive, target_dir));
        settle(self.kind(), "tar_extract", &pair(archive, target_dir), outcome).is_some()
    }

    fn disk_usage(&self, path: &str) -> Option<DiskUsage> {
        let outcome = non_blank(path).and_then(|p| self.try_disk_usage(p));
        settle(self.kind(), "disk_usage", path, outcome)
    }
}

impl<B: FileBackend + ?Sized> FileBackend for Box<B> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }
    fn try_exists(&self, path: &str) -> Result<bool, FsError> {
        (**self).try_exists(path)
    }
    fn try_is_file(&self, path: &str) -> Result<bool, FsError> {
        (**self).try_is_file(path)
    }
    fn try_is_dir(&self, path: &str) -> Result<bool, FsError> {
        (**self).try_is_dir(path)
    }
    fn try_mkdir(&self, path: &str, parents: bool) -> Result<(), FsError> {
        (**self).try_mkdir(path, parents)
    }
    fn try_remove(&self, path: &str, recursive: bool, force: bool) -> Result<(), FsError> {
        (**self).try_remove(path, recursive, force)
    }
    fn try_copy(&self, src: &str, dst: &str, recursive: bool) -> Result<(), FsError> {
        (**self).try_copy(src, dst, recursive)
    }
    fn try_move(&self, src: &str, dst: &str) -> Result<(), FsError> {
        (**self).try_move(src, dst)
    }
    fn try_chmod(&self, path: &str, mode: u32, recursive: bool) -> Result<(), FsError> {
        (**self).try_chmod(path, mode, recursive)
    }
    fn try_chown(
        &self,
        path: &str,
        owner: &str,
        group: Option<&str>,
        recursive: bool,
    ) -> Result<(), FsError> {
        (**self).try_chown(path, owner, group, recursive)
    }
    fn try_read(&self, path: &str) -> Result<String, FsError> {
        (**self).try_read(path)
    }
    fn try_read_bytes(&self, path: &str) -> Result<Vec<u8>, FsError> {
        (**self).try_read_bytes(path)
    }
    fn try_write(&self, path: &str, content: &str) -> Result<(), FsError> {
        (**self).try_write(path, content)
    }
    fn try_append(&self, path: &str, content: &str) -> Result<(), FsError> {
        (**self).try_append(path, content)
    }
    fn try_list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        (**self).try_list_dir(path)
    }
    fn try_checksum(&self, path: &str, algorithm: HashAlgorithm) -> Result<String, FsError> {
        (**self).try_checksum(path, algorithm)
    }
    fn try_info(&self, path: &str) -> Result<FileInfo, FsError> {
        (**self).try_info(path)
    }
    fn try_create_symlink(&self, target: &str, link: &str) -> Result<(), FsError> {
        (**self).try_create_symlink(target, link)
    }
    fn try_read_symlink(&self, link: &str) -> Result<String, FsError> {
        (**self).try_read_symlink(link)
    }
    fn try_tar_extract(&self, archive: &str, target_dir: &str) -> Result<(), FsError> {
        (**self).try_tar_extract(archive, target_dir)
    }
    fn try_disk_usage(&self, path: &str) -> Result<DiskUsage, FsError> {
        (**self).try_disk_usage(path)
    }
}

fn non_blank(path: &str) -> Result<&str, FsError> {
    if path.trim().is_empty() {
        Err(FsError::EmptyPath)
    } else {
        Ok(path)
    }
}

fn content_arg(content: &str) -> Result<&str, FsError> {
    if content.contains('\0') {
        return Err(FsError::InvalidArgument(
            "content contains a NUL byte".to_string(),
        ));
    }
    Ok(content)
}

fn pair(a: &str, b: &str) -> String {
    format!("{a} -> {b}")
}

/// Path of `new_name` in the same directory as `path`.
fn sibling(path: &str, new_name: &str) -> Result<String, FsError> {
    if new_name.is_empty() || new_name.contains('/') || new_name == "." || new_name == ".." {
        return Err(FsError::InvalidArgument(format!("bad file name {new_name:?}")));
    }
    let trimmed = path.trim_end_matches('/');
    Ok(match trimmed.rfind('/') {
        Some(0) => format!("/{new_name}"),
        Some(idx) => format!("{}/{new_name}", &trimmed[..idx]),
        None => new_name.to_string(),
    })
}

fn filter_names(names: Vec<String>, pattern: Option<&str>) -> Result<Vec<String>, FsError> {
    let Some(pattern) = pattern.filter(|p| !p.is_empty() && *p != "*") else {
        return Ok(names);
    };
    let matcher = Glob::new(pattern)
        .map_err(|err| FsError::InvalidArgument(format!("pattern {pattern:?}: {err}")))?
        .compile_matcher();
    Ok(names
        .into_iter()
        .filter(|name| matcher.is_match(name.as_str()))
        .collect())
}

/// Emit the per-operation record and collapse the error.
fn settle<T>(backend: BackendKind, op: &'static str, path: &str, outcome: Result<T, FsError>) -> Option<T> {
    match outcome {
        Ok(value) => {
            debug!(backend = %backend, op, path, ok = true, "file operation");
            Some(value)
        }
        Err(err @ (FsError::EmptyPath | FsError::Unsupported { .. })) => {
            warn!(backend = %backend, op, path, ok = false, detail = %err, "file operation");
            None
        }
        Err(err) => {
            debug!(backend = %backend, op, path, ok = false, detail = %err, "file operation");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_names() {
        for kind in [BackendKind::Direct, BackendKind::Busybox, BackendKind::Shell] {
            assert_eq!(kind.as_str().parse::<BackendKind>(), Ok(kind));
        }
        assert_eq!("RAW".parse::<BackendKind>(), Ok(BackendKind::Shell));
        assert!("adb".parse::<BackendKind>().is_err());
    }

    #[test]
    fn algorithm_names_are_case_insensitive() {
        assert_eq!("SHA512".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::Sha1.utility(), "sha1sum");
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn sibling_stays_in_parent() {
        assert_eq!(sibling("/data/a/old", "new").expect("sibling"), "/data/a/new");
        assert_eq!(sibling("/old/", "new").expect("sibling"), "/new");
        assert_eq!(sibling("old", "new").expect("sibling"), "new");
        assert!(sibling("/data/old", "x/y").is_err());
        assert!(sibling("/data/old", "..").is_err());
    }

    #[test]
    fn glob_filters_names_locally() {
        let names = vec!["a.txt".to_string(), ".hidden".to_string(), "b.tar.xz".to_string()];
        let txt = filter_names(names.clone(), Some("*.txt")).expect("filter");
        assert_eq!(txt, vec!["a.txt"]);
        let all = filter_names(names.clone(), Some("*")).expect("filter");
        assert_eq!(all, names);
        assert!(filter_names(names, Some("[")).is_err());
    }

    #[test]
    fn nul_content_is_rejected() {
        assert!(content_arg("a\0b").is_err());
        assert_eq!(content_arg("a'b").expect("content"), "a'b");
    }
}
