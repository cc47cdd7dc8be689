//! Native file calls in this process's own permission domain.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt, lchown, symlink};
use std::path::{Path, PathBuf};

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use walkdir::WalkDir;

use crate::backend::{BackendKind, FileBackend, HashAlgorithm};
use crate::error::FsError;
use crate::info::{DiskUsage, FileInfo, FileKind, base_name};

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectBackend;

impl DirectBackend {
    pub fn new() -> Self {
        Self
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> FsError + '_ {
    move |err| FsError::from_io(&path.display().to_string(), err)
}

fn walk_err(err: walkdir::Error) -> FsError {
    let path = err
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    match err.into_io_error() {
        Some(io) => FsError::from_io(&path, io),
        None => FsError::InvalidArgument(format!("filesystem loop at {path}")),
    }
}

/// `cp`/`mv` semantics: an existing directory destination receives the source by name.
fn resolve_destination(src: &Path, dst: &Path) -> PathBuf {
    if dst.is_dir()
        && let Some(name) = src.file_name()
    {
        return dst.join(name);
    }
    dst.to_path_buf()
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), FsError> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(walk_err)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| FsError::InvalidArgument(entry.path().display().to_string()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_err(&target))?;
            let mode = entry.metadata().map_err(walk_err)?.permissions().mode();
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                .map_err(io_err(&target))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(io_err(entry.path()))?;
            symlink(&link, &target).map_err(io_err(&target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(io_err(&target))?;
        }
    }
    Ok(())
}

fn digest_file<D: Digest>(path: &Path) -> Result<String, FsError> {
    let mut file = fs::File::open(path).map_err(io_err(path))?;
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(io_err(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn numeric_id(value: &str, what: &str) -> Result<u32, FsError> {
    value.trim().parse::<u32>().map_err(|_| {
        FsError::unsupported(BackendKind::Direct, format!("resolve {what} name {value:?}"))
    })
}

impl FileBackend for DirectBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    fn try_exists(&self, path: &str) -> Result<bool, FsError> {
        let p = Path::new(path);
        p.try_exists().map_err(io_err(p))
    }

    fn try_is_file(&self, path: &str) -> Result<bool, FsError> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FsError::from_io(path, err)),
        }
    }

    fn try_is_dir(&self, path: &str) -> Result<bool, FsError> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FsError::from_io(path, err)),
        }
    }

    fn try_mkdir(&self, path: &str, parents: bool) -> Result<(), FsError> {
        let result = if parents {
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        };
        result.map_err(|err| FsError::from_io(path, err))
    }

    /// `force` has nothing to add natively: absent paths already count as removed.
    fn try_remove(&self, path: &str, recursive: bool, _force: bool) -> Result<(), FsError> {
        let meta = fs::symlink_metadata(path).map_err(|err| FsError::from_io(path, err))?;
        let result = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(path)
            } else {
                fs::remove_dir(path)
            }
        } else {
            fs::remove_file(path)
        };
        result.map_err(|err| FsError::from_io(path, err))
    }

    fn try_copy(&self, src: &str, dst: &str, recursive: bool) -> Result<(), FsError> {
        let src = Path::new(src);
        let meta = fs::symlink_metadata(src).map_err(io_err(src))?;
        let target = resolve_destination(src, Path::new(dst));
        if meta.is_dir() {
            if !recursive {
                return Err(FsError::InvalidArgument(format!(
                    "{} is a directory (not copied without recursion)",
                    src.display()
                )));
            }
            return copy_tree(src, &target);
        }
        fs::copy(src, &target).map_err(io_err(&target))?;
        Ok(())
    }

    fn try_move(&self, src: &str, dst: &str) -> Result<(), FsError> {
        let src_path = Path::new(src);
        let target = resolve_destination(src_path, Path::new(dst));
        match fs::rename(src_path, &target) {
            Ok(()) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::EXDEV) => {
                self.try_copy(src, &target.display().to_string(), true)?;
                self.try_remove(src, true, true)
            }
            Err(err) => Err(FsError::from_io(src, err)),
        }
    }

    fn try_chmod(&self, path: &str, mode: u32, recursive: bool) -> Result<(), FsError> {
        let apply = |p: &Path| {
            fs::set_permissions(p, fs::Permissions::from_mode(mode)).map_err(io_err(p))
        };
        if !recursive {
            return apply(Path::new(path));
        }
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(walk_err)?;
            if !entry.file_type().is_symlink() {
                apply(entry.path())?;
            }
        }
        Ok(())
    }

    /// Only numeric ids; names need the target system's user database.
    fn try_chown(
        &self,
        path: &str,
        owner: &str,
        group: Option<&str>,
        recursive: bool,
    ) -> Result<(), FsError> {
        let uid = numeric_id(owner, "user")?;
        let gid = group.map(|g| numeric_id(g, "group")).transpose()?;
        let apply = |p: &Path| lchown(p, Some(uid), gid).map_err(io_err(p));
        if !recursive {
            return apply(Path::new(path));
        }
        for entry in WalkDir::new(path).follow_links(false) {
            apply(entry.map_err(walk_err)?.path())?;
        }
        Ok(())
    }

    fn try_read(&self, path: &str) -> Result<String, FsError> {
        fs::read_to_string(path).map_err(|err| FsError::from_io(path, err))
    }

    fn try_read_bytes(&self, path: &str) -> Result<Vec<u8>, FsError> {
        fs::read(path).map_err(|err| FsError::from_io(path, err))
    }

    fn try_write(&self, path: &str, content: &str) -> Result<(), FsError> {
        fs::write(path, content).map_err(|err| FsError::from_io(path, err))
    }

    fn try_append(&self, path: &str, content: &str) -> Result<(), FsError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| FsError::from_io(path, err))?;
        file.write_all(content.as_bytes())
            .map_err(|err| FsError::from_io(path, err))
    }

    fn try_list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let entries = fs::read_dir(path).map_err(|err| FsError::from_io(path, err))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| FsError::from_io(path, err))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn try_checksum(&self, path: &str, algorithm: HashAlgorithm) -> Result<String, FsError> {
        let p = Path::new(path);
        match algorithm {
            HashAlgorithm::Md5 => digest_file::<Md5>(p),
            HashAlgorithm::Sha1 => digest_file::<Sha1>(p),
            HashAlgorithm::Sha256 => digest_file::<Sha256>(p),
            HashAlgorithm::Sha512 => digest_file::<Sha512>(p),
        }
    }

    fn try_info(&self, path: &str) -> Result<FileInfo, FsError> {
        let meta = fs::symlink_metadata(path).map_err(|err| FsError::from_io(path, err))?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };
        Ok(FileInfo {
            name: base_name(path),
            size: meta.len(),
            kind,
            owner: Some(meta.uid()),
            group: Some(meta.gid()),
            mode: Some(meta.mode() & 0o7777),
            modified: Some(meta.mtime()),
            accessed: Some(meta.atime()),
            changed: Some(meta.ctime()),
        })
    }

    fn try_create_symlink(&self, target: &str, link: &str) -> Result<(), FsError> {
        symlink(target, link).map_err(|err| FsError::from_io(link, err))
    }

    fn try_read_symlink(&self, link: &str) -> Result<String, FsError> {
        fs::read_link(link)
            .map(|target| target.to_string_lossy().into_owned())
            .map_err(|err| FsError::from_io(link, err))
    }

    fn try_tar_extract(&self, _archive: &str, _target_dir: &str) -> Result<(), FsError> {
        Err(FsError::unsupported(BackendKind::Direct, "extract tar archives"))
    }

    fn try_disk_usage(&self, _path: &str) -> Result<DiskUsage, FsError> {
        Err(FsError::unsupported(BackendKind::Direct, "report disk usage"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(path: &Path) -> String {
        path.display().to_string()
    }

    #[test]
    fn mkdir_twice_with_parents_succeeds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = utf8(&temp.path().join("a/b/c"));
        let fs = DirectBackend::new();
        assert!(fs.mkdir(&dir, true));
        assert!(fs.mkdir(&dir, true));
        assert!(fs.is_dir(&dir));
    }

    #[test]
    fn mkdir_without_parents_refuses_existing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = utf8(&temp.path().join("d"));
        let fs = DirectBackend::new();
        assert!(fs.mkdir(&dir, false));
        assert!(!fs.mkdir(&dir, false));
        assert!(!fs.mkdir(&utf8(&temp.path().join("x/y")), false));
    }

    #[test]
    fn clean_dir_keeps_the_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("cache");
        std::fs::create_dir_all(dir.join("sub/inner")).expect("mkdir");
        std::fs::write(dir.join(".keep"), "x").expect("write");
        std::fs::write(dir.join("sub/inner/f"), "y").expect("write");
        let fs = DirectBackend::new();
        assert!(fs.clean_dir(&utf8(&dir)));
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).expect("read_dir").count(), 0);
        assert!(!fs.clean_dir(&utf8(&temp.path().join("gone"))));
    }

    #[test]
    fn removing_absent_path_succeeds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let missing = utf8(&temp.path().join("missing"));
        assert!(fs.remove(&missing, false, true));
        assert!(fs.remove(&missing, true, false));
    }

    #[test]
    fn non_recursive_remove_keeps_populated_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let dir = temp.path().join("full");
        std::fs::create_dir(&dir).expect("mkdir");
        std::fs::write(dir.join("f"), "x").expect("write");
        assert!(!fs.remove(&utf8(&dir), false, true));
        assert!(dir.join("f").exists());
        assert!(fs.remove(&utf8(&dir), true, false));
        assert!(!dir.exists());
    }

    #[test]
    fn blank_paths_fail_quietly() {
        let fs = DirectBackend::new();
        assert!(!fs.exists(""));
        assert!(!fs.is_dir("   "));
        assert!(!fs.mkdir("", true));
        assert!(fs.read("").is_none());
        assert!(fs.list_dir("", None).is_empty());
    }

    #[test]
    fn read_distinguishes_empty_from_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let empty = utf8(&temp.path().join("empty"));
        assert!(fs.write(&empty, ""));
        assert_eq!(fs.read(&empty).as_deref(), Some(""));
        assert!(fs.read(&utf8(&temp.path().join("nope"))).is_none());
    }

    #[test]
    fn write_then_append() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let path = utf8(&temp.path().join("log"));
        assert!(fs.write(&path, "O'Brien; rm -rf /tmp/x\n"));
        assert!(fs.append(&path, "tail"));
        assert_eq!(
            fs.read(&path).as_deref(),
            Some("O'Brien; rm -rf /tmp/x\ntail")
        );
    }

    #[test]
    fn recursive_copy_and_move_into_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("nested")).expect("mkdir");
        std::fs::write(src.join("nested/file"), "data").expect("write");
        symlink("nested/file", src.join("link")).expect("symlink");

        let copy = temp.path().join("copy");
        assert!(!fs.copy(&utf8(&src), &utf8(&copy), false));
        assert!(fs.copy(&utf8(&src), &utf8(&copy), true));
        assert_eq!(std::fs::read_to_string(copy.join("nested/file")).expect("read"), "data");
        assert_eq!(
            std::fs::read_link(copy.join("link")).expect("link"),
            Path::new("nested/file")
        );

        let holder = temp.path().join("holder");
        std::fs::create_dir(&holder).expect("mkdir");
        assert!(fs.move_path(&utf8(&copy), &utf8(&holder)));
        assert!(holder.join("copy/nested/file").is_file());
        assert!(!copy.exists());
    }

    #[test]
    fn rename_stays_in_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let old = temp.path().join("old.txt");
        std::fs::write(&old, "x").expect("write");
        assert!(fs.rename(&utf8(&old), "new.txt"));
        assert!(temp.path().join("new.txt").is_file());
        assert!(!fs.rename(&utf8(&temp.path().join("new.txt")), "../escape"));
    }

    #[test]
    fn chmod_recursive_applies_mode() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let dir = temp.path().join("tree");
        std::fs::create_dir(&dir).expect("mkdir");
        std::fs::write(dir.join("f"), "x").expect("write");
        assert!(fs.chmod(&utf8(&dir), 0o750, true));
        let mode = std::fs::metadata(dir.join("f")).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
        assert!(!fs.chmod(&utf8(&dir), 0o17777, false));
    }

    #[test]
    fn chown_by_name_is_unsupported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("f");
        std::fs::write(&path, "x").expect("write");
        let err = DirectBackend::new()
            .try_chown(&utf8(&path), "root", None, false)
            .expect_err("names unsupported");
        assert!(err.is_unsupported());
    }

    #[test]
    fn list_dir_includes_dotfiles_and_filters() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        for name in ["a.txt", "b.log", ".hidden"] {
            std::fs::write(temp.path().join(name), "").expect("write");
        }
        let mut all = fs.list_dir(&utf8(temp.path()), None);
        all.sort();
        assert_eq!(all, vec![".hidden", "a.txt", "b.log"]);
        assert_eq!(fs.list_dir(&utf8(temp.path()), Some("*.txt")), vec!["a.txt"]);
    }

    #[test]
    fn checksums_match_known_digests() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let path = utf8(&temp.path().join("abc"));
        assert!(fs.write(&path, "abc"));
        assert_eq!(
            fs.checksum(&path, HashAlgorithm::Md5).as_deref(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
        assert_eq!(
            fs.checksum(&path, HashAlgorithm::Sha1).as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        let sha256 = fs.checksum(&path, HashAlgorithm::Sha256).expect("sha256");
        assert_eq!(
            sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(fs.verify_checksum(&path, &sha256.to_uppercase(), HashAlgorithm::Sha256));
        assert_eq!(
            fs.checksum(&path, HashAlgorithm::Sha512).map(|d| d.len()),
            Some(128)
        );
    }

    #[test]
    fn info_reports_kind_and_mode() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let path = temp.path().join("f");
        std::fs::write(&path, "12345").expect("write");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).expect("chmod");
        let info = fs.get_info(&utf8(&path)).expect("info");
        assert_eq!(info.name, "f");
        assert_eq!(info.size, 5);
        assert_eq!(info.kind, FileKind::File);
        assert_eq!(info.mode, Some(0o640));
        assert!(fs.get_info(&utf8(&temp.path().join("nope"))).is_none());
    }

    #[test]
    fn symlinks_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = DirectBackend::new();
        let link = utf8(&temp.path().join("link"));
        assert!(fs.create_symlink("/system/bin/sh", &link));
        assert_eq!(fs.read_symlink(&link).as_deref(), Some("/system/bin/sh"));
        assert_eq!(fs.get_info(&link).map(|i| i.kind), Some(FileKind::Symlink));
    }

    #[test]
    fn shell_only_operations_are_unsupported() {
        let fs = DirectBackend::new();
        assert!(!fs.tar_extract("/a.tar", "/b"));
        assert!(fs.disk_usage("/").is_none());
    }
}
