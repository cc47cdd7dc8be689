use serde::Serialize;

use crate::error::FsError;

/// `stat -c` format for the batched query: name, size, type, numeric uid and
/// gid, octal permissions, then modify/access/change times as epoch seconds.
pub const STAT_FORMAT: &str = "%n|%s|%F|%u|%g|%a|%Y|%X|%Z";
const STAT_FIELDS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl FileKind {
    /// Map the `%F` label printed by coreutils, toybox and busybox `stat`.
    pub fn from_stat_label(label: &str) -> Self {
        match label.trim() {
            "regular file" | "regular empty file" => FileKind::File,
            "directory" => FileKind::Directory,
            "symbolic link" => FileKind::Symlink,
            _ => FileKind::Other,
        }
    }
}

/// Normalized metadata. Fields a backend cannot determine are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub kind: FileKind,
    /// Numeric uid on every backend; names are never resolved.
    pub owner: Option<u32>,
    /// Numeric gid on every backend.
    pub group: Option<u32>,
    /// Permission bits, e.g. `0o644`.
    pub mode: Option<u32>,
    pub modified: Option<i64>,
    pub accessed: Option<i64>,
    pub changed: Option<i64>,
}

impl FileInfo {
    /// Parse one line of `stat -c STAT_FORMAT` output.
    ///
    /// Fields are taken from the right so a `|` inside the name survives.
    pub fn parse_stat_line(line: &str, path: &str) -> Result<Self, FsError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut fields: Vec<&str> = line.rsplitn(STAT_FIELDS, '|').collect();
        if fields.len() != STAT_FIELDS {
            return Err(FsError::parse("stat", line));
        }
        fields.reverse();

        let bad = || FsError::parse("stat", line);
        let size = fields[1].trim().parse::<u64>().map_err(|_| bad())?;
        let mode = u32::from_str_radix(fields[5].trim(), 8).map_err(|_| bad())?;
        let modified = parse_epoch(fields[6]).ok_or_else(bad)?;
        let accessed = parse_epoch(fields[7]).ok_or_else(bad)?;
        let changed = parse_epoch(fields[8]).ok_or_else(bad)?;

        Ok(FileInfo {
            name: base_name(path),
            size,
            kind: FileKind::from_stat_label(fields[2]),
            owner: fields[3].trim().parse().ok(),
            group: fields[4].trim().parse().ok(),
            mode: Some(mode),
            modified: Some(modified),
            accessed: Some(accessed),
            changed: Some(changed),
        })
    }
}

/// Usage of the filesystem holding a path, in KiB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub filesystem: String,
    pub total_kb: u64,
    pub used_kb: u64,
    pub available_kb: u64,
    pub use_percent: u8,
    pub mount_point: String,
}

impl DiskUsage {
    /// Parse `df -k PATH` output; long device names may wrap onto a second line.
    pub fn parse_df(output: &str) -> Result<Self, FsError> {
        let tokens: Vec<&str> = output
            .lines()
            .skip(1)
            .flat_map(str::split_whitespace)
            .collect();
        if tokens.len() < 6 {
            return Err(FsError::parse("df", output));
        }
        let bad = || FsError::parse("df", output);
        let number = |s: &str| s.parse::<u64>().map_err(|_| bad());
        Ok(DiskUsage {
            filesystem: tokens[0].to_string(),
            total_kb: number(tokens[1])?,
            used_kb: number(tokens[2])?,
            available_kb: number(tokens[3])?,
            use_percent: tokens[4]
                .trim_end_matches('%')
                .parse::<u8>()
                .map_err(|_| bad())?,
            mount_point: tokens[5..].join(" "),
        })
    }
}

/// Last path component, ignoring trailing slashes.
pub fn base_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

/// Epoch seconds; some `stat` builds print a fractional part.
pub(crate) fn parse_epoch(field: &str) -> Option<i64> {
    let field = field.trim();
    let whole = field.split_once('.').map_or(field, |(whole, _)| whole);
    whole.parse().ok()
}
