use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::result::ZipError;
use zip::write::FileOptions;

use crate::error::Result;
use crate::model::PlatformKind;

const ENTRY_DATA: &str = "data";
const ENTRY_META: &str = "meta";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%3f";

/// One archive found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub platform: PlatformKind,
    pub meta_index: u32,
    pub created: DateTime<Utc>,
    pub base_version: i32,
}

/// `backup.<platform>.<meta index>.<timestamp>.<base version>.zip`
pub fn backup_file_name(platform: PlatformKind, meta_index: u32, created: DateTime<Utc>, base_version: i32) -> String {
    format!(
        "backup.{}.{:02}.{}.{}.zip",
        platform.short_name(),
        meta_index,
        created.format(TIMESTAMP_FORMAT),
        base_version
    )
}

pub fn parse_backup_file_name(path: &Path) -> Option<BackupEntry> {
    let name = path.file_name()?.to_str()?;
    let parts: Vec<&str> = name.split('.').collect();
    let ["backup", platform, meta_index, created, base_version, "zip"] = parts.as_slice() else {
        return None;
    };
    let created = NaiveDateTime::parse_from_str(created, TIMESTAMP_FORMAT).ok()?;
    Some(BackupEntry {
        path: path.to_path_buf(),
        platform: PlatformKind::from_short_name(platform)?,
        meta_index: meta_index.parse().ok()?,
        created: created.and_utc(),
        base_version: base_version.parse().ok()?,
    })
}

/// Zips the raw data and meta bytes of one slot into `dir`.
pub fn create_backup(
    dir: &Path,
    platform: PlatformKind,
    meta_index: u32,
    base_version: i32,
    data: &[u8],
    meta: Option<&[u8]>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let dest = dir.join(backup_file_name(platform, meta_index, Utc::now(), base_version));

    let file = fs::File::create(&dest)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    zip.start_file(ENTRY_DATA, options)?;
    zip.write_all(data)?;
    if let Some(meta) = meta {
        zip.start_file(ENTRY_META, options)?;
        zip.write_all(meta)?;
    }
    zip.finish()?;
    Ok(dest)
}

/// Raw `(data, meta)` of an archive.
pub fn read_backup(path: &Path) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    let mut archive = zip::ZipArchive::new(fs::File::open(path)?)?;
    let mut data = Vec::new();
    archive.by_name(ENTRY_DATA)?.read_to_end(&mut data)?;
    let meta = match archive.by_name(ENTRY_META) {
        Ok(mut entry) => {
            let mut meta = Vec::new();
            entry.read_to_end(&mut meta)?;
            Some(meta)
        }
        Err(ZipError::FileNotFound) => None,
        Err(e) => return Err(e.into()),
    };
    Ok((data, meta))
}

/// Archives of one slot, oldest first.
pub fn list_backups(dir: &Path, platform: PlatformKind, meta_index: u32) -> Vec<BackupEntry> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut out: Vec<BackupEntry> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| parse_backup_file_name(e.path()))
        .filter(|b| b.platform == platform && b.meta_index == meta_index)
        .collect();
    out.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.path.cmp(&b.path)));
    out
}

/// Deletes the oldest archives of a slot beyond `keep`. 0 keeps all.
pub fn prune_backups(dir: &Path, platform: PlatformKind, meta_index: u32, keep: usize) -> Result<Vec<PathBuf>> {
    if keep == 0 {
        return Ok(Vec::new());
    }
    let all = list_backups(dir, platform, meta_index);
    let excess = all.len().saturating_sub(keep);
    let mut removed = Vec::with_capacity(excess);
    for b in all.into_iter().take(excess) {
        fs::remove_file(&b.path)?;
        removed.push(b.path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_roundtrip() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let name = backup_file_name(PlatformKind::Steam, 4, t, 4147);
        assert_eq!(name, "backup.steam.04.2024-03-09-07-05-01-000.4147.zip");
        let entry = parse_backup_file_name(Path::new(&name)).unwrap();
        assert_eq!(entry.meta_index, 4);
        assert_eq!(entry.created, t);
        assert_eq!(entry.base_version, 4147);
        assert_eq!(entry.platform, PlatformKind::Steam);
        assert!(parse_backup_file_name(Path::new("save.hg")).is_none());
    }

    #[test]
    fn archive_holds_data_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_backup(dir.path(), PlatformKind::Switch, 2, 4150, b"payload", Some(b"meta")).unwrap();
        let (data, meta) = read_backup(&path).unwrap();
        assert_eq!(data, b"payload");
        assert_eq!(meta.as_deref(), Some(&b"meta"[..]));

        let path = create_backup(dir.path(), PlatformKind::Switch, 3, 4150, b"x", None).unwrap();
        assert_eq!(read_backup(&path).unwrap().1, None);
    }

    #[test]
    fn prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for (i, day) in [1, 2, 3, 4].into_iter().enumerate() {
            let t = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
            let name = backup_file_name(PlatformKind::Gog, 2, t, 4140 + i as i32);
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let removed = prune_backups(dir.path(), PlatformKind::Gog, 2, 2).unwrap();
        assert_eq!(removed.len(), 2);
        let left = list_backups(dir.path(), PlatformKind::Gog, 2);
        assert_eq!(left.iter().map(|b| b.base_version).collect::<Vec<_>>(), [4142, 4143]);
    }
}
