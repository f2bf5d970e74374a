//! Archive extraction for `.tar.gz`/`.tgz` and `.zip` sources (part of C8).

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{MusselsError, Result};

/// Extracts `archive_path` into `work_dir`, returning the path to the single
/// top-level directory it produced, renamed to `expected_dir_name` if the archive's
/// own top-level directory name differs. If `work_dir/expected_dir_name` already
/// exists, extraction is skipped and that path is returned directly.
pub fn extract(archive_path: &Path, work_dir: &Path, expected_dir_name: &str) -> Result<PathBuf> {
    let dest = work_dir.join(expected_dir_name);
    if dest.exists() {
        return Ok(dest);
    }
    std::fs::create_dir_all(work_dir)?;

    let before = list_entries(work_dir)?;
    match extension_kind(archive_path) {
        Some(Kind::TarGz) => extract_tar_gz(archive_path, work_dir)?,
        Some(Kind::Zip) => extract_zip(archive_path, work_dir)?,
        None => return Err(MusselsError::UnsupportedArchive(archive_path.to_path_buf())),
    }
    let after = list_entries(work_dir)?;

    let mut produced: Vec<OsString> = after.difference(&before).cloned().collect();
    if produced.len() != 1 {
        return Err(MusselsError::ExtractFailed {
            archive: archive_path.to_path_buf(),
            reason: format!(
                "expected exactly one new top-level entry, found {}",
                produced.len()
            ),
        });
    }
    let produced_name = produced.remove(0);
    let produced_path = work_dir.join(&produced_name);

    if produced_name == *expected_dir_name {
        Ok(produced_path)
    } else {
        std::fs::rename(&produced_path, &dest).map_err(|e| MusselsError::ExtractFailed {
            archive: archive_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(dest)
    }
}

fn list_entries(dir: &Path) -> Result<BTreeSet<OsString>> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        names.insert(entry?.file_name());
    }
    Ok(names)
}

enum Kind {
    TarGz,
    Zip,
}

fn extension_kind(path: &Path) -> Option<Kind> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(Kind::TarGz)
    } else if name.ends_with(".zip") {
        Some(Kind::Zip)
    } else {
        None
    }
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.unpack(dest).map_err(|e| MusselsError::ExtractFailed {
        archive: archive_path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| MusselsError::ExtractFailed {
        archive: archive_path.to_path_buf(),
        reason: e.to_string(),
    })?;
    zip.extract(dest).map_err(|e| MusselsError::ExtractFailed {
        archive: archive_path.to_path_buf(),
        reason: e.to_string(),
    })
}
