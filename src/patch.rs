//! Deterministic patch application: unified diffs via `diffy`, everything else
//! copied verbatim into the build root (part of C8).

use std::path::Path;

use crate::error::{MusselsError, Result};

pub const PATCHED_SENTINEL: &str = "_mussels.patched";

/// Applies every file in `patches_dir` to `build_dir`, in filename order. `.diff`
/// and `.patch` files are unified diffs applied at strip level 1; anything else is
/// copied into the build root as-is. No-ops if `build_dir/_mussels.patched` exists.
pub fn apply_patches(patches_dir: &Path, build_dir: &Path) -> Result<()> {
    let sentinel = build_dir.join(PATCHED_SENTINEL);
    if sentinel.exists() {
        return Ok(());
    }

    let mut entries: Vec<_> = std::fs::read_dir(patches_dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_patch = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("diff") | Some("patch")
        );
        if is_patch {
            apply_one(&path, build_dir)?;
        } else {
            let dest = build_dir.join(entry.file_name());
            std::fs::copy(&path, &dest).map_err(|_| MusselsError::PatchFailed(path.clone()))?;
        }
    }

    std::fs::write(&sentinel, b"")?;
    Ok(())
}

fn apply_one(patch_path: &Path, build_dir: &Path) -> Result<()> {
    let text = std::fs::read_to_string(patch_path).map_err(|_| MusselsError::PatchFailed(patch_path.to_path_buf()))?;
    let patch = diffy::Patch::from_str(&text).map_err(|_| MusselsError::PatchFailed(patch_path.to_path_buf()))?;

    let header = patch
        .modified()
        .or_else(|| patch.original())
        .ok_or_else(|| MusselsError::PatchFailed(patch_path.to_path_buf()))?;
    let relative = strip_level_one(header);
    let target = build_dir.join(relative);

    let original =
        std::fs::read_to_string(&target).map_err(|_| MusselsError::PatchFailed(patch_path.to_path_buf()))?;
    let patched = diffy::apply(&original, &patch).map_err(|_| MusselsError::PatchFailed(patch_path.to_path_buf()))?;
    std::fs::write(&target, patched).map_err(|_| MusselsError::PatchFailed(patch_path.to_path_buf()))
}

/// Drops the first path component of a diff header, the way `patch -p1` does.
fn strip_level_one(header: &str) -> String {
    header.splitn(2, '/').nth(1).unwrap_or(header).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn applies_a_unified_diff() {
        let patches_dir = tempdir().unwrap();
        let build_dir = tempdir().unwrap();
        std::fs::write(build_dir.path().join("greeting.txt"), "hello\n").unwrap();

        let diff = "--- a/greeting.txt\n+++ b/greeting.txt\n@@ -1 +1 @@\n-hello\n+hello world\n";
        std::fs::write(patches_dir.path().join("001-greeting.diff"), diff).unwrap();

        apply_patches(patches_dir.path(), build_dir.path()).unwrap();
        let content = std::fs::read_to_string(build_dir.path().join("greeting.txt")).unwrap();
        assert_eq!(content, "hello world\n");
        assert!(build_dir.path().join(PATCHED_SENTINEL).exists());
    }

    #[test]
    fn copies_non_patch_files_verbatim() {
        let patches_dir = tempdir().unwrap();
        let build_dir = tempdir().unwrap();
        std::fs::write(patches_dir.path().join("extra-header.h"), "#define X 1\n").unwrap();

        apply_patches(patches_dir.path(), build_dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(build_dir.path().join("extra-header.h")).unwrap(),
            "#define X 1\n"
        );
    }

    #[test]
    fn sentinel_prevents_reapplication() {
        let patches_dir = tempdir().unwrap();
        let build_dir = tempdir().unwrap();
        std::fs::write(build_dir.path().join(PATCHED_SENTINEL), "").unwrap();
        std::fs::write(build_dir.path().join("greeting.txt"), "hello\n").unwrap();
        let diff = "--- a/greeting.txt\n+++ b/greeting.txt\n@@ -1 +1 @@\n-hello\n+hello world\n";
        std::fs::write(patches_dir.path().join("001-greeting.diff"), diff).unwrap();

        apply_patches(patches_dir.path(), build_dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(build_dir.path().join("greeting.txt")).unwrap(),
            "hello\n"
        );
    }
}
