//! Per-recipe build pipeline: fetch, extract, patch, configure/make/install,
//! relocate (C8).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::error;

use crate::error::{MusselsError, Result};
use crate::model::{Nvc, Recipe, RecipeKind, Variant};
use crate::patch;
use crate::template::{self, TemplateContext};
use crate::tools::Toolchain;
use crate::workspace::Workspace;
use crate::{archive, fetch, process};

/// The engine's view of one recipe's outcome, fed to the summary printer.
#[derive(Debug, Clone)]
pub struct RecipeOutcome {
    pub nvc: Nvc,
    pub success: bool,
    pub elapsed: Duration,
}

const CONFIGURED_SENTINEL: &str = "_mussels.configured";

/// Drives `recipe`'s `variant` through the full state machine. Never returns an
/// `Err`: a failed transition is reported as `success: false` so the caller can
/// decide to skip the rest of the plan without unwinding.
pub fn build_recipe(
    recipe: &Recipe,
    variant: &Variant,
    target: &str,
    workspace: &Workspace,
    toolchain: &Toolchain,
    rebuild: bool,
) -> RecipeOutcome {
    let start = Instant::now();
    let nvc = recipe.nvc();

    if recipe.kind == RecipeKind::Collection {
        return RecipeOutcome {
            nvc,
            success: true,
            elapsed: start.elapsed(),
        };
    }

    match run_pipeline(recipe, variant, target, workspace, toolchain, rebuild, &nvc) {
        Ok(()) => RecipeOutcome {
            nvc,
            success: true,
            elapsed: start.elapsed(),
        },
        Err(e) => {
            error!("{nvc} failed: {e}");
            RecipeOutcome {
                nvc,
                success: false,
                elapsed: start.elapsed(),
            }
        }
    }
}

fn run_pipeline(
    recipe: &Recipe,
    variant: &Variant,
    target: &str,
    workspace: &Workspace,
    toolchain: &Toolchain,
    rebuild: bool,
    nvc: &Nvc,
) -> Result<()> {
    let source_url = recipe.source_url.as_ref().ok_or_else(|| MusselsError::MalformedRecipe {
        path: recipe.origin_file.clone(),
        reason: "leaf recipe missing source_url".to_string(),
    })?;
    let filename = derive_filename(source_url, recipe.archive_rename.as_ref());
    let stem = archive_stem(&filename);

    let archive_path = fetch::fetch(source_url, &workspace.downloads_dir(), &filename)?;

    let work_dir = workspace.work_dir(target);
    if rebuild {
        let dest = work_dir.join(&stem);
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
    }
    let build_dir = archive::extract(&archive_path, &work_dir, &stem)?;

    if let Some(patches_subdir) = &variant.patches_subdir {
        let patches_dir = recipe
            .origin_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(patches_subdir);
        patch::apply_patches(&patches_dir, &build_dir)?;
    }

    run_build_script(variant, target, workspace, toolchain, &build_dir, nvc)?;
    relocate(variant, &build_dir, &workspace.install_dir(target))
}

fn run_build_script(
    variant: &Variant,
    target: &str,
    workspace: &Workspace,
    toolchain: &Toolchain,
    build_dir: &Path,
    nvc: &Nvc,
) -> Result<()> {
    let install_root = workspace.data_dir.join("install");
    let install_target_dir = workspace.install_dir(target);
    let includes = install_target_dir.join("include");
    let libs = install_target_dir.join("lib");
    let ctx = TemplateContext {
        install: &install_root,
        includes: &includes,
        libs: &libs,
        build: build_dir,
        target,
        toolchain,
    };

    let mut path_prepend = Vec::new();
    for tool_name in &variant.required_tools {
        if let Some(tool) = toolchain.get(tool_name) {
            if let Some(path) = &tool.tool_path {
                path_prepend.push(path.clone());
            }
        }
    }

    let configured_sentinel = build_dir.join(CONFIGURED_SENTINEL);
    let ts = crate::workspace::timestamp();

    for (phase, script) in variant.build_script.phases() {
        if phase == "configure" && configured_sentinel.exists() {
            continue;
        }
        let expanded = template::expand(script, &ctx)?;
        let script_path = write_phase_script(build_dir, phase, &expanded)?;
        let log_path = workspace.recipe_log_path(nvc, &ts);
        process::run_script(phase, &script_path, build_dir, &path_prepend, &log_path)?;
        if phase == "configure" {
            std::fs::write(&configured_sentinel, b"")?;
        }
    }

    Ok(())
}

fn write_phase_script(build_dir: &Path, phase: &str, body: &str) -> Result<PathBuf> {
    #[cfg(windows)]
    let (ext, header) = ("bat", String::new());
    #[cfg(not(windows))]
    let (ext, header) = ("sh", "#!/bin/sh\nset -e\n".to_string());

    let path = build_dir.join(format!("_mussels_{phase}.{ext}"));
    std::fs::write(&path, format!("{header}{body}\n"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms)?;
    }

    Ok(path)
}

fn derive_filename(source_url: &str, archive_rename: Option<&crate::model::ArchiveRename>) -> String {
    let mut filename = source_url.rsplit('/').next().unwrap_or(source_url).to_string();
    if let Some(rename) = archive_rename {
        if filename == rename.from {
            filename = rename.to.clone();
        }
    }
    filename
}

fn archive_stem(filename: &str) -> String {
    for ext in [".tar.gz", ".tgz", ".zip"] {
        if let Some(stem) = filename.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    filename.to_string()
}

fn relocate(variant: &Variant, build_dir: &Path, install_target_dir: &Path) -> Result<()> {
    for (dest, globs) in &variant.install_paths {
        let dest_dir = install_target_dir.join(dest);
        std::fs::create_dir_all(&dest_dir)?;
        for pattern in globs {
            for matched in expand_glob(build_dir, pattern)? {
                let basename = matched.file_name().ok_or_else(|| {
                    MusselsError::InstallPathMissing(pattern.clone())
                })?;
                let target = dest_dir.join(basename);
                if target.exists() {
                    if target.is_dir() {
                        std::fs::remove_dir_all(&target)?;
                    } else {
                        std::fs::remove_file(&target)?;
                    }
                }
                copy_recursive(&matched, &target)?;
            }
        }
    }
    Ok(())
}

fn expand_glob(build_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = globset::Glob::new(pattern)
        .map_err(|_| MusselsError::InstallPathMissing(pattern.to_string()))?
        .compile_matcher();

    let mut matches = Vec::new();
    for entry in ignore::WalkBuilder::new(build_dir).hidden(false).build().flatten() {
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(build_dir) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        if matcher.is_match(relative) {
            matches.push(path.to_path_buf());
        }
    }

    if matches.is_empty() {
        return Err(MusselsError::InstallPathMissing(pattern.to_string()));
    }
    Ok(matches)
}

pub(crate) fn copy_recursive(src: &Path, dest: &Path) -> Result<()> {
    if src.is_dir() {
        std::fs::create_dir_all(dest)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dest)?;
    }
    Ok(())
}
