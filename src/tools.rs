//! Toolchain validation: detect required build tools on the host, downgrading to an
//! older version when the newest one is not actually present (C7).

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use log::{debug, warn};

use crate::catalog::Catalog;
use crate::error::{MusselsError, Result};
use crate::model::{Nvc, ToolDetection};
use crate::platform;
use crate::version::ItemRef;
use crate::workspace::{self, Workspace};

/// A tool that passed detection, with the environment it contributes to recipe builds.
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub nvc: Nvc,
    pub tool_path: Option<String>,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    pub tools: Vec<ResolvedTool>,
}

impl Toolchain {
    pub fn get(&self, name: &str) -> Option<&ResolvedTool> {
        self.tools.iter().find(|t| t.nvc.name == name)
    }
}

/// Resolves every tool in `required` against `catalog` for `host`, collecting all
/// failures into a single `ToolMissing` rather than stopping at the first one.
/// Each probe's outcome is appended to that tool's per-run log under `workspace`.
pub fn validate_tools(required: &[ItemRef], catalog: &Catalog, host: &str, workspace: &Workspace) -> Result<Toolchain> {
    let mut index = catalog.sorted_tools();
    let mut resolved = Vec::new();
    let mut missing = Vec::new();
    let ts = workspace::timestamp();

    for item_ref in required {
        match validate_one(item_ref, catalog, &mut index, host, workspace, &ts) {
            Ok(tool) => resolved.push(tool),
            Err(_) => missing.push(item_ref.name.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(MusselsError::ToolMissing(missing.join(", ")));
    }
    Ok(Toolchain { tools: resolved })
}

/// Selects the highest remaining version of `item_ref` and checks it on the host;
/// if detection fails, prunes that version from the index and tries the next one down.
fn validate_one(
    item_ref: &ItemRef,
    catalog: &Catalog,
    index: &mut crate::model::SortedIndex,
    host: &str,
    workspace: &Workspace,
    ts: &str,
) -> Result<ResolvedTool> {
    let mut preferred_version: Option<String> = None;

    loop {
        let nvc = crate::selector::select(item_ref, index, None, None)?;
        let preferred_version = preferred_version.get_or_insert_with(|| nvc.version.clone());
        let tool = catalog
            .tools
            .get(&nvc)
            .ok_or_else(|| MusselsError::UnknownItem(nvc.name.clone()))?;

        let declared: Vec<String> = tool.platforms.keys().cloned().collect();
        let detected = platform::pick_best(host, &declared)
            .map(|host_tag| tool.platforms[host_tag].clone())
            .is_some_and(|detection| detect(&nvc, &detection));

        log_probe(workspace, &nvc, ts, detected);

        if detected {
            if &nvc.version != preferred_version {
                warn!(
                    "tool {} {preferred_version} not found, substituting detected version {}",
                    nvc.name, nvc.version
                );
            }
            return Ok(ResolvedTool {
                nvc,
                tool_path: tool.tool_path.clone(),
                variables: tool.variables.clone(),
            });
        }

        debug!("tool {nvc} not present on host, trying an older version");
        if let Some(versions) = index.get_mut(&nvc.name) {
            versions.retain(|sv| sv.version != nvc.version);
            if versions.is_empty() {
                index.remove(&nvc.name);
            }
        }
        if !index.contains_key(&item_ref.name) {
            return Err(MusselsError::ToolMissing(item_ref.name.clone()));
        }
    }
}

fn log_probe(workspace: &Workspace, nvc: &Nvc, ts: &str, detected: bool) {
    let log_path = workspace.tool_log_path(nvc, ts);
    let Some(parent) = log_path.parent() else { return };
    if std::fs::create_dir_all(parent).is_err() {
        return;
    }
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        let outcome = if detected { "detected" } else { "not detected" };
        let _ = writeln!(file, "{nvc}: {outcome}");
    }
}

/// Tries path, then command, then file checks, in that order; the first strategy
/// that is declared at all decides the outcome (an empty list of a later strategy
/// does not fall through to "not found" if an earlier one already matched).
fn detect(nvc: &Nvc, detection: &ToolDetection) -> bool {
    for name in &detection.path_checks {
        if find_on_path(name).is_some() {
            return true;
        }
    }
    for check in &detection.command_checks {
        if run_command_contains(&check.command, &check.contains) {
            return true;
        }
    }
    for path in &detection.file_checks {
        if path.exists() {
            return true;
        }
    }
    if detection.path_checks.is_empty() && detection.command_checks.is_empty() && detection.file_checks.is_empty() {
        warn!("tool {nvc} declares no detection strategy for this platform");
    }
    false
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

fn run_command_contains(command: &str, needle: &str) -> bool {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return false;
    };
    let output = std::process::Command::new(program).args(parts).output();
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).contains(needle),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommandCheck, Tool};
    use std::path::PathBuf;

    fn test_workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::resolve(Some(dir.path().to_path_buf()));
        (dir, workspace)
    }

    fn tool_with_detection(name: &str, version: &str, detection: ToolDetection) -> Tool {
        let mut platforms = BTreeMap::new();
        platforms.insert("posix".to_string(), detection);
        Tool {
            name: name.to_string(),
            version: Some(version.to_string()),
            cookbook: "local".to_string(),
            platforms,
            tool_path: None,
            variables: BTreeMap::new(),
            origin_file: PathBuf::from("test.yaml"),
        }
    }

    #[test]
    fn command_check_that_matches_is_detected() {
        let mut catalog = Catalog::new();
        let detection = ToolDetection {
            path_checks: Vec::new(),
            command_checks: vec![CommandCheck {
                command: "echo hello-mussels".to_string(),
                contains: "hello-mussels".to_string(),
            }],
            file_checks: Vec::new(),
        };
        let tool = tool_with_detection("echoer", "1.0", detection);
        catalog.tools.insert(tool.nvc(), tool);

        let (_dir, workspace) = test_workspace();
        let required = vec![ItemRef::parse("echoer").unwrap()];
        let toolchain = validate_tools(&required, &catalog, "linux", &workspace).unwrap();
        assert!(toolchain.get("echoer").is_some());
        assert!(workspace.tool_log_path(&Nvc::new("echoer", "1.0", "local"), "0").parent().unwrap().exists());
    }

    #[test]
    fn missing_tool_is_reported() {
        let mut catalog = Catalog::new();
        let detection = ToolDetection {
            path_checks: vec!["definitely-not-a-real-binary-xyz".to_string()],
            command_checks: Vec::new(),
            file_checks: Vec::new(),
        };
        let tool = tool_with_detection("ghost-tool", "1.0", detection);
        catalog.tools.insert(tool.nvc(), tool);

        let (_dir, workspace) = test_workspace();
        let required = vec![ItemRef::parse("ghost-tool").unwrap()];
        assert!(matches!(
            validate_tools(&required, &catalog, "linux", &workspace),
            Err(MusselsError::ToolMissing(_))
        ));
    }

    #[test]
    fn downgrades_to_an_older_detected_version() {
        let mut catalog = Catalog::new();
        let missing = ToolDetection {
            path_checks: vec!["definitely-not-a-real-binary-xyz".to_string()],
            command_checks: Vec::new(),
            file_checks: Vec::new(),
        };
        let present = ToolDetection {
            path_checks: Vec::new(),
            command_checks: vec![CommandCheck {
                command: "echo present".to_string(),
                contains: "present".to_string(),
            }],
            file_checks: Vec::new(),
        };
        let newer = tool_with_detection("cmake", "2.0", missing);
        let older = tool_with_detection("cmake", "1.0", present);
        catalog.tools.insert(newer.nvc(), newer);
        catalog.tools.insert(older.nvc(), older);

        let (_dir, workspace) = test_workspace();
        let required = vec![ItemRef::parse("cmake").unwrap()];
        let toolchain = validate_tools(&required, &catalog, "linux", &workspace).unwrap();
        assert_eq!(toolchain.get("cmake").unwrap().nvc.version, "1.0");
    }
}
