//! Directory walk, recipe/tool parsing, and multi-cookbook index (C3).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use log::warn;
use serde_yaml::Value;

use crate::model::{
    ArchiveRename, BuildScript, CommandCheck, Nvc, Recipe, RecipeKind, SortedIndex,
    SortedVersion, Tool, ToolDetection, Variant,
};
use crate::version::compare_versions;

pub const MIN_MUSSELS_VERSION: &str = "0.1";

/// The raw, unindexed catalog: every recipe and tool that parsed and validated,
/// keyed by the NVC the loader assigned it.
#[derive(Debug, Default)]
pub struct Catalog {
    pub recipes: BTreeMap<Nvc, Recipe>,
    pub tools: BTreeMap<Nvc, Tool>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks `root` for `*.yaml` files and merges anything that validates into this
    /// catalog under `cookbook`. Per §4.3, the same `(name, version)` provided by
    /// multiple cookbooks is kept as separate entries; nothing here is fatal.
    pub fn load_cookbook(&mut self, root: &Path, cookbook: &str) {
        if !root.is_dir() {
            warn!("cookbook '{cookbook}' root {} is not a directory", root.display());
            return;
        }

        let walker = WalkBuilder::new(root).hidden(false).build();
        for entry in walker.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            match load_file(path, cookbook) {
                Ok(Loaded::Recipe(recipe)) => {
                    self.recipes.insert(recipe.nvc(), recipe);
                }
                Ok(Loaded::Tool(tool)) => {
                    self.tools.insert(tool.nvc(), tool);
                }
                Ok(Loaded::Ignored) => {}
                Err(reason) => {
                    warn!("skipping {}: {}", path.display(), reason);
                }
            }
        }
    }

    /// Builds the sorted recipe index: `name -> [SortedVersion]` descending by version.
    pub fn sorted_recipes(&self) -> SortedIndex {
        build_sorted_index(self.recipes.values().map(|r| {
            let targets: Vec<String> = r
                .platforms
                .values()
                .flat_map(|per_target| per_target.keys().cloned())
                .collect();
            (r.name.clone(), r.version.clone(), r.cookbook.clone(), targets)
        }))
    }

    /// Builds the sorted tool index. Tools do not enumerate targets.
    pub fn sorted_tools(&self) -> SortedIndex {
        build_sorted_index(self.tools.values().map(|t| {
            (
                t.name.clone(),
                t.version.clone().unwrap_or_default(),
                t.cookbook.clone(),
                Vec::new(),
            )
        }))
    }
}

fn build_sorted_index<I>(entries: I) -> SortedIndex
where
    I: Iterator<Item = (String, String, String, Vec<String>)>,
{
    let mut by_name: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>> =
        BTreeMap::new();
    for (name, version, cookbook, targets) in entries {
        by_name
            .entry(name)
            .or_default()
            .entry(version)
            .or_default()
            .insert(cookbook, targets);
    }

    let mut index = SortedIndex::new();
    for (name, versions) in by_name {
        let mut sorted: Vec<SortedVersion> = versions
            .into_iter()
            .map(|(version, cookbooks)| SortedVersion { version, cookbooks })
            .collect();
        sorted.sort_by(|a, b| compare_versions(&b.version, &a.version));
        index.insert(name, sorted);
    }
    index
}

enum Loaded {
    Recipe(Recipe),
    Tool(Tool),
    Ignored,
}

fn load_file(path: &Path, cookbook: &str) -> Result<Loaded, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let doc: Value = serde_yaml::from_str(&contents).map_err(|e| format!("invalid YAML: {e}"))?;

    let Value::Mapping(map) = &doc else {
        return Ok(Loaded::Ignored);
    };

    let mussels_version = get_str(map, "mussels_version");
    let doc_type = get_str(map, "type");

    let (mussels_version, doc_type) = match (mussels_version, doc_type) {
        (Some(v), Some(t)) => (v, t),
        _ => return Ok(Loaded::Ignored),
    };

    if compare_versions(&mussels_version, MIN_MUSSELS_VERSION) == std::cmp::Ordering::Less {
        return Err(format!(
            "mussels_version {mussels_version} is below the minimum supported {MIN_MUSSELS_VERSION}"
        ));
    }

    match doc_type.as_str() {
        "recipe" | "collection" => parse_recipe(map, path, cookbook, doc_type == "collection")
            .map(Loaded::Recipe),
        "tool" => parse_tool(map, path, cookbook).map(Loaded::Tool),
        other => Err(format!("unknown type '{other}'")),
    }
}

fn get_str(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    map.get(Value::String(key.to_string()))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn get(map: &serde_yaml::Mapping, key: &str) -> Option<&Value> {
    map.get(Value::String(key.to_string()))
}

fn parse_recipe(
    map: &serde_yaml::Mapping,
    path: &Path,
    cookbook: &str,
    is_collection: bool,
) -> Result<Recipe, String> {
    let name = get_str(map, "name").ok_or("missing 'name'")?;
    let version = get_str(map, "version").ok_or("missing 'version'")?;
    let url = get_str(map, "url");

    if !is_collection && url.is_none() {
        return Err("leaf recipe missing 'url'".to_string());
    }

    let platforms_val = get(map, "platforms").ok_or("missing 'platforms'")?;
    let Value::Mapping(platforms_map) = platforms_val else {
        return Err("'platforms' must be a mapping".to_string());
    };

    let archive_rename = get(map, "archive_rename").and_then(|v| {
        if let Value::Sequence(seq) = v {
            if seq.len() == 2 {
                if let (Value::String(from), Value::String(to)) = (&seq[0], &seq[1]) {
                    return Some(ArchiveRename {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }
        None
    });

    let mut platforms = BTreeMap::new();
    for (host_key, host_val) in platforms_map {
        let Value::String(host) = host_key else {
            continue;
        };
        let Value::Mapping(targets_map) = host_val else {
            continue;
        };
        let mut targets = BTreeMap::new();
        for (target_key, variant_val) in targets_map {
            let Value::String(target) = target_key else {
                continue;
            };
            let Value::Mapping(variant_map) = variant_val else {
                continue;
            };
            targets.insert(target.clone(), parse_variant(variant_map));
        }
        platforms.insert(host.clone(), targets);
    }

    Ok(Recipe {
        name,
        version,
        cookbook: cookbook.to_string(),
        kind: if is_collection {
            RecipeKind::Collection
        } else {
            RecipeKind::Leaf
        },
        source_url: url,
        archive_rename,
        platforms,
        origin_file: path.to_path_buf(),
    })
}

fn parse_variant(map: &serde_yaml::Mapping) -> Variant {
    let dependencies = get_string_list(map, "dependencies");
    let required_tools = get_string_list(map, "required_tools");
    let patches_subdir = get_str(map, "patches_subdir");

    let build_script = get(map, "build_script")
        .and_then(|v| v.as_mapping())
        .map(|bs| BuildScript {
            configure: get_str(bs, "configure"),
            make: get_str(bs, "make"),
            install: get_str(bs, "install"),
        })
        .unwrap_or_default();

    let mut install_paths = BTreeMap::new();
    if let Some(ip) = get(map, "install_paths").and_then(|v| v.as_mapping()) {
        for (dest_key, globs_val) in ip {
            if let Value::String(dest) = dest_key {
                let globs = match globs_val {
                    Value::Sequence(seq) => seq
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    Value::String(s) => vec![s.clone()],
                    _ => Vec::new(),
                };
                install_paths.insert(dest.clone(), globs);
            }
        }
    }

    Variant {
        dependencies,
        required_tools,
        build_script,
        install_paths,
        patches_subdir,
    }
}

fn get_string_list(map: &serde_yaml::Mapping, key: &str) -> Vec<String> {
    match get(map, key) {
        Some(Value::Sequence(seq)) => seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn parse_tool(map: &serde_yaml::Mapping, path: &Path, cookbook: &str) -> Result<Tool, String> {
    let name = get_str(map, "name").ok_or("missing 'name'")?;
    let version = get_str(map, "version");
    let tool_path = get_str(map, "tool_path");

    let platforms_val = get(map, "platforms").ok_or("missing 'platforms'")?;
    let Value::Mapping(platforms_map) = platforms_val else {
        return Err("'platforms' must be a mapping".to_string());
    };

    let mut platforms = BTreeMap::new();
    for (host_key, detect_val) in platforms_map {
        let Value::String(host) = host_key else {
            continue;
        };
        let Value::Mapping(detect_map) = detect_val else {
            continue;
        };

        let path_checks = get_string_list(detect_map, "path_checks");
        let file_checks = get_string_list(detect_map, "file_checks")
            .into_iter()
            .map(PathBuf::from)
            .collect();
        let command_checks = match get(detect_map, "command_checks") {
            Some(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| v.as_mapping())
                .filter_map(|m| {
                    Some(CommandCheck {
                        command: get_str(m, "command")?,
                        contains: get_str(m, "contains").unwrap_or_default(),
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        platforms.insert(
            host.clone(),
            ToolDetection {
                path_checks,
                command_checks,
                file_checks,
            },
        );
    }

    let mut variables = BTreeMap::new();
    if let Some(vars) = get(map, "variables").and_then(|v| v.as_mapping()) {
        for (k, v) in vars {
            if let (Value::String(k), Some(v)) = (k, v.as_str()) {
                variables.insert(k.clone(), v.to_string());
            }
        }
    }

    Ok(Tool {
        name,
        version,
        cookbook: cookbook.to_string(),
        platforms,
        tool_path,
        variables,
        origin_file: path.to_path_buf(),
    })
}
