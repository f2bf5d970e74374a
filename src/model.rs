//! Core data model: recipes, tools, and the sorted index built from them (§3).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A `(name, version, cookbook)` triple uniquely identifying a recipe or tool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nvc {
    pub name: String,
    pub version: String,
    pub cookbook: String,
}

impl Nvc {
    pub fn new(name: impl Into<String>, version: impl Into<String>, cookbook: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            cookbook: cookbook.into(),
        }
    }
}

impl fmt::Display for Nvc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}:{}", self.cookbook, self.name)
        } else {
            write!(f, "{}:{}-{}", self.cookbook, self.name, self.version)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    Leaf,
    Collection,
}

/// `(from, to)` applied to the archive filename to reconcile upstream archives
/// whose top-level directory differs from the filename stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRename {
    pub from: String,
    pub to: String,
}

/// The three recognized build-script phases, run in this order when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildScript {
    pub configure: Option<String>,
    pub make: Option<String>,
    pub install: Option<String>,
}

impl BuildScript {
    /// Phases present, in execution order.
    pub fn phases(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(s) = &self.configure {
            out.push(("configure", s.as_str()));
        }
        if let Some(s) = &self.make {
            out.push(("make", s.as_str()));
        }
        if let Some(s) = &self.install {
            out.push(("install", s.as_str()));
        }
        out
    }
}

/// A platform/target-specific build variant of a recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variant {
    pub dependencies: Vec<String>,
    pub required_tools: Vec<String>,
    pub build_script: BuildScript,
    /// Destination directory (relative to `<install>/<target>/`) -> source globs.
    pub install_paths: BTreeMap<String, Vec<String>>,
    pub patches_subdir: Option<String>,
}

/// A recipe definition as loaded from a cookbook YAML file.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub cookbook: String,
    pub kind: RecipeKind,
    pub source_url: Option<String>,
    pub archive_rename: Option<ArchiveRename>,
    /// host platform tag -> target tag -> variant
    pub platforms: BTreeMap<String, BTreeMap<String, Variant>>,
    pub origin_file: PathBuf,
}

impl Recipe {
    pub fn nvc(&self) -> Nvc {
        Nvc::new(&self.name, &self.version, &self.cookbook)
    }

    pub fn variant(&self, host: &str, target: &str) -> Option<&Variant> {
        self.platforms.get(host)?.get(target)
    }

    /// All host platform tags this recipe declares.
    pub fn declared_platforms(&self) -> Vec<String> {
        self.platforms.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCheck {
    pub command: String,
    pub contains: String,
}

/// The three detection strategies for a tool on a given platform, tried in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolDetection {
    pub path_checks: Vec<String>,
    pub command_checks: Vec<CommandCheck>,
    pub file_checks: Vec<PathBuf>,
}

/// A tool definition as loaded from a cookbook YAML file.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub version: Option<String>,
    pub cookbook: String,
    /// host platform tag -> detection strategies
    pub platforms: BTreeMap<String, ToolDetection>,
    pub tool_path: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub origin_file: PathBuf,
}

impl Tool {
    pub fn nvc(&self) -> Nvc {
        Nvc::new(&self.name, self.version.clone().unwrap_or_default(), &self.cookbook)
    }
}

/// One version of a recipe, with the set of cookbooks (and, for recipes, the targets
/// each supports) that provide it.
#[derive(Debug, Clone, Default)]
pub struct SortedVersion {
    pub version: String,
    /// cookbook name -> set of target tags supported by that cookbook's host-matching variant.
    /// Empty set means "targets not enumerated" (used for tools).
    pub cookbooks: BTreeMap<String, Vec<String>>,
}

/// `name -> [SortedVersion]`, ordered by descending version.
pub type SortedIndex = BTreeMap<String, Vec<SortedVersion>>;
