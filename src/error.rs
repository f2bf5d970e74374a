use std::path::PathBuf;

use thiserror::Error;

/// The taxonomy of errors the core can raise, grouped the way the spec groups them:
/// definition errors are non-fatal (the offending file is skipped), resolution and
/// environment errors abort before any recipe runs, execution errors mark a single
/// recipe `Failed` and skip everything downstream, and storage errors are a mix.
#[derive(Debug, Error)]
pub enum MusselsError {
    // --- Definition errors: recipe skipped, build continues without it. ---
    #[error("malformed recipe definition in {path}: {reason}")]
    MalformedRecipe { path: PathBuf, reason: String },

    #[error("{path} declares mussels_version {found}, minimum supported is {minimum}")]
    UnsupportedMusselsVersion {
        path: PathBuf,
        found: String,
        minimum: String,
    },

    // --- Resolution errors: abort the plan, no recipe built. ---
    #[error("unknown item: {0}")]
    UnknownItem(String),

    #[error("no version of '{name}' satisfies constraint '{constraint}'")]
    UnsatisfiedVersionConstraint { name: String, constraint: String },

    #[error("no cookbook provides '{name}' for the requested platform/target")]
    NoCompatibleCookbook { name: String },

    #[error("'{name}' does not support target '{target}'")]
    TargetNotSupported { name: String, target: String },

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("conflicting versions of '{name}' required in the same plan: {a} and {b}")]
    ConflictingVersions { name: String, a: String, b: String },

    // --- Environment errors: abort before any recipe runs. ---
    #[error("required tool(s) missing: {0}")]
    ToolMissing(String),

    #[error("cookbook '{name}' is not trusted; run `mussels cookbook trust {name}` or clone the recipe into ./local")]
    UntrustedCookbook { name: String },

    // --- Execution errors: mark the recipe Failed, skip downstream recipes. ---
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("unsupported archive extension for {0}")]
    UnsupportedArchive(PathBuf),

    #[error("failed to extract {archive}: {reason}")]
    ExtractFailed { archive: PathBuf, reason: String },

    #[error("failed to apply patches in {0}")]
    PatchFailed(PathBuf),

    #[error("build script '{phase}' exited with status {exit_code}")]
    ScriptFailed { phase: String, exit_code: i32 },

    #[error("install path source not found: {0}")]
    InstallPathMissing(String),

    #[error("unknown template key '{0}'")]
    UnknownTemplateKey(String),

    // --- Storage errors. ---
    #[error("failed to persist cookbook registry: {0}")]
    RegistryPersistFailed(String),

    #[error("failed to create workspace directory {path}: {source}")]
    WorkspaceDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MusselsError>;
