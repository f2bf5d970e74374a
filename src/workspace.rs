//! Data directory layout, path helpers, and cleanup (C9).

use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::model::Nvc;

/// Owns every on-disk path Mussels touches, resolved once at startup from (in
/// order) an explicit flag, the `MUSSELS_DATA_DIR` environment variable, then a
/// platform default.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub data_dir: PathBuf,
}

impl Workspace {
    pub fn resolve(data_dir_flag: Option<PathBuf>) -> Self {
        let data_dir = data_dir_flag
            .or_else(|| std::env::var_os("MUSSELS_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(default_data_dir);
        Self { data_dir }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("config").join("cookbooks.json")
    }

    pub fn cookbooks_dir(&self) -> PathBuf {
        self.data_dir.join("cookbooks")
    }

    pub fn cookbook_dir(&self, name: &str) -> PathBuf {
        self.cookbooks_dir().join(name)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("cache").join("downloads")
    }

    pub fn work_dir(&self, target: &str) -> PathBuf {
        self.data_dir.join("cache").join("work").join(target)
    }

    pub fn install_dir(&self, target: &str) -> PathBuf {
        self.data_dir.join("install").join(target)
    }

    pub fn recipe_log_path(&self, nvc: &Nvc, timestamp: &str) -> PathBuf {
        self.data_dir
            .join("logs")
            .join("recipes")
            .join(format!("{}-{}-{}.{timestamp}.log", nvc.cookbook, nvc.name, nvc.version))
    }

    pub fn tool_log_path(&self, nvc: &Nvc, timestamp: &str) -> PathBuf {
        self.data_dir
            .join("logs")
            .join("tools")
            .join(format!("{}-{}.{timestamp}.log", nvc.cookbook, nvc.name))
    }

    pub fn clean_cache(&self) -> Result<()> {
        remove_if_exists(&self.data_dir.join("cache"))
    }

    pub fn clean_install(&self) -> Result<()> {
        remove_if_exists(&self.data_dir.join("install"))
    }

    pub fn clean_logs(&self) -> Result<()> {
        remove_if_exists(&self.data_dir.join("logs"))
    }

    pub fn clean_all(&self) -> Result<()> {
        self.clean_cache()?;
        self.clean_install()?;
        self.clean_logs()?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        info!("removing {}", path.display());
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// Seconds-since-epoch used to disambiguate log file names across repeated runs.
pub(crate) fn timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

/// No bundled `directories`/`dirs` crate is pulled in for this; Mussels' data
/// directory need only be stable and writable, not match each OS's conventions
/// exactly.
fn default_data_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("mussels");
        }
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".mussels");
    }
    PathBuf::from(".mussels")
}
