//! Cookbook registry: persistence, trust flags, and VCS-backed updates (C4).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{MusselsError, Result};

pub const LOCAL_COOKBOOK: &str = "local";

/// The public cookbooks Mussels seeds into a brand-new registry, carried over from
/// the reference implementation's built-in bookshelf.
const BUILTIN_COOKBOOKS: &[(&str, &str, &str)] = &[
    (
        "scrapbook",
        "https://github.com/Cisco-Talos/mussels-recipe-scrapbook.git",
        "Cisco",
    ),
    (
        "clamav",
        "https://github.com/Cisco-Talos/clamav-mussels-cookbook.git",
        "Cisco",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookbookEntry {
    pub url: Option<String>,
    pub path: PathBuf,
    #[serde(default)]
    pub trusted: bool,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub recipes: u32,
    #[serde(default)]
    pub tools: u32,
}

/// Clones or fast-forward-pulls a cookbook repository. Split out as a trait so
/// registry logic can be tested without touching the network.
pub trait CookbookFetcher {
    fn clone_or_update(&self, url: &str, dest: &Path) -> Result<()>;
}

pub struct Git2Fetcher;

impl CookbookFetcher for Git2Fetcher {
    fn clone_or_update(&self, url: &str, dest: &Path) -> Result<()> {
        if dest.join(".git").exists() {
            let repo = git2::Repository::open(dest)
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
            let mut remote = repo
                .find_remote("origin")
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
            remote
                .fetch(&["refs/heads/*:refs/remotes/origin/*"], None, None)
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;

            let head = repo
                .head()
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
            let branch = head.shorthand().unwrap_or("main").to_string();
            let remote_ref = format!("refs/remotes/origin/{branch}");
            let remote_commit = repo
                .find_reference(&remote_ref)
                .and_then(|r| r.peel_to_commit())
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;

            let mut local_ref = head;
            local_ref
                .set_target(remote_commit.id(), "fast-forward")
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
            repo.set_head(&format!("refs/heads/{branch}"))
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
            repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
        } else {
            git2::Repository::clone(url, dest)
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Registry {
    pub entries: BTreeMap<String, CookbookEntry>,
    file_path: PathBuf,
}

impl Registry {
    /// Loads the registry from `file_path`, seeding the built-in bookshelf the
    /// first time the file does not yet exist.
    pub fn load(file_path: PathBuf, cookbooks_dir: &Path) -> Result<Self> {
        if file_path.exists() {
            let contents = std::fs::read_to_string(&file_path)?;
            let entries: BTreeMap<String, CookbookEntry> = serde_json::from_str(&contents)
                .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
            Ok(Self { entries, file_path })
        } else {
            let mut registry = Self {
                entries: BTreeMap::new(),
                file_path,
            };
            for (name, url, author) in BUILTIN_COOKBOOKS {
                registry.entries.insert(
                    name.to_string(),
                    CookbookEntry {
                        url: Some(url.to_string()),
                        path: cookbooks_dir.join(name),
                        trusted: false,
                        author: Some(author.to_string()),
                        recipes: 0,
                        tools: 0,
                    },
                );
            }
            if let Err(e) = registry.save() {
                warn!("failed to persist freshly seeded cookbook registry: {e}");
            }
            Ok(registry)
        }
    }

    /// Writes the registry atomically: serialize to a temp file beside the target,
    /// then rename over it, so a crash mid-write never corrupts the prior version.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| MusselsError::RegistryPersistFailed(e.to_string()))?;
        let tmp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.file_path)?;
        Ok(())
    }

    pub fn is_trusted(&self, name: &str) -> bool {
        if name == LOCAL_COOKBOOK {
            return true;
        }
        self.entries.get(name).map(|e| e.trusted).unwrap_or(false)
    }

    pub fn add(
        &mut self,
        name: &str,
        url: &str,
        path: PathBuf,
        author: Option<String>,
        trusted: bool,
    ) -> Result<()> {
        self.entries.insert(
            name.to_string(),
            CookbookEntry {
                url: Some(url.to_string()),
                path,
                trusted,
                author,
                recipes: 0,
                tools: 0,
            },
        );
        self.save()
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.entries.remove(name);
        self.save()
    }

    pub fn trust(&mut self, name: &str) -> Result<()> {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.trusted = true;
                self.save()
            }
            None => Err(MusselsError::UnknownItem(name.to_string())),
        }
    }

    /// Clones (if absent) or fast-forward pulls (if present) every entry with a
    /// URL, then updates its recipe/tool counts from the catalog walk.
    pub fn update(&mut self, fetcher: &dyn CookbookFetcher) -> Result<()> {
        for (name, entry) in self.entries.iter_mut() {
            let Some(url) = &entry.url else { continue };
            info!("updating cookbook '{name}' from {url}");
            fetcher.clone_or_update(url, &entry.path)?;

            let mut catalog = crate::catalog::Catalog::new();
            catalog.load_cookbook(&entry.path, name);
            entry.recipes = catalog.recipes.len() as u32;
            entry.tools = catalog.tools.len() as u32;
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct NoopFetcher;
    impl CookbookFetcher for NoopFetcher {
        fn clone_or_update(&self, _url: &str, dest: &Path) -> Result<()> {
            std::fs::create_dir_all(dest)?;
            Ok(())
        }
    }

    #[test]
    fn seeds_builtin_bookshelf_on_first_load() {
        let dir = tempdir().unwrap();
        let registry = Registry::load(dir.path().join("cookbooks.json"), &dir.path().join("cookbooks")).unwrap();
        assert!(registry.entries.contains_key("scrapbook"));
        assert!(registry.entries.contains_key("clamav"));
        assert!(!registry.is_trusted("scrapbook"));
    }

    #[test]
    fn local_is_always_trusted_without_an_entry() {
        let dir = tempdir().unwrap();
        let registry = Registry::load(dir.path().join("cookbooks.json"), &dir.path().join("cookbooks")).unwrap();
        assert!(registry.is_trusted(LOCAL_COOKBOOK));
    }

    #[test]
    fn add_trust_remove_round_trip() {
        let dir = tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("cookbooks.json"), &dir.path().join("cookbooks")).unwrap();
        registry
            .add("mine", "https://example.com/mine.git", dir.path().join("mine"), None, false)
            .unwrap();
        assert!(!registry.is_trusted("mine"));
        registry.trust("mine").unwrap();
        assert!(registry.is_trusted("mine"));
        registry.remove("mine").unwrap();
        assert!(!registry.entries.contains_key("mine"));
    }

    #[test]
    fn persists_across_loads() {
        let dir = tempdir().unwrap();
        let reg_path = dir.path().join("cookbooks.json");
        let mut registry = Registry::load(reg_path.clone(), &dir.path().join("cookbooks")).unwrap();
        registry.trust("clamav").unwrap();

        let reloaded = Registry::load(reg_path, &dir.path().join("cookbooks")).unwrap();
        assert!(reloaded.is_trusted("clamav"));
    }

    #[test]
    fn trusting_unknown_cookbook_errors() {
        let dir = tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("cookbooks.json"), &dir.path().join("cookbooks")).unwrap();
        assert!(registry.trust("does-not-exist").is_err());
    }

    #[test]
    fn update_clones_and_refreshes_counts() {
        let dir = tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("cookbooks.json"), &dir.path().join("cookbooks")).unwrap();
        registry.update(&NoopFetcher).unwrap();
        assert!(registry.entries["scrapbook"].path.exists());
    }
}
