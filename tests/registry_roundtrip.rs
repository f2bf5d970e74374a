//! Registry persistence, trust flags, and seeded-default behavior.

use mussels::error::MusselsError;
use mussels::registry::Registry;

#[test]
fn fresh_registry_seeds_builtin_cookbooks_untrusted() {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("config").join("cookbooks.json");
    let cookbooks_dir = dir.path().join("cookbooks");

    let registry = Registry::load(registry_path.clone(), &cookbooks_dir).unwrap();
    assert!(!registry.entries.is_empty());
    assert!(registry.entries.values().all(|e| !e.trusted));
    assert!(registry_path.exists());
}

#[test]
fn add_trust_remove_roundtrip_persists_across_loads() {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("config").join("cookbooks.json");
    let cookbooks_dir = dir.path().join("cookbooks");

    let mut registry = Registry::load(registry_path.clone(), &cookbooks_dir).unwrap();
    registry
        .add(
            "mine",
            "https://example.com/mine.git",
            cookbooks_dir.join("mine"),
            Some("me".to_string()),
            false,
        )
        .unwrap();
    assert!(!registry.is_trusted("mine"));

    registry.trust("mine").unwrap();
    assert!(registry.is_trusted("mine"));

    let reloaded = Registry::load(registry_path.clone(), &cookbooks_dir).unwrap();
    assert!(reloaded.is_trusted("mine"));

    let mut reloaded = reloaded;
    reloaded.remove("mine").unwrap();
    let final_load = Registry::load(registry_path, &cookbooks_dir).unwrap();
    assert!(!final_load.entries.contains_key("mine"));
}

#[test]
fn trusting_unknown_cookbook_errors() {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("config").join("cookbooks.json");
    let cookbooks_dir = dir.path().join("cookbooks");

    let mut registry = Registry::load(registry_path, &cookbooks_dir).unwrap();
    assert!(matches!(registry.trust("nope"), Err(MusselsError::UnknownItem(_))));
}

#[test]
fn local_cookbook_is_always_trusted_without_an_entry() {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("config").join("cookbooks.json");
    let cookbooks_dir = dir.path().join("cookbooks");

    let registry = Registry::load(registry_path, &cookbooks_dir).unwrap();
    assert!(registry.is_trusted("local"));
    assert!(!registry.entries.contains_key("local"));
}
