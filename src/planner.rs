//! Transitive dependency expansion and batch planning (C6).

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::Catalog;
use crate::error::{MusselsError, Result};
use crate::model::Nvc;
use crate::platform;
use crate::selector;
use crate::version::ItemRef;

/// The recipes to build, grouped into batches: every recipe in a batch depends only
/// on recipes in earlier batches, so a batch's members could in principle build in
/// parallel (the engine itself still runs them one at a time, per the single-threaded
/// execution model).
#[derive(Debug, Clone)]
pub struct Plan {
    pub batches: Vec<Vec<Nvc>>,
}

impl Plan {
    /// All selected recipes, in dependency order (earlier batches first).
    pub fn flatten(&self) -> Vec<Nvc> {
        self.batches.iter().flatten().cloned().collect()
    }
}

struct Expansion {
    /// name -> selected nvc, enforcing one version per name across the whole plan.
    selected: BTreeMap<String, Nvc>,
    /// nvc -> the names of the nvcs it directly depends on (by selected name).
    edges: BTreeMap<Nvc, BTreeSet<String>>,
}

/// Resolves `roots` against `catalog` for `(host, target)`, expanding dependencies
/// transitively, and batches the result into dependency-ordered waves.
pub fn plan(roots: &[ItemRef], catalog: &Catalog, host: &str, target: &str) -> Result<Plan> {
    let mut index = catalog.sorted_recipes();
    let mut expansion = Expansion {
        selected: BTreeMap::new(),
        edges: BTreeMap::new(),
    };
    let mut stack: Vec<String> = Vec::new();

    for root in roots {
        expand(root, None, catalog, &mut index, &mut expansion, host, target, &mut stack)?;
    }

    batch(expansion)
}

fn expand(
    item_ref: &ItemRef,
    preferred_cookbook: Option<&str>,
    catalog: &Catalog,
    index: &mut crate::model::SortedIndex,
    expansion: &mut Expansion,
    host: &str,
    target: &str,
    stack: &mut Vec<String>,
) -> Result<Nvc> {
    if let Some(existing) = expansion.selected.get(&item_ref.name) {
        if let Some((_, constraint_version)) = &item_ref.constraint {
            if &existing.version != constraint_version {
                return Err(MusselsError::ConflictingVersions {
                    name: item_ref.name.clone(),
                    a: existing.version.clone(),
                    b: constraint_version.clone(),
                });
            }
        }
        return Ok(existing.clone());
    }

    if stack.iter().any(|n| n == &item_ref.name) {
        stack.push(item_ref.name.clone());
        return Err(MusselsError::CycleDetected(stack.join(" -> ")));
    }

    let nvc = selector::select(item_ref, index, preferred_cookbook, Some(target))?;
    expansion.selected.insert(nvc.name.clone(), nvc.clone());
    expansion.edges.entry(nvc.clone()).or_default();

    let recipe = catalog
        .recipes
        .get(&nvc)
        .ok_or_else(|| MusselsError::UnknownItem(nvc.name.clone()))?;

    let declared = recipe.declared_platforms();
    let matched_host = platform::pick_best(host, &declared);
    let Some(matched_host) = matched_host else {
        return Ok(nvc);
    };
    let Some(variant) = recipe.variant(matched_host, target) else {
        return Err(MusselsError::TargetNotSupported {
            name: nvc.name.clone(),
            target: target.to_string(),
        });
    };

    stack.push(item_ref.name.clone());
    for dep in &variant.dependencies {
        let dep_ref = ItemRef::parse(dep).map_err(|_| MusselsError::UnknownItem(dep.clone()))?;
        let dep_nvc = expand(&dep_ref, Some(&nvc.cookbook), catalog, index, expansion, host, target, stack)?;
        expansion.edges.entry(nvc.clone()).or_default().insert(dep_nvc.name.clone());
    }
    stack.pop();

    Ok(nvc)
}

/// Kahn's-algorithm peeling: repeatedly pull nodes with no unsatisfied dependency into
/// the next batch. A round that makes no progress despite remaining nodes means a
/// cycle slipped past the DFS guard in `expand` (it shouldn't); treated defensively.
fn batch(expansion: Expansion) -> Result<Plan> {
    let name_to_nvc: BTreeMap<&str, &Nvc> = expansion
        .selected
        .iter()
        .map(|(name, nvc)| (name.as_str(), nvc))
        .collect();

    let mut remaining: BTreeSet<Nvc> = expansion.edges.keys().cloned().collect();
    let mut batches = Vec::new();

    while !remaining.is_empty() {
        let mut ready: Vec<Nvc> = Vec::new();
        for nvc in &remaining {
            let deps = &expansion.edges[nvc];
            let all_satisfied = deps.iter().all(|dep_name| {
                name_to_nvc
                    .get(dep_name.as_str())
                    .map(|dep_nvc| !remaining.contains(*dep_nvc))
                    .unwrap_or(true)
            });
            if all_satisfied {
                ready.push(nvc.clone());
            }
        }

        if ready.is_empty() {
            let stuck: Vec<String> = remaining.iter().map(|n| n.to_string()).collect();
            return Err(MusselsError::CycleDetected(stuck.join(", ")));
        }

        for nvc in &ready {
            remaining.remove(nvc);
        }
        ready.sort_by(|a, b| a.name.cmp(&b.name));
        batches.push(ready);
    }

    Ok(Plan { batches })
}
