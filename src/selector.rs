//! Given an item reference and a constraint, pick `(name, version, cookbook)` and
//! prune the sorted index (C5).

use std::cmp::Ordering;

use crate::error::{MusselsError, Result};
use crate::model::{Nvc, SortedIndex, SortedVersion};
use crate::version::{compare_versions, ItemRef, Op};

const LOCAL_COOKBOOK: &str = "local";

/// Narrows `candidate`'s cookbook map down to a single eligible cookbook and
/// returns its name, or `None` if no cookbook in this version is eligible.
///
/// Eligibility: the reference's explicit cookbook (if any) must match; otherwise
/// any cookbook is eligible provided it supports `target` (when one was requested).
/// Among eligible cookbooks: `local` wins, then `preferred`, then the first in
/// (deterministic, alphabetical) map order.
fn select_cookbook(
    candidate: &mut SortedVersion,
    requested_cookbook: Option<&str>,
    preferred_cookbook: Option<&str>,
    target: Option<&str>,
) -> Option<String> {
    let supports_target = |targets: &[String]| match target {
        None => true,
        Some(t) => targets.is_empty() || targets.iter().any(|x| x == t),
    };

    let eligible: Vec<String> = candidate
        .cookbooks
        .iter()
        .filter(|(name, targets)| {
            let name_ok = match requested_cookbook {
                Some(req) => name.as_str() == req,
                None => true,
            };
            name_ok && supports_target(targets)
        })
        .map(|(name, _)| name.clone())
        .collect();

    let chosen = if eligible.iter().any(|n| n == LOCAL_COOKBOOK) {
        LOCAL_COOKBOOK.to_string()
    } else if let Some(pref) = preferred_cookbook {
        if eligible.iter().any(|n| n == pref) {
            pref.to_string()
        } else {
            eligible.into_iter().next()?
        }
    } else {
        eligible.into_iter().next()?
    };

    let targets = candidate.cookbooks.remove(&chosen)?;
    candidate.cookbooks.clear();
    candidate.cookbooks.insert(chosen.clone(), targets);
    Some(chosen)
}

/// Resolves `item_ref` against `index`, mutating it per (I3): entries are only
/// ever removed, never added.
pub fn select(
    item_ref: &ItemRef,
    index: &mut SortedIndex,
    preferred_cookbook: Option<&str>,
    target: Option<&str>,
) -> Result<Nvc> {
    let name = item_ref.name.clone();
    let versions = index
        .get_mut(&name)
        .ok_or_else(|| MusselsError::UnknownItem(name.clone()))?;

    let requested_cookbook = item_ref.cookbook.as_deref();

    let selected = match &item_ref.constraint {
        None => select_highest(versions, requested_cookbook, preferred_cookbook, target),
        Some((Op::Ge, v)) => select_ge(versions, v, false, requested_cookbook, preferred_cookbook, target),
        Some((Op::Gt, v)) => select_ge(versions, v, true, requested_cookbook, preferred_cookbook, target),
        Some((Op::Le, v)) => select_le(versions, v, false, requested_cookbook, preferred_cookbook, target),
        Some((Op::Lt, v)) => select_le(versions, v, true, requested_cookbook, preferred_cookbook, target),
        Some((Op::Eq, v)) => select_eq(versions, v, requested_cookbook, preferred_cookbook, target),
    };

    match selected {
        Some((version, cookbook)) => Ok(Nvc::new(name, version, cookbook)),
        None => {
            if let Some((_, v)) = &item_ref.constraint {
                if target.is_some() && versions.iter().any(|sv| &sv.version == v) {
                    return Err(MusselsError::TargetNotSupported {
                        name,
                        target: target.unwrap().to_string(),
                    });
                }
                Err(MusselsError::UnsatisfiedVersionConstraint {
                    name,
                    constraint: format!("{}{v}", item_ref.constraint.as_ref().unwrap().0),
                })
            } else {
                Err(MusselsError::NoCompatibleCookbook { name })
            }
        }
    }
}

fn select_highest(
    versions: &mut Vec<SortedVersion>,
    requested_cookbook: Option<&str>,
    preferred_cookbook: Option<&str>,
    target: Option<&str>,
) -> Option<(String, String)> {
    for candidate in versions.iter_mut() {
        if let Some(cookbook) = select_cookbook(candidate, requested_cookbook, preferred_cookbook, target) {
            return Some((candidate.version.clone(), cookbook));
        }
    }
    None
}

/// `>=V` (strict=false) / `>V` (strict=true): drop everything strictly below (or at,
/// for strict) `V`, then select the highest remaining.
fn select_ge(
    versions: &mut Vec<SortedVersion>,
    bound: &str,
    strict: bool,
    requested_cookbook: Option<&str>,
    preferred_cookbook: Option<&str>,
    target: Option<&str>,
) -> Option<(String, String)> {
    let cutoff = versions
        .iter()
        .position(|sv| {
            let cmp = compare_versions(&sv.version, bound);
            !(if strict { cmp == Ordering::Greater } else { cmp != Ordering::Less })
        })
        .unwrap_or(versions.len());
    versions.truncate(cutoff);
    select_highest(versions, requested_cookbook, preferred_cookbook, target)
}

/// `<=V` (strict=false) / `<V` (strict=true): drop entries from the head until the
/// remaining head satisfies the bound (and has an eligible cookbook), then select.
fn select_le(
    versions: &mut Vec<SortedVersion>,
    bound: &str,
    strict: bool,
    requested_cookbook: Option<&str>,
    preferred_cookbook: Option<&str>,
    target: Option<&str>,
) -> Option<(String, String)> {
    while !versions.is_empty() {
        let cmp = compare_versions(&versions[0].version, bound);
        let satisfies = if strict { cmp == Ordering::Less } else { cmp != Ordering::Greater };
        if !satisfies {
            versions.remove(0);
            continue;
        }
        if let Some(cookbook) =
            select_cookbook(&mut versions[0], requested_cookbook, preferred_cookbook, target)
        {
            return Some((versions[0].version.clone(), cookbook));
        }
        versions.remove(0);
    }
    None
}

/// `==V`: keep only the exact match.
fn select_eq(
    versions: &mut Vec<SortedVersion>,
    exact: &str,
    requested_cookbook: Option<&str>,
    preferred_cookbook: Option<&str>,
    target: Option<&str>,
) -> Option<(String, String)> {
    let idx = versions.iter().position(|sv| sv.version == exact)?;
    let mut only = versions.remove(idx);
    let result = select_cookbook(&mut only, requested_cookbook, preferred_cookbook, target)
        .map(|cookbook| (only.version.clone(), cookbook));
    versions.clear();
    if result.is_some() {
        versions.push(only);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn index_with(name: &str, versions: &[(&str, &[(&str, &[&str])])]) -> SortedIndex {
        let mut index = SortedIndex::new();
        let sorted: Vec<SortedVersion> = versions
            .iter()
            .map(|(version, cookbooks)| SortedVersion {
                version: version.to_string(),
                cookbooks: cookbooks
                    .iter()
                    .map(|(cb, targets)| {
                        (cb.to_string(), targets.iter().map(|t| t.to_string()).collect())
                    })
                    .collect::<BTreeMap<_, _>>(),
            })
            .collect();
        index.insert(name.to_string(), sorted);
        index
    }

    #[test]
    fn no_constraint_selects_highest() {
        let mut index = index_with("lib", &[("2.0", &[("local", &["host"])]), ("1.0", &[("local", &["host"])])]);
        let r = ItemRef::parse("lib").unwrap();
        let nvc = select(&r, &mut index, None, None).unwrap();
        assert_eq!(nvc.version, "2.0");
    }

    #[test]
    fn lt_constraint_prunes_and_selects_highest_remaining() {
        let mut index = index_with(
            "lib",
            &[
                ("2.0", &[("local", &["host"])]),
                ("1.1", &[("local", &["host"])]),
                ("1.0", &[("local", &["host"])]),
            ],
        );
        let r = ItemRef::parse("lib<2.0").unwrap();
        let nvc = select(&r, &mut index, None, None).unwrap();
        assert_eq!(nvc.version, "1.1");
        let remaining: Vec<&str> = index["lib"].iter().map(|sv| sv.version.as_str()).collect();
        assert_eq!(remaining, vec!["1.1", "1.0"]);
    }

    #[test]
    fn eq_constraint_keeps_only_exact_match() {
        let mut index = index_with(
            "lib",
            &[("2.0", &[("local", &["host"])]), ("1.0", &[("local", &["host"])])],
        );
        let r = ItemRef::parse("lib==1.0").unwrap();
        let nvc = select(&r, &mut index, None, None).unwrap();
        assert_eq!(nvc.version, "1.0");
        assert_eq!(index["lib"].len(), 1);
    }

    #[test]
    fn eq_constraint_fails_when_absent() {
        let mut index = index_with("lib", &[("2.0", &[("local", &["host"])])]);
        let r = ItemRef::parse("lib==9.9").unwrap();
        assert!(matches!(
            select(&r, &mut index, None, None),
            Err(MusselsError::UnsatisfiedVersionConstraint { .. })
        ));
    }

    #[test]
    fn local_cookbook_wins_over_others() {
        let mut index = index_with(
            "lib",
            &[("1.0", &[("remote", &["host"]), ("local", &["host"])])],
        );
        let r = ItemRef::parse("lib").unwrap();
        let nvc = select(&r, &mut index, None, None).unwrap();
        assert_eq!(nvc.cookbook, "local");
    }

    #[test]
    fn explicit_cookbook_reference_is_required() {
        let mut index = index_with("lib", &[("1.0", &[("remote", &["host"])])]);
        let r = ItemRef::parse("other:lib").unwrap();
        assert!(matches!(
            select(&r, &mut index, None, None),
            Err(MusselsError::UnsatisfiedVersionConstraint { .. })
        ));
    }

    #[test]
    fn unknown_item_errors() {
        let mut index = SortedIndex::new();
        let r = ItemRef::parse("ghost").unwrap();
        assert!(matches!(select(&r, &mut index, None, None), Err(MusselsError::UnknownItem(_))));
    }

    #[test]
    fn target_constraint_filters_cookbooks() {
        let mut index = index_with("lib", &[("1.0", &[("local", &["x86"])])]);
        let r = ItemRef::parse("lib").unwrap();
        assert!(select(&r, &mut index, None, Some("x64")).is_err());
        let nvc = select(&r, &mut index, None, Some("x86")).unwrap();
        assert_eq!(nvc.version, "1.0");
    }
}
