use log::trace;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::{
    constants::{DEFAULT_CONDITION, ROOT_SUBPATH},
    package_json::{ExportsValue, match_star_pattern},
};

/// Export conditions active for one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConditionSet(BTreeSet<String>);

impl ConditionSet {
    pub fn new<I, S>(conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(conditions.into_iter().map(Into::into).collect())
    }

    /// `default` matches under every condition set.
    pub fn matches(&self, condition: &str) -> bool {
        condition == DEFAULT_CONDITION || self.0.contains(condition)
    }

    pub fn insert(&mut self, condition: impl Into<String>) {
        self.0.insert(condition.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Outcome of looking a subpath up in `exports`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportsLookup {
    /// No key matches the subpath, or it is mapped to `null`.
    NotExported,
    /// The subpath is exported but none of its conditions are active.
    NoMatchingCondition,
    /// Every reachable target was malformed.
    InvalidTarget,
    /// Valid targets in priority order; the first is what Node.js loads.
    Candidates(Vec<String>),
}

#[derive(Debug, Default)]
struct Walk {
    candidates: Vec<String>,
    saw_invalid: bool,
    saw_null: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Looks `subpath` (`"."` or `"./sub"`) up in `exports` under `conditions`.
pub fn lookup(exports: &ExportsValue, subpath: &str, conditions: &ConditionSet) -> ExportsLookup {
    let Some((value, star)) = find_subpath(exports, subpath) else {
        trace!("Subpath '{}' is not exported", subpath);
        return ExportsLookup::NotExported;
    };

    let mut walk = Walk::default();
    collect(value, conditions, star, &mut walk);
    trace!("Exports candidates for '{}': {:?}", subpath, walk.candidates);

    if !walk.candidates.is_empty() {
        ExportsLookup::Candidates(walk.candidates)
    } else if walk.saw_invalid {
        ExportsLookup::InvalidTarget
    } else if walk.saw_null {
        ExportsLookup::NotExported
    } else {
        ExportsLookup::NoMatchingCondition
    }
}

fn find_subpath<'a, 's>(
    exports: &'a ExportsValue,
    subpath: &'s str,
) -> Option<(&'a ExportsValue, Option<&'s str>)> {
    let ExportsValue::Subpaths(entries) = exports else {
        return (subpath == ROOT_SUBPATH).then_some((exports, None));
    };

    if let Some((_, value)) = entries.iter().find(|(key, _)| key == subpath) {
        return Some((value, None));
    }

    // Most specific pattern wins: longest prefix before '*', then longest key
    let mut best: Option<(&str, &ExportsValue, &str)> = None;
    for (key, value) in entries {
        if key.matches('*').count() != 1 {
            continue;
        }
        let Some(star) = match_star_pattern(key, subpath) else { continue };
        if star.is_empty() {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_key, _, _)) => pattern_key_cmp(key, best_key).is_lt(),
        };
        if better {
            best = Some((key.as_str(), value, star));
        }
    }
    best.map(|(_, value, star)| (value, Some(star)))
}

/// Orders pattern keys so the most specific sorts first.
fn pattern_key_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let prefix_a = a.find('*').unwrap_or(a.len());
    let prefix_b = b.find('*').unwrap_or(b.len());
    prefix_b.cmp(&prefix_a).then_with(|| b.len().cmp(&a.len()))
}

fn collect(
    value: &ExportsValue,
    conditions: &ConditionSet,
    star: Option<&str>,
    walk: &mut Walk,
) -> Flow {
    match value {
        ExportsValue::Target(target) => {
            let target = match star {
                Some(s) => target.replace('*', s),
                None => target.clone(),
            };
            if is_valid_target(&target) {
                walk.candidates.push(target);
            } else {
                trace!("Skipping invalid exports target '{}'", target);
                walk.saw_invalid = true;
            }
            Flow::Continue
        }
        ExportsValue::Null => {
            walk.saw_null = true;
            Flow::Stop
        }
        ExportsValue::Fallback(items) => {
            // A null element only ends its own branch; the array moves on
            for item in items {
                collect(item, conditions, star, walk);
            }
            Flow::Continue
        }
        ExportsValue::Conditions(entries) => {
            for (condition, nested) in entries {
                if !conditions.matches(condition) {
                    continue;
                }
                if collect(nested, conditions, star, walk) == Flow::Stop {
                    return Flow::Stop;
                }
            }
            Flow::Continue
        }
        // Rejected by the parser below the top level
        ExportsValue::Subpaths(_) => Flow::Continue,
    }
}

/// Targets must be `./` relative and stay inside the package.
fn is_valid_target(target: &str) -> bool {
    let Some(rest) = target.strip_prefix("./") else { return false };
    !rest.split('/').any(|segment| matches!(segment, "." | ".." | "node_modules"))
}
