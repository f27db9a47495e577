//! Save-time consistency checks: redirect chains, duplicate sources and
//! overlapping geo rules.
//!
//! Chains and duplicates block the save. Geo overlaps are reported back as
//! warnings only.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::CoreError;
use crate::geo::{GeoIndicate, GeoRule};
use crate::redirect::{Destination, Redirect};
use crate::types::DbId;
use crate::url;

// ---------------------------------------------------------------------------
// Chain detection
// ---------------------------------------------------------------------------

/// Directed `source path -> destination path` edges of the stored rules.
///
/// Regex rules, non-redirect rules, entity references and off-site
/// destinations contribute no edges.
fn build_edges<'a>(
    existing: &'a [Redirect],
    excluding_id: DbId,
    home_url: &str,
) -> HashMap<&'a str, Vec<String>> {
    let mut edges: HashMap<&str, Vec<String>> = HashMap::new();
    for rule in existing {
        if (excluding_id != 0 && rule.id == excluding_id)
            || rule.is_regex()
            || !rule.redirect_type.is_redirect()
        {
            continue;
        }
        let Destination::Url(destination) = &rule.destination else {
            continue;
        };
        if url::is_absolute(url::strip_home(destination, home_url)) {
            continue;
        }
        edges
            .entry(rule.path.as_str())
            .or_default()
            .push(url::normalize_path(destination, home_url));
    }
    edges
}

/// Find a path through the stored rules from `candidate_destination` back to
/// `candidate_source`.
///
/// Returns the visited URLs from destination to source, or an empty vector
/// when saving `candidate_source -> candidate_destination` closes no loop.
/// The rule being edited (`excluding_id`, 0 for a new rule) is ignored.
pub fn find_chain(
    existing: &[Redirect],
    candidate_destination: &str,
    candidate_source: &str,
    excluding_id: DbId,
    home_url: &str,
) -> Vec<String> {
    if url::is_absolute(url::strip_home(candidate_destination, home_url)) {
        return Vec::new();
    }

    let edges = build_edges(existing, excluding_id, home_url);
    let start = url::normalize_path(candidate_destination, home_url);
    let target = url::normalize_path(candidate_source, home_url);

    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<Vec<String>> = vec![vec![start]];

    while let Some(path) = stack.pop() {
        let Some(node) = path.last() else {
            continue;
        };
        if *node == target {
            return path;
        }
        if !visited.insert(node.clone()) {
            continue;
        }
        if let Some(next) = edges.get(node.as_str()) {
            // Reverse so the first stored edge is explored first.
            for hop in next.iter().rev() {
                if !visited.contains(hop) {
                    let mut extended = path.clone();
                    extended.push(hop.clone());
                    stack.push(extended);
                }
            }
        }
    }

    Vec::new()
}

// ---------------------------------------------------------------------------
// Geo overlap
// ---------------------------------------------------------------------------

/// Two geo rules of one redirect that claim the same countries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoConflict {
    /// Zero-based positions of the overlapping rules.
    pub first: usize,
    pub second: usize,
    pub indicate: GeoIndicate,
    pub countries: Vec<String>,
}

impl GeoConflict {
    pub fn message(&self) -> String {
        format!(
            "Geo rules {} and {} overlap on {}; rule {} wins",
            self.first + 1,
            self.second + 1,
            self.countries.join(", "),
            self.first + 1
        )
    }
}

/// Pairwise country intersections among rules sharing an `indicate` value.
pub fn find_geo_conflicts(rules: &[GeoRule]) -> Vec<GeoConflict> {
    let mut conflicts = Vec::new();
    for (i, a) in rules.iter().enumerate() {
        for (j, b) in rules.iter().enumerate().skip(i + 1) {
            if a.indicate != b.indicate {
                continue;
            }
            let shared: Vec<String> = a
                .countries
                .iter()
                .filter(|c| b.countries.iter().any(|d| d.eq_ignore_ascii_case(c)))
                .cloned()
                .collect();
            if !shared.is_empty() {
                conflicts.push(GeoConflict {
                    first: i,
                    second: j,
                    indicate: a.indicate,
                    countries: shared,
                });
            }
        }
    }
    conflicts
}

// ---------------------------------------------------------------------------
// Duplicates and the combined save check
// ---------------------------------------------------------------------------

/// Reject a rule whose source is already claimed by another rule.
pub fn check_duplicate(candidate: &Redirect, existing: &[Redirect]) -> Result<(), CoreError> {
    let candidate_query = candidate.source_query();
    let duplicate = existing
        .iter()
        .filter(|r| candidate.id == 0 || r.id != candidate.id)
        .find(|r| match (candidate.is_regex(), r.is_regex()) {
            (true, true) => r.source == candidate.source,
            (false, false) => r.path == candidate.path && r.source_query() == candidate_query,
            _ => false,
        });

    match duplicate {
        Some(other) => Err(CoreError::Conflict(format!(
            "A redirect for '{}' already exists (id {})",
            candidate.source, other.id
        ))),
        None => Ok(()),
    }
}

/// Everything a single save runs before writing.
///
/// Returns advisory geo warnings on success.
pub fn validate_for_save(
    candidate: &Redirect,
    existing: &[Redirect],
    home_url: &str,
) -> Result<Vec<GeoConflict>, CoreError> {
    candidate.validate()?;
    check_duplicate(candidate, existing)?;

    if !candidate.is_regex() && candidate.redirect_type.is_redirect() {
        if let Destination::Url(destination) = &candidate.destination {
            let chain = find_chain(
                existing,
                destination,
                &candidate.source,
                candidate.id,
                home_url,
            );
            if !chain.is_empty() {
                return Err(CoreError::Validation(format!(
                    "Redirect chain detected: {} -> {}",
                    url::normalize_path(&candidate.source, home_url),
                    chain.join(" -> ")
                )));
            }
        }
    }

    Ok(find_geo_conflicts(&candidate.rules))
}
