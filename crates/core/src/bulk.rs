//! Bulk edits across many redirects.
//!
//! Planning is all-or-nothing: every merged rule is validated against the
//! rule set as it would look after the whole batch, and the first failure
//! aborts the plan before anything is written.

use std::collections::HashSet;

use serde::Deserialize;

use crate::chain::validate_for_save;
use crate::error::CoreError;
use crate::geo::GeoRule;
use crate::redirect::{Destination, Redirect, RedirectOption, RedirectSettings, RedirectType};
use crate::types::DbId;

/// Fields to overwrite on every selected redirect. Absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub destination: Option<Destination>,
    #[serde(default, rename = "type")]
    pub redirect_type: Option<RedirectType>,
    #[serde(default)]
    pub options: Option<Vec<RedirectOption>>,
    #[serde(default)]
    pub rules: Option<Vec<GeoRule>>,
}

impl RedirectChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.destination.is_none()
            && self.redirect_type.is_none()
            && self.options.is_none()
            && self.rules.is_none()
    }

    /// Merge onto `current` and rebuild, so type invariants are re-applied.
    pub fn apply(&self, current: &Redirect, settings: &RedirectSettings) -> Redirect {
        let mut input = current.to_input();
        if let Some(title) = &self.title {
            input.title = Some(title.clone());
        }
        if let Some(destination) = &self.destination {
            input.destination = destination.clone();
        }
        if let Some(redirect_type) = self.redirect_type {
            input.redirect_type = Some(redirect_type);
        }
        if let Some(options) = &self.options {
            input.options = options.clone();
        }
        if let Some(rules) = &self.rules {
            input.rules = rules.clone();
        }
        Redirect::build(input, settings)
    }
}

fn with_item_context(id: DbId, err: CoreError) -> CoreError {
    match err {
        CoreError::Validation(msg) => CoreError::Validation(format!("Redirect {id}: {msg}")),
        CoreError::Conflict(msg) => CoreError::Conflict(format!("Redirect {id}: {msg}")),
        other => other,
    }
}

/// Produce the updated rules for `ids`, or the first error.
///
/// `existing` must be the full stored rule set.
pub fn plan_bulk_update(
    ids: &[DbId],
    changes: &RedirectChanges,
    existing: &[Redirect],
    settings: &RedirectSettings,
) -> Result<Vec<Redirect>, CoreError> {
    if ids.is_empty() {
        return Err(CoreError::Validation("No redirects selected".into()));
    }
    if changes.is_empty() {
        return Err(CoreError::Validation("No changes supplied".into()));
    }

    let mut seen = HashSet::new();
    let mut planned = Vec::with_capacity(ids.len());
    for &id in ids {
        if !seen.insert(id) {
            continue;
        }
        let current = existing
            .iter()
            .find(|r| r.id == id)
            .ok_or(CoreError::NotFound {
                entity: "redirect",
                id,
            })?;
        planned.push(changes.apply(current, settings));
    }

    let would_be: Vec<Redirect> = existing
        .iter()
        .map(|r| {
            planned
                .iter()
                .find(|p| p.id == r.id)
                .unwrap_or(r)
                .clone()
        })
        .collect();

    for candidate in &planned {
        validate_for_save(candidate, &would_be, &settings.home_url)
            .map_err(|e| with_item_context(candidate.id, e))?;
    }

    tracing::debug!(count = planned.len(), "Bulk update planned");
    Ok(planned)
}
