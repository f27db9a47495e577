//! Row mapping for the `redirects` table.
//!
//! Rules are stored flattened: the destination as a URL or entity JSON, the
//! options pipe-delimited, the geo rules as a JSON array. [`RedirectValues`]
//! is the write-side encoding and [`RedirectRow`] the full read-side row.

use sqlx::FromRow;
use waypost_core::error::CoreError;
use waypost_core::redirect::{
    join_options, split_options, Destination, Redirect, RedirectType,
};
use waypost_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Column values
// ---------------------------------------------------------------------------

/// The encoded, non-key columns of one rule.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RedirectValues {
    pub title: Option<String>,
    pub source: String,
    pub path: String,
    pub destination: String,
    pub redirect_type: i16,
    pub options: String,
    pub rules: String,
}

impl RedirectValues {
    /// Encode a rule for storage.
    pub fn deflate(redirect: &Redirect) -> Self {
        Self {
            title: redirect.title.clone(),
            source: redirect.source.clone(),
            path: redirect.path.clone(),
            destination: redirect.destination.to_column(),
            // Every code fits in an i16.
            redirect_type: redirect.redirect_type.code() as i16,
            options: join_options(&redirect.options),
            rules: serde_json::to_string(&redirect.rules).unwrap_or_else(|_| "[]".into()),
        }
    }

    /// Decode stored columns back into a rule.
    pub fn inflate(self, id: DbId) -> Result<Redirect, CoreError> {
        let code = u16::try_from(self.redirect_type).map_err(|_| {
            CoreError::Internal(format!(
                "Redirect {id} has invalid type {}",
                self.redirect_type
            ))
        })?;
        let rules = if self.rules.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.rules).map_err(|e| {
                CoreError::Internal(format!("Redirect {id} has corrupt geo rules: {e}"))
            })?
        };

        Ok(Redirect {
            id,
            title: self.title,
            source: self.source,
            path: self.path,
            destination: Destination::from_column(&self.destination),
            redirect_type: RedirectType::from_code(code)?,
            options: split_options(&self.options)?,
            rules,
        })
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from the `redirects` table.
#[derive(Debug, Clone, FromRow)]
pub struct RedirectRow {
    pub id: DbId,
    #[sqlx(flatten)]
    pub values: RedirectValues,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RedirectRow {
    pub fn inflate(self) -> Result<Redirect, CoreError> {
        self.values.inflate(self.id)
    }
}
