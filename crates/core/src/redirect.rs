//! Redirect rule model, builder and save-time validation.
//!
//! A [`Redirect`] is always produced through [`Redirect::build`], which
//! canonicalizes the source into its lookup `path`, defaults the status code
//! and enforces the non-redirect invariant. Building never fails; callers run
//! [`Redirect::validate`] before anything is persisted.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geo::GeoRule;
use crate::types::DbId;
use crate::url::{self, QueryParams};

/// Sentinel stored in `path` for regex rules.
pub const REGEX_PATH: &str = "regex";

/// Separator for the `options` column.
pub const OPTION_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// Redirect type
// ---------------------------------------------------------------------------

/// HTTP status a rule answers with.
///
/// 410 and 451 are non-redirect types: they end the request without a
/// `Location` header and never carry a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum RedirectType {
    MovedPermanently,
    Found,
    SeeOther,
    TemporaryRedirect,
    PermanentRedirect,
    Gone,
    UnavailableForLegalReasons,
}

pub const VALID_REDIRECT_CODES: &[u16] = &[301, 302, 303, 307, 308, 410, 451];

impl RedirectType {
    pub fn from_code(code: u16) -> Result<Self, CoreError> {
        match code {
            301 => Ok(Self::MovedPermanently),
            302 => Ok(Self::Found),
            303 => Ok(Self::SeeOther),
            307 => Ok(Self::TemporaryRedirect),
            308 => Ok(Self::PermanentRedirect),
            410 => Ok(Self::Gone),
            451 => Ok(Self::UnavailableForLegalReasons),
            _ => Err(CoreError::Validation(format!(
                "Invalid redirect type '{code}'. Must be one of: {}",
                VALID_REDIRECT_CODES
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::MovedPermanently => 301,
            Self::Found => 302,
            Self::SeeOther => 303,
            Self::TemporaryRedirect => 307,
            Self::PermanentRedirect => 308,
            Self::Gone => 410,
            Self::UnavailableForLegalReasons => 451,
        }
    }

    /// Whether this type sends the client elsewhere.
    pub fn is_redirect(self) -> bool {
        !matches!(self, Self::Gone | Self::UnavailableForLegalReasons)
    }
}

impl TryFrom<u16> for RedirectType {
    type Error = CoreError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<RedirectType> for u16 {
    fn from(value: RedirectType) -> Self {
        value.code()
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

pub const OPTION_REGEX: &str = "regex";
pub const VALID_OPTIONS: &[&str] = &[OPTION_REGEX];

/// Per-rule flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectOption {
    /// The source is a regular expression instead of a literal path.
    Regex,
}

impl RedirectOption {
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            OPTION_REGEX => Ok(Self::Regex),
            _ => Err(CoreError::Validation(format!(
                "Invalid option '{s}'. Must be one of: {}",
                VALID_OPTIONS.join(", ")
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regex => OPTION_REGEX,
        }
    }
}

/// Encode options as the pipe-delimited column value.
pub fn join_options(options: &[RedirectOption]) -> String {
    options
        .iter()
        .map(|o| o.as_str())
        .collect::<Vec<_>>()
        .join(&OPTION_SEPARATOR.to_string())
}

/// Decode the pipe-delimited column value. Empty segments are ignored.
pub fn split_options(raw: &str) -> Result<Vec<RedirectOption>, CoreError> {
    raw.split(OPTION_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(RedirectOption::from_str_value)
        .collect()
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// Reference to a CMS entity whose URL is looked up at request time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: DbId,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Where a rule sends the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Destination {
    Entity(EntityRef),
    Url(String),
    #[default]
    None,
}

impl Destination {
    pub fn is_none(&self) -> bool {
        match self {
            Self::None => true,
            Self::Url(url) => url.trim().is_empty(),
            Self::Entity(_) => false,
        }
    }

    /// Column encoding: empty string, literal URL, or JSON for entity refs.
    pub fn to_column(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Url(url) => url.clone(),
            Self::Entity(entity) => serde_json::to_string(entity).unwrap_or_default(),
        }
    }

    pub fn from_column(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::None;
        }
        if trimmed.starts_with('{') {
            if let Ok(entity) = serde_json::from_str::<EntityRef>(trimmed) {
                return Self::Entity(entity);
            }
        }
        Self::Url(raw.to_string())
    }

    /// Canonical stored form (see [`url::canonical_destination`]).
    pub fn canonical(self, home_url: &str) -> Self {
        match self {
            Self::Url(raw) => {
                let url = url::canonical_destination(&raw, home_url);
                if url.is_empty() {
                    Self::None
                } else {
                    Self::Url(url)
                }
            }
            Self::Entity(EntityRef { id, kind }) => Self::Entity(EntityRef {
                id,
                kind: kind.trim().to_string(),
            }),
            Self::None => Self::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub const DEFAULT_REDIRECT_TYPE: RedirectType = RedirectType::Found;

/// Site-wide knobs the builder and the engine need.
#[derive(Debug, Clone)]
pub struct RedirectSettings {
    /// Absolute home URL of the site, e.g. `https://example.com`.
    pub home_url: String,
    /// Status used when a rule is saved without one.
    pub default_type: RedirectType,
}

impl Default for RedirectSettings {
    fn default() -> Self {
        Self {
            home_url: String::new(),
            default_type: DEFAULT_REDIRECT_TYPE,
        }
    }
}

// ---------------------------------------------------------------------------
// Redirect
// ---------------------------------------------------------------------------

/// Raw rule input from a form, an import row, or a bulk merge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectInput {
    #[serde(default)]
    pub id: DbId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: Destination,
    #[serde(default, rename = "type")]
    pub redirect_type: Option<RedirectType>,
    #[serde(default)]
    pub options: Vec<RedirectOption>,
    #[serde(default)]
    pub rules: Vec<GeoRule>,
}

/// A redirect rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub id: DbId,
    pub title: Option<String>,
    pub source: String,
    pub path: String,
    pub destination: Destination,
    #[serde(rename = "type")]
    pub redirect_type: RedirectType,
    pub options: Vec<RedirectOption>,
    pub rules: Vec<GeoRule>,
}

impl Redirect {
    /// Construct a canonical rule from raw input.
    pub fn build(input: RedirectInput, settings: &RedirectSettings) -> Self {
        let mut options = input.options;
        options.sort();
        options.dedup();

        let source = input.source.trim().to_string();
        let path = if options.contains(&RedirectOption::Regex) {
            REGEX_PATH.to_string()
        } else {
            url::normalize_path(&source, &settings.home_url)
        };

        let mut redirect = Self {
            id: input.id,
            title: input
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            source,
            path,
            destination: input.destination.canonical(&settings.home_url),
            redirect_type: input.redirect_type.unwrap_or(settings.default_type),
            options,
            rules: input
                .rules
                .into_iter()
                .map(|rule| rule.canonical(&settings.home_url))
                .collect(),
        };
        redirect.enforce_type_invariants();
        redirect
    }

    /// Clear destination and geo rules on non-redirect types.
    pub fn enforce_type_invariants(&mut self) {
        if !self.redirect_type.is_redirect() {
            self.destination = Destination::None;
            self.rules.clear();
        }
    }

    /// Convert back into builder input (used when merging bulk changes).
    pub fn to_input(&self) -> RedirectInput {
        RedirectInput {
            id: self.id,
            title: self.title.clone(),
            source: self.source.clone(),
            destination: self.destination.clone(),
            redirect_type: Some(self.redirect_type),
            options: self.options.clone(),
            rules: self.rules.clone(),
        }
    }

    pub fn is_regex(&self) -> bool {
        self.options.contains(&RedirectOption::Regex)
    }

    /// Query parameters embedded in a plain rule's source.
    pub fn source_query(&self) -> QueryParams {
        url::query_params(&self.source)
    }

    /// Compile the anchored source pattern of a regex rule.
    pub fn compile_pattern(&self) -> Result<Regex, regex::Error> {
        Regex::new(&anchor_pattern(&self.source))
    }

    /// Save-time checks. Regex sources are compiled and discarded.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.source.is_empty() {
            return Err(CoreError::Validation("Source URL is required".into()));
        }

        if self.is_regex() {
            if let Err(e) = self.compile_pattern() {
                return Err(CoreError::Validation(format!(
                    "Invalid regex pattern '{}': {e}",
                    self.source
                )));
            }
        }

        if self.redirect_type.is_redirect() {
            if self.destination.is_none() {
                return Err(CoreError::Validation(format!(
                    "A destination is required for {} redirects",
                    self.redirect_type.code()
                )));
            }
            if let Destination::Entity(entity) = &self.destination {
                validate_entity(entity)?;
            }
        } else if !self.destination.is_none() || !self.rules.is_empty() {
            return Err(CoreError::Validation(format!(
                "Status {} cannot have a destination or geo rules",
                self.redirect_type.code()
            )));
        }

        for (index, rule) in self.rules.iter().enumerate() {
            rule.validate()
                .map_err(|e| CoreError::Validation(format!("Geo rule {}: {e}", index + 1)))?;
        }

        Ok(())
    }
}

pub(crate) fn validate_entity(entity: &EntityRef) -> Result<(), CoreError> {
    if entity.id <= 0 || entity.kind.is_empty() {
        return Err(CoreError::Validation(format!(
            "Invalid entity reference {{id: {}, type: '{}'}}",
            entity.id, entity.kind
        )));
    }
    Ok(())
}

/// Anchor a stored pattern so it must match the whole subject.
pub fn anchor_pattern(source: &str) -> String {
    let mut pattern = String::with_capacity(source.len() + 2);
    if !source.starts_with('^') {
        pattern.push('^');
    }
    pattern.push_str(source);
    if !source.ends_with('$') {
        pattern.push('$');
    }
    pattern
}
