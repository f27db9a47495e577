//! Request-time rule matching.
//!
//! [`RedirectEngine::resolve`] turns an [`InboundRequest`] into a
//! [`Decision`]. The engine owns no state: every call re-reads the rule store
//! through [`RedirectLookup`], and every failure on this path degrades to
//! [`Decision::Passthrough`] rather than an error.

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;

use crate::error::CoreError;
use crate::geo::GeoResolver;
use crate::redirect::{Destination, EntityRef, Redirect, RedirectSettings};
use crate::types::DbId;
use crate::url::{self, QueryParams};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Read access to stored rules, in insertion order.
pub trait RedirectLookup: Send + Sync {
    /// Plain rules whose canonical path equals `path`.
    fn find_by_path(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<Redirect>, CoreError>> + Send;

    /// Every regex rule, unfiltered.
    fn find_regex_candidates(&self) -> impl Future<Output = Result<Vec<Redirect>, CoreError>> + Send;
}

/// Resolves structured destinations to URLs at request time.
pub trait EntityUrlResolver: Send + Sync {
    /// `None` when the entity no longer exists or has no public URL.
    fn entity_url(&self, entity: &EntityRef) -> impl Future<Output = Option<String>> + Send;
}

// ---------------------------------------------------------------------------
// Request / decision
// ---------------------------------------------------------------------------

/// The parts of an HTTP request the engine looks at.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Request URL, absolute or relative to the site root, query included.
    pub url: String,
    pub query_params: QueryParams,
    pub client_ip: Option<IpAddr>,
}

impl InboundRequest {
    pub fn new(url: impl Into<String>, client_ip: Option<IpAddr>) -> Self {
        let url = url.into();
        let query_params = url::query_params(&url);
        Self {
            url,
            query_params,
            client_ip,
        }
    }
}

/// What the delivery layer should do with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// Send a `Location` header with a 3xx status.
    Redirect {
        location: String,
        status: u16,
        redirect_id: DbId,
    },
    /// End the request with a non-redirect status (410, 451).
    Terminal { status: u16, redirect_id: DbId },
    /// Continue normal request handling.
    Passthrough,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A selected rule plus, for regex rules, what is needed to expand capture
/// references in its destinations.
struct Matched {
    rule: Redirect,
    captures: Option<(Regex, String)>,
}

impl Matched {
    fn expand(&self, template: &str) -> String {
        let Some((pattern, subject)) = &self.captures else {
            return template.to_string();
        };
        let Some(caps) = pattern.captures(subject) else {
            return template.to_string();
        };
        let mut out = String::new();
        caps.expand(&brace_numeric_refs(template), &mut out);
        out
    }
}

/// Rewrite `$1` as `${1}` so a reference followed by more text (`$1abc`)
/// is read as group 1, not as a group named `1abc`.
fn brace_numeric_refs(template: &str) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len() + 4);
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() {
            if bytes[i + 1] == b'$' {
                i += 2;
                continue;
            }
            let digits = bytes[i + 1..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if digits > 0 {
                out.push_str(&template[copied..i]);
                out.push_str("${");
                out.push_str(&template[i + 1..i + 1 + digits]);
                out.push('}');
                i += 1 + digits;
                copied = i;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&template[copied..]);
    out
}

/// Resolves inbound requests against the stored rule set.
pub struct RedirectEngine<L, E> {
    lookup: L,
    entities: E,
    geo: Option<Arc<dyn GeoResolver>>,
    settings: RedirectSettings,
}

impl<L: RedirectLookup, E: EntityUrlResolver> RedirectEngine<L, E> {
    pub fn new(lookup: L, entities: E, settings: RedirectSettings) -> Self {
        Self {
            lookup,
            entities,
            geo: None,
            settings,
        }
    }

    /// Enable geo rules. Without a resolver they are ignored.
    pub fn with_geo(mut self, geo: Option<Arc<dyn GeoResolver>>) -> Self {
        self.geo = geo;
        self
    }

    pub async fn resolve(&self, request: &InboundRequest) -> Decision {
        let Some(matched) = self.find_match(request).await else {
            return Decision::Passthrough;
        };
        let rule = &matched.rule;

        if !rule.redirect_type.is_redirect() {
            tracing::debug!(
                redirect_id = rule.id,
                status = rule.redirect_type.code(),
                "Terminal rule matched"
            );
            return Decision::Terminal {
                status: rule.redirect_type.code(),
                redirect_id: rule.id,
            };
        }

        let location = match self.geo_destination(&matched, request).await {
            Some(location) => location,
            None => match self.destination_url(&rule.destination, &matched).await {
                Some(location) => location,
                None => {
                    tracing::warn!(redirect_id = rule.id, "Redirect destination did not resolve");
                    return Decision::Passthrough;
                }
            },
        };

        if url::is_same_target(&location, &request.url, &self.settings.home_url) {
            tracing::debug!(redirect_id = rule.id, url = %request.url, "Skipping self-redirect");
            return Decision::Passthrough;
        }

        tracing::debug!(
            redirect_id = rule.id,
            url = %request.url,
            location = %location,
            "Redirect matched"
        );
        Decision::Redirect {
            location,
            status: rule.redirect_type.code(),
            redirect_id: rule.id,
        }
    }

    async fn find_match(&self, request: &InboundRequest) -> Option<Matched> {
        let path = url::normalize_path(&request.url, &self.settings.home_url);

        match self.lookup.find_by_path(&path).await {
            Ok(candidates) => {
                if let Some(rule) = pick_plain(candidates, &request.query_params) {
                    return Some(Matched {
                        rule,
                        captures: None,
                    });
                }
            }
            Err(e) => tracing::warn!(error = %e, path = %path, "Plain redirect lookup failed"),
        }

        let candidates = match self.lookup.find_regex_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Regex redirect lookup failed");
                return None;
            }
        };

        let subject = url::regex_subject(&request.url, &self.settings.home_url);
        for rule in candidates {
            let pattern = match rule.compile_pattern() {
                Ok(pattern) => pattern,
                Err(e) => {
                    tracing::warn!(redirect_id = rule.id, error = %e, "Skipping invalid regex rule");
                    continue;
                }
            };
            if pattern.is_match(&subject) {
                return Some(Matched {
                    rule,
                    captures: Some((pattern, subject)),
                });
            }
        }
        None
    }

    /// First geo rule matching the client's country, if any resolves.
    async fn geo_destination(&self, matched: &Matched, request: &InboundRequest) -> Option<String> {
        let rules = &matched.rule.rules;
        if rules.is_empty() {
            return None;
        }
        let geo = self.geo.as_ref()?;
        let country = request.client_ip.and_then(|ip| geo.resolve_country(ip));
        if country.is_none() {
            tracing::debug!(redirect_id = matched.rule.id, "Client country unknown; no geo override");
            return None;
        }

        for (index, rule) in rules.iter().enumerate() {
            if !rule.matches_country(country.as_deref()) {
                continue;
            }
            match self.destination_url(&rule.url, matched).await {
                Some(location) => return Some(location),
                None => tracing::warn!(
                    redirect_id = matched.rule.id,
                    geo_rule = index + 1,
                    "Geo destination did not resolve; skipping"
                ),
            }
        }
        None
    }

    async fn destination_url(&self, destination: &Destination, matched: &Matched) -> Option<String> {
        let raw = match destination {
            Destination::None => return None,
            Destination::Url(template) => matched.expand(template),
            Destination::Entity(entity) => self.entities.entity_url(entity).await?,
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(self.absolute(raw))
    }

    /// Prefix site-relative locations with the home URL.
    fn absolute(&self, location: &str) -> String {
        if url::is_absolute(location) {
            return location.to_string();
        }
        format!(
            "{}/{}",
            self.settings.home_url.trim_end_matches('/'),
            location.trim_start_matches('/')
        )
    }
}

/// Tie-break among plain rules sharing a path.
///
/// A lone candidate always wins. Otherwise the first rule whose source query
/// parameters equal the request's (as sets) wins, and no match falls through.
fn pick_plain(mut candidates: Vec<Redirect>, query: &QueryParams) -> Option<Redirect> {
    if candidates.len() == 1 {
        return candidates.pop();
    }
    candidates
        .into_iter()
        .find(|rule| rule.source_query() == *query)
}
