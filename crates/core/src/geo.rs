//! Geo-conditional destinations and the country lookup behind them.
//!
//! A rule's geo rules are evaluated in order against the client's country;
//! the first match overrides the destination. Countries come from a
//! [`GeoResolver`]; [`GeoIpDatabase`] is the bundled implementation backed by
//! per-country CIDR lists on disk.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::redirect::{validate_entity, Destination};

// ---------------------------------------------------------------------------
// Geo rules
// ---------------------------------------------------------------------------

/// Whether a geo rule matches clients inside or outside its country list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GeoIndicate {
    /// `0`: the client IS from one of the countries.
    Include,
    /// `1`: the client is NOT from any of the countries.
    Exclude,
}

impl TryFrom<u8> for GeoIndicate {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Include),
            1 => Ok(Self::Exclude),
            _ => Err(format!("Invalid geo indicate '{value}'. Must be 0 or 1")),
        }
    }
}

impl From<GeoIndicate> for u8 {
    fn from(value: GeoIndicate) -> Self {
        match value {
            GeoIndicate::Include => 0,
            GeoIndicate::Exclude => 1,
        }
    }
}

/// A per-rule destination override keyed on the client's country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRule {
    pub indicate: GeoIndicate,
    /// ISO 3166-1 alpha-2 codes, stored uppercase.
    pub countries: Vec<String>,
    pub url: Destination,
}

impl GeoRule {
    /// Uppercase and dedupe country codes; canonicalize the URL.
    pub fn canonical(self, home_url: &str) -> Self {
        let mut countries: Vec<String> = Vec::with_capacity(self.countries.len());
        for code in self.countries {
            let code = code.trim().to_ascii_uppercase();
            if !code.is_empty() && !countries.contains(&code) {
                countries.push(code);
            }
        }
        Self {
            indicate: self.indicate,
            countries,
            url: self.url.canonical(home_url),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.countries.is_empty() {
            return Err("at least one country is required".into());
        }
        if let Some(bad) = self
            .countries
            .iter()
            .find(|c| c.len() != 2 || !c.bytes().all(|b| b.is_ascii_uppercase()))
        {
            return Err(format!("'{bad}' is not an ISO 3166-1 alpha-2 country code"));
        }
        match &self.url {
            Destination::None => Err("a destination URL is required".into()),
            Destination::Url(url) if url.trim().is_empty() => {
                Err("a destination URL is required".into())
            }
            Destination::Entity(entity) => validate_entity(entity).map_err(|e| e.to_string()),
            Destination::Url(_) => Ok(()),
        }
    }

    /// Whether this rule applies to a client from `country`.
    ///
    /// An unknown country matches nothing, so the base destination is used.
    pub fn matches_country(&self, country: Option<&str>) -> bool {
        let Some(country) = country else {
            return false;
        };
        let listed = self
            .countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country));
        match self.indicate {
            GeoIndicate::Include => listed,
            GeoIndicate::Exclude => !listed,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Maps a client IP to an ISO country code.
///
/// Lookups must not fail the request: implementations return `None` when the
/// address is unknown or the backing data is unavailable.
pub trait GeoResolver: Send + Sync {
    fn resolve_country(&self, ip: IpAddr) -> Option<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum GeoIpError {
    #[error("Failed to read geo database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse geo database {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One country file: `{ "code": "us", "ipv4_ranges": [...], "ipv6_ranges": [...] }`.
#[derive(Debug, Deserialize)]
struct CountryData {
    code: String,
    #[serde(default)]
    ipv4_ranges: Vec<IpNet>,
    #[serde(default)]
    ipv6_ranges: Vec<IpNet>,
}

/// In-memory CIDR → country table.
///
/// The most specific (longest prefix) network containing an address wins.
#[derive(Debug, Default)]
pub struct GeoIpDatabase {
    networks: Vec<(IpNet, String)>,
}

impl GeoIpDatabase {
    /// Build from explicit `(cidr, country)` pairs.
    pub fn from_ranges<I, S>(ranges: I) -> Self
    where
        I: IntoIterator<Item = (IpNet, S)>,
        S: Into<String>,
    {
        let mut networks: Vec<(IpNet, String)> = ranges
            .into_iter()
            .map(|(net, code)| (net.trunc(), code.into().to_ascii_uppercase()))
            .collect();
        networks.sort_by(|a, b| b.0.prefix_len().cmp(&a.0.prefix_len()));
        Self { networks }
    }

    /// Load every `*.json` country file in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, GeoIpError> {
        let entries = fs::read_dir(dir).map_err(|source| GeoIpError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut ranges = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| GeoIpError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).map_err(|source| GeoIpError::Io {
                path: path.clone(),
                source,
            })?;
            let data: CountryData =
                serde_json::from_str(&raw).map_err(|source| GeoIpError::Parse {
                    path: path.clone(),
                    source,
                })?;
            for net in data.ipv4_ranges.into_iter().chain(data.ipv6_ranges) {
                ranges.push((net, data.code.clone()));
            }
        }

        let db = Self::from_ranges(ranges);
        tracing::info!(dir = %dir.display(), networks = db.len(), "Geo database loaded");
        Ok(db)
    }

    /// Load the database only when a license key is configured.
    ///
    /// Without a license geo rules are not evaluated at all.
    pub fn load_licensed(
        license_key: Option<&str>,
        dir: &Path,
    ) -> Result<Option<Self>, GeoIpError> {
        match license_key.map(str::trim) {
            Some(key) if !key.is_empty() => Self::load_dir(dir).map(Some),
            _ => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Number of networks per country, for diagnostics.
    pub fn country_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for (_, code) in &self.networks {
            *counts.entry(code.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

impl GeoResolver for GeoIpDatabase {
    fn resolve_country(&self, ip: IpAddr) -> Option<String> {
        self.networks
            .iter()
            .find(|(net, _)| net.contains(&ip))
            .map(|(_, code)| code.clone())
    }
}
