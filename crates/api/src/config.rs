use std::path::PathBuf;

use waypost_core::redirect::{RedirectSettings, RedirectType, DEFAULT_REDIRECT_TYPE};
use waypost_core::transfer::MAX_IMPORT_BYTES;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Admin UI origins allowed to call `/api/v1`; empty disables CORS.
    pub cors_origins: Vec<String>,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`. Only safe
    /// behind a reverse proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Redirect engine settings.
    pub redirects: RedirectConfig,
}

/// Site and rule-engine settings.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    /// Absolute home URL of the site the redirects belong to.
    pub home_url: String,
    /// Status code for rules saved without one.
    pub default_type: RedirectType,
    /// Geo rules are only evaluated when a license key is configured.
    pub geoip_license_key: Option<String>,
    /// Directory of per-country CIDR files.
    pub geoip_dir: PathBuf,
    /// Upload limit for `POST /redirects/import`.
    pub import_max_bytes: usize,
}

impl RedirectConfig {
    pub fn settings(&self) -> RedirectSettings {
        RedirectSettings {
            home_url: self.home_url.clone(),
            default_type: self.default_type,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `3000`                     |
    /// | `CORS_ORIGINS`          | empty                      |
    /// | `TRUST_PROXY_HEADERS`   | `false`                    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                       |
    /// | `HOME_URL`              | `http://localhost:3000`    |
    /// | `DEFAULT_REDIRECT_TYPE` | `302`                      |
    /// | `GEOIP_LICENSE_KEY`     | unset (geo rules disabled) |
    /// | `GEOIP_DIR`             | `data/geoip`               |
    /// | `IMPORT_MAX_BYTES`      | `1048576`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let trust_proxy_headers = std::env::var("TRUST_PROXY_HEADERS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let redirects = RedirectConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            trust_proxy_headers,
            request_timeout_secs,
            shutdown_timeout_secs,
            redirects,
        }
    }
}

impl RedirectConfig {
    pub fn from_env() -> Self {
        let home_url = std::env::var("HOME_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        let default_type = match std::env::var("DEFAULT_REDIRECT_TYPE") {
            Ok(raw) => {
                let code: u16 = raw
                    .trim()
                    .parse()
                    .expect("DEFAULT_REDIRECT_TYPE must be a status code");
                RedirectType::from_code(code)
                    .unwrap_or_else(|e| panic!("DEFAULT_REDIRECT_TYPE: {e}"))
            }
            Err(_) => DEFAULT_REDIRECT_TYPE,
        };

        let geoip_license_key = std::env::var("GEOIP_LICENSE_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let geoip_dir = std::env::var("GEOIP_DIR")
            .unwrap_or_else(|_| "data/geoip".into())
            .into();

        let import_max_bytes: usize = std::env::var("IMPORT_MAX_BYTES")
            .map(|v| v.parse().expect("IMPORT_MAX_BYTES must be a valid usize"))
            .unwrap_or(MAX_IMPORT_BYTES);

        Self {
            home_url,
            default_type,
            geoip_license_key,
            geoip_dir,
            import_max_bytes,
        }
    }
}
