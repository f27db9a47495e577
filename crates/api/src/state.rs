use std::sync::Arc;

use waypost_core::geo::GeoResolver;
use waypost_core::resolution::RedirectEngine;
use waypost_db::store::{PgPermalinkResolver, PgRedirectStore};

use crate::config::ServerConfig;

/// The engine as wired to Postgres.
pub type PgRedirectEngine = RedirectEngine<PgRedirectStore, PgPermalinkResolver>;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: waypost_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Country lookup for geo rules; `None` when unlicensed.
    pub geo: Option<Arc<dyn GeoResolver>>,
}

impl AppState {
    /// A resolution engine over the current pool. Cheap: nothing is cached.
    pub fn engine(&self) -> PgRedirectEngine {
        RedirectEngine::new(
            PgRedirectStore::new(self.pool.clone()),
            PgPermalinkResolver::new(self.pool.clone()),
            self.config.redirects.settings(),
        )
        .with_geo(self.geo.clone())
    }
}
