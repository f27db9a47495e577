//! Adapters exposing the repositories to the core resolution engine.

use waypost_core::error::CoreError;
use waypost_core::redirect::{EntityRef, Redirect};
use waypost_core::resolution::{EntityUrlResolver, RedirectLookup};

use crate::repositories::{PermalinkRepo, RedirectRepo};
use crate::DbPool;

/// [`RedirectLookup`] backed by the `redirects` table. Every call hits the
/// database; there is no cache to invalidate.
#[derive(Clone)]
pub struct PgRedirectStore {
    pool: DbPool,
}

impl PgRedirectStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl RedirectLookup for PgRedirectStore {
    async fn find_by_path(&self, path: &str) -> Result<Vec<Redirect>, CoreError> {
        RedirectRepo::find_by_path(&self.pool, path)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    async fn find_regex_candidates(&self) -> Result<Vec<Redirect>, CoreError> {
        RedirectRepo::find_regex_candidates(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }
}

/// [`EntityUrlResolver`] backed by the `permalinks` table.
#[derive(Clone)]
pub struct PgPermalinkResolver {
    pool: DbPool,
}

impl PgPermalinkResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EntityUrlResolver for PgPermalinkResolver {
    async fn entity_url(&self, entity: &EntityRef) -> Option<String> {
        match PermalinkRepo::find_url(&self.pool, &entity.kind, entity.id).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(
                    entity_type = %entity.kind,
                    entity_id = entity.id,
                    error = %e,
                    "Permalink lookup failed"
                );
                None
            }
        }
    }
}
