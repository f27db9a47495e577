//! Repository for the `permalinks` table.

use sqlx::PgPool;
use waypost_core::types::DbId;

use crate::models::permalink::{Permalink, UpsertPermalink};

/// Column list for the `permalinks` table.
const COLUMNS: &str = "id, entity_type, entity_id, url, created_at, updated_at";

/// Provides data access for entity permalinks.
pub struct PermalinkRepo;

impl PermalinkRepo {
    /// Insert or replace the permalink of one entity.
    pub async fn upsert(pool: &PgPool, body: &UpsertPermalink) -> Result<Permalink, sqlx::Error> {
        let query = format!(
            "INSERT INTO permalinks (entity_type, entity_id, url) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (entity_type, entity_id) \
             DO UPDATE SET url = EXCLUDED.url \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Permalink>(&query)
            .bind(&body.entity_type)
            .bind(body.entity_id)
            .bind(&body.url)
            .fetch_one(pool)
            .await
    }

    /// Current URL of an entity, if it has one.
    pub async fn find_url(
        pool: &PgPool,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT url FROM permalinks WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(url,)| url))
    }
}
