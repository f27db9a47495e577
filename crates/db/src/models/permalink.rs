//! Entity permalink rows (`permalinks` table).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use waypost_core::types::{DbId, Timestamp};

/// A row from the `permalinks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Permalink {
    pub id: DbId,
    pub entity_type: String,
    pub entity_id: DbId,
    pub url: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating or replacing an entity's permalink.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertPermalink {
    pub entity_type: String,
    pub entity_id: DbId,
    pub url: String,
}
