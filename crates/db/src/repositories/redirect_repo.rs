//! Repository for the `redirects` table.
//!
//! Reads come back as core [`Redirect`] values. A row that fails to decode
//! is reported as [`sqlx::Error::Decode`].

use sqlx::{PgConnection, PgPool};
use waypost_core::redirect::{Redirect, REGEX_PATH};
use waypost_core::types::DbId;

use crate::models::redirect::{RedirectRow, RedirectValues};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, title, source, path, destination, redirect_type, options, rules, \
    created_at, updated_at";

/// Non-redirect statuses never keep a destination or geo rules, whatever
/// the caller binds. `$4` is the destination, `$5` the type, `$7` the rules.
const DESTINATION_VALUE: &str = "CASE WHEN $5 IN (410, 451) THEN '' ELSE $4 END";
const RULES_VALUE: &str = "CASE WHEN $5 IN (410, 451) THEN '[]' ELSE $7 END";

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

fn inflate(row: RedirectRow) -> Result<Redirect, sqlx::Error> {
    row.inflate().map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn inflate_all(rows: Vec<RedirectRow>) -> Result<Vec<Redirect>, sqlx::Error> {
    rows.into_iter().map(inflate).collect()
}

/// Provides CRUD and lookup operations for redirect rules.
pub struct RedirectRepo;

impl RedirectRepo {
    /// Insert (`id == 0`) or update a rule, returning the stored row.
    ///
    /// Updating an id that does not exist yields [`sqlx::Error::RowNotFound`].
    pub async fn save(pool: &PgPool, redirect: &Redirect) -> Result<Redirect, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::save_with(&mut conn, redirect).await
    }

    async fn save_with(
        conn: &mut PgConnection,
        redirect: &Redirect,
    ) -> Result<Redirect, sqlx::Error> {
        let values = RedirectValues::deflate(redirect);
        let query = if redirect.id == 0 {
            format!(
                "INSERT INTO redirects \
                    (title, source, path, destination, redirect_type, options, rules) \
                 VALUES ($1, $2, $3, {DESTINATION_VALUE}, $5, $6, {RULES_VALUE}) \
                 RETURNING {COLUMNS}"
            )
        } else {
            format!(
                "UPDATE redirects SET \
                    title = $1, source = $2, path = $3, destination = {DESTINATION_VALUE}, \
                    redirect_type = $5, options = $6, rules = {RULES_VALUE} \
                 WHERE id = $8 \
                 RETURNING {COLUMNS}"
            )
        };

        let mut q = sqlx::query_as::<_, RedirectRow>(&query)
            .bind(&values.title)
            .bind(&values.source)
            .bind(&values.path)
            .bind(&values.destination)
            .bind(values.redirect_type)
            .bind(&values.options)
            .bind(&values.rules);
        if redirect.id != 0 {
            q = q.bind(redirect.id);
        }
        let row = q.fetch_one(&mut *conn).await?;
        inflate(row)
    }

    /// Find a single rule by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Redirect>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM redirects WHERE id = $1");
        sqlx::query_as::<_, RedirectRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(inflate)
            .transpose()
    }

    /// One page of rules in insertion order.
    pub async fn list(
        pool: &PgPool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Redirect>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM redirects ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, RedirectRow>(&query)
            .bind(limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
            .bind(offset.unwrap_or(0).max(0))
            .fetch_all(pool)
            .await?;
        inflate_all(rows)
    }

    /// Every rule in insertion order.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Redirect>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM redirects ORDER BY id");
        let rows = sqlx::query_as::<_, RedirectRow>(&query)
            .fetch_all(pool)
            .await?;
        inflate_all(rows)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM redirects")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Plain rules stored under a canonical path, in insertion order.
    pub async fn find_by_path(pool: &PgPool, path: &str) -> Result<Vec<Redirect>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM redirects WHERE path = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, RedirectRow>(&query)
            .bind(path)
            .fetch_all(pool)
            .await?;
        inflate_all(rows)
    }

    /// All regex rules, in insertion order.
    pub async fn find_regex_candidates(pool: &PgPool) -> Result<Vec<Redirect>, sqlx::Error> {
        Self::find_by_path(pool, REGEX_PATH).await
    }

    /// Save many rules within one transaction.
    ///
    /// Rules with `id == 0` are inserted, the rest updated by id. Any failure
    /// (including an unknown id) rolls back every row.
    pub async fn bulk_upsert(
        pool: &PgPool,
        redirects: &[Redirect],
    ) -> Result<Vec<Redirect>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut results = Vec::with_capacity(redirects.len());

        for redirect in redirects {
            results.push(Self::save_with(&mut tx, redirect).await?);
        }

        tx.commit().await?;
        Ok(results)
    }

    /// Delete the given rules, or every rule when `ids` is `None`.
    ///
    /// Returns the number of rows removed.
    pub async fn delete(pool: &PgPool, ids: Option<&[DbId]>) -> Result<u64, sqlx::Error> {
        let result = match ids {
            None => sqlx::query("DELETE FROM redirects").execute(pool).await?,
            Some([]) => return Ok(0),
            Some(ids) => {
                sqlx::query("DELETE FROM redirects WHERE id = ANY($1)")
                    .bind(ids)
                    .execute(pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}
