pub mod health;
pub mod redirects;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /redirects                  list, create, delete (ids or all)
/// /redirects/{id}             get, update
/// /redirects/bulk             bulk update (POST)
/// /redirects/import           import CSV / JSON (multipart POST)
/// /redirects/export           export JSON (GET)
/// /redirects/resolve          preview a URL's decision (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/redirects", redirects::router())
}
