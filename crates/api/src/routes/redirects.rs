//! Route definitions for redirect rule management.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::redirects;
use crate::state::AppState;

/// Redirect routes mounted at `/redirects`.
///
/// ```text
/// GET    /            -> list_redirects
/// POST   /            -> create_redirect
/// DELETE /            -> delete_redirects
/// GET    /{id}        -> get_redirect
/// PUT    /{id}        -> update_redirect
/// POST   /bulk        -> bulk_update
/// POST   /import      -> import_redirects
/// GET    /export      -> export_redirects
/// GET    /resolve     -> resolve_preview
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(redirects::list_redirects)
                .post(redirects::create_redirect)
                .delete(redirects::delete_redirects),
        )
        .route("/bulk", post(redirects::bulk_update))
        .route("/import", post(redirects::import_redirects))
        .route("/export", get(redirects::export_redirects))
        .route("/resolve", get(redirects::resolve_preview))
        .route(
            "/{id}",
            get(redirects::get_redirect).put(redirects::update_redirect),
        )
}
