//! HTTP-level tests for redirect management and delivery.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, build_test_app, create, delete_json, get, post_file, post_json, put_json,
};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_returns_normalized_rule(pool: PgPool) {
    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects",
        json!({
            "source": "https://example.com/Old-Page/",
            "destination": "https://example.com/New-Page",
            "type": 308
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let data = &json["data"];
    assert!(data["id"].as_i64().unwrap() > 0);
    assert_eq!(data["path"], "/old-page");
    assert_eq!(data["destination"], "/New-Page");
    assert_eq!(data["type"], 308);
    assert_eq!(data["warnings"], json!([]));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_uses_configured_default_type(pool: PgPool) {
    let id = create(&pool, json!({"source": "/a", "destination": "/b"})).await;

    let response = get(build_test_app(pool), &format!("/api/v1/redirects/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["type"], 301);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn gone_rule_drops_destination(pool: PgPool) {
    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects",
        json!({"source": "/retired", "destination": "/ignored", "type": 410}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["type"], 410);
    assert!(json["data"]["destination"].is_null());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn get_missing_redirect_returns_404(pool: PgPool) {
    let response = get(build_test_app(pool), "/api/v1/redirects/9999").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn update_replaces_rule(pool: PgPool) {
    let id = create(&pool, json!({"source": "/a", "destination": "/b"})).await;

    let response = put_json(
        build_test_app(pool.clone()),
        &format!("/api/v1/redirects/{id}"),
        json!({"source": "/a", "destination": "/c", "type": 307, "title": "Moved"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], id);
    assert_eq!(json["data"]["destination"], "/c");
    assert_eq!(json["data"]["title"], "Moved");

    let list = body_json(get(build_test_app(pool), "/api/v1/redirects").await).await;
    assert_eq!(list["data"]["total"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn update_missing_redirect_returns_404(pool: PgPool) {
    let response = put_json(
        build_test_app(pool),
        "/api/v1/redirects/9999",
        json!({"source": "/a", "destination": "/b"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_paginates(pool: PgPool) {
    for i in 0..3 {
        create(
            &pool,
            json!({"source": format!("/p{i}"), "destination": "/home"}),
        )
        .await;
    }

    let response = get(build_test_app(pool), "/api/v1/redirects?limit=2&offset=1").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["total"], 3);
    let items = json["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["source"], "/p1");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_by_ids_and_all(pool: PgPool) {
    let a = create(&pool, json!({"source": "/a", "destination": "/x"})).await;
    create(&pool, json!({"source": "/b", "destination": "/x"})).await;
    create(&pool, json!({"source": "/c", "destination": "/x"})).await;

    let response = delete_json(
        build_test_app(pool.clone()),
        "/api/v1/redirects",
        json!({"ids": [a]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["deleted"], 1);

    let response = delete_json(
        build_test_app(pool.clone()),
        "/api/v1/redirects",
        json!({"all": true}),
    )
    .await;
    assert_eq!(body_json(response).await["data"]["deleted"], 2);

    let list = body_json(get(build_test_app(pool), "/api/v1/redirects").await).await;
    assert_eq!(list["data"]["total"], 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_without_selector_is_rejected(pool: PgPool) {
    let response = delete_json(build_test_app(pool), "/api/v1/redirects", json!({})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_source_returns_409(pool: PgPool) {
    create(&pool, json!({"source": "/dup", "destination": "/x"})).await;

    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects",
        json!({"source": "/DUP/", "destination": "/y"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn chain_is_rejected_with_path(pool: PgPool) {
    create(&pool, json!({"source": "/b", "destination": "/a"})).await;

    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects",
        json!({"source": "/a", "destination": "/b"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Redirect chain detected"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_regex_is_rejected(pool: PgPool) {
    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects",
        json!({"source": "blog/(\\d+", "destination": "/x", "options": ["regex"]}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn overlapping_geo_rules_are_saved_with_warning(pool: PgPool) {
    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects",
        json!({
            "source": "/shop",
            "destination": "/shop-intl",
            "rules": [
                {"indicate": 0, "countries": ["DE", "AT"], "url": "/shop-dach"},
                {"indicate": 0, "countries": ["DE"], "url": "/shop-de"}
            ]
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["warnings"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Bulk
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn bulk_update_changes_every_selected_rule(pool: PgPool) {
    let a = create(&pool, json!({"source": "/a", "destination": "/x"})).await;
    let b = create(&pool, json!({"source": "/b", "destination": "/y"})).await;

    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects/bulk",
        json!({"ids": [a, b], "changes": {"type": 410}}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    for id in [a, b] {
        let item = &json["data"][id.to_string()];
        assert_eq!(item["type"], 410);
        assert!(item["destination"].is_null());
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn bulk_update_is_all_or_nothing(pool: PgPool) {
    let mut ids = Vec::new();
    for i in 1..=5 {
        ids.push(
            create(
                &pool,
                json!({"source": format!("/s{i}"), "destination": format!("/d{i}")}),
            )
            .await,
        );
    }
    create(&pool, json!({"source": "/target", "destination": "/s3"})).await;

    let response = post_json(
        build_test_app(pool.clone()),
        "/api/v1/redirects/bulk",
        json!({"ids": ids, "changes": {"destination": "/target"}}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with(&format!("Redirect {}:", ids[2])));

    for (i, id) in ids.iter().enumerate() {
        let json = body_json(get(build_test_app(pool.clone()), &format!("/api/v1/redirects/{id}")).await).await;
        assert_eq!(json["data"]["destination"], format!("/d{}", i + 1));
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn bulk_update_unknown_id_returns_404(pool: PgPool) {
    let a = create(&pool, json!({"source": "/a", "destination": "/x"})).await;

    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects/bulk",
        json!({"ids": [a, 9999], "changes": {"title": "t"}}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Import / export
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn import_csv_creates_rules(pool: PgPool) {
    let csv = b"source,destination,type,regex\n/old,/new,301,0\n\"^blog/(\\d+)$\",/posts/$1,302,1\n";

    let response = post_file(
        build_test_app(pool.clone()),
        "/api/v1/redirects/import",
        "redirects.csv",
        "text/csv",
        csv,
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["count"], 2);
    assert_eq!(json["data"]["items"][1]["path"], "regex");

    let list = body_json(get(build_test_app(pool), "/api/v1/redirects").await).await;
    assert_eq!(list["data"]["total"], 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn import_with_bad_row_writes_nothing(pool: PgPool) {
    let body = json!([
        {"source": "/one", "destination": "/x"},
        {"source": "/one", "destination": "/y"}
    ]);

    let response = post_file(
        build_test_app(pool.clone()),
        "/api/v1/redirects/import",
        "redirects.json",
        "application/json",
        body.to_string().as_bytes(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .starts_with("Row 2:"));

    let list = body_json(get(build_test_app(pool), "/api/v1/redirects").await).await;
    assert_eq!(list["data"]["total"], 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn import_rejects_unknown_type(pool: PgPool) {
    let response = post_file(
        build_test_app(pool),
        "/api/v1/redirects/import",
        "redirects.xml",
        "application/xml",
        b"<redirects/>",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn import_rejects_oversized_file(pool: PgPool) {
    let mut csv = Vec::new();
    while csv.len() <= waypost_core::transfer::MAX_IMPORT_BYTES {
        csv.extend_from_slice(b"/a,/b,301,0\n");
    }

    let response = post_file(
        build_test_app(pool),
        "/api/v1/redirects/import",
        "big.csv",
        "text/csv",
        &csv,
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("too large"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn import_without_file_field_is_rejected(pool: PgPool) {
    let response = post_json(
        build_test_app(pool),
        "/api/v1/redirects/import",
        json!({}),
    )
    .await;

    assert!(response.status().is_client_error());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn export_returns_bare_array_without_ids(pool: PgPool) {
    create(&pool, json!({"source": "/a", "destination": "/b", "title": "A"})).await;

    let response = get(build_test_app(pool), "/api/v1/redirects/export").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("redirects.json"));
    let json = body_json(response).await;
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "A");
    assert!(items[0].get("id").is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn export_feeds_back_into_import(pool: PgPool) {
    create(&pool, json!({"source": "/a", "destination": "/b"})).await;
    let exported = body_json(get(build_test_app(pool.clone()), "/api/v1/redirects/export").await).await;

    delete_json(build_test_app(pool.clone()), "/api/v1/redirects", json!({"all": true})).await;

    let response = post_file(
        build_test_app(pool),
        "/api/v1/redirects/import",
        "redirects.json",
        "application/json",
        exported.to_string().as_bytes(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["data"]["items"][0]["source"], "/a");
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn resolve_preview_reports_decision(pool: PgPool) {
    create(&pool, json!({"source": "/old", "destination": "/new", "type": 301})).await;

    let response = get(build_test_app(pool), "/api/v1/redirects/resolve?url=%2FOld%2F").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["action"], "redirect");
    assert_eq!(json["data"]["location"], "https://example.com/new");
    assert_eq!(json["data"]["status"], 301);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn resolve_preview_rejects_bad_ip(pool: PgPool) {
    let response = get(
        build_test_app(pool),
        "/api/v1/redirects/resolve?url=%2Fold&ip=not-an-ip",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivery_redirects_matching_request(pool: PgPool) {
    create(&pool, json!({"source": "/old", "destination": "/new", "type": 301})).await;

    let response = get(build_test_app(pool), "/old").await;

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()["location"], "https://example.com/new");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivery_expands_regex_captures(pool: PgPool) {
    create(
        &pool,
        json!({
            "source": "^blog/(\\d+)$",
            "destination": "/posts/$1",
            "type": 302,
            "options": ["regex"]
        }),
    )
    .await;

    let response = get(build_test_app(pool), "/blog/42").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "https://example.com/posts/42");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivery_serves_gone_without_location(pool: PgPool) {
    create(&pool, json!({"source": "/retired", "type": 410})).await;

    let response = get(build_test_app(pool), "/retired").await;

    assert_eq!(response.status(), StatusCode::GONE);
    assert!(response.headers().get("location").is_none());
    assert_eq!(body_json(response).await["code"], "GONE");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivery_passes_through_unknown_urls(pool: PgPool) {
    create(&pool, json!({"source": "/old", "destination": "/new"})).await;

    let response = get(build_test_app(pool), "/something-else").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get("location").is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivery_ignores_non_get_methods(pool: PgPool) {
    create(&pool, json!({"source": "/old", "destination": "/new"})).await;

    let response = post_json(build_test_app(pool), "/old", json!({})).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivery_applies_geo_override_from_trusted_forwarded_ip(pool: PgPool) {
    use std::net::IpAddr;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use waypost_core::geo::GeoResolver;

    struct GermanyOnly;

    impl GeoResolver for GermanyOnly {
        fn resolve_country(&self, ip: IpAddr) -> Option<String> {
            (ip.to_string() == "203.0.113.9").then(|| "DE".to_string())
        }
    }

    create(
        &pool,
        json!({
            "source": "/shop",
            "destination": "/shop-intl",
            "rules": [{"indicate": 0, "countries": ["DE"], "url": "/shop-de"}]
        }),
    )
    .await;

    let geo: Arc<dyn GeoResolver> = Arc::new(GermanyOnly);
    let request = |ip: &str| {
        Request::builder()
            .uri("/shop")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let trusted = || common::ServerConfig {
        trust_proxy_headers: true,
        ..common::test_config()
    };

    let app = common::build_test_app_with(pool.clone(), trusted(), Some(geo.clone()));
    let response = common::send(app, request("203.0.113.9")).await;
    assert_eq!(response.headers()["location"], "https://example.com/shop-de");

    let app = common::build_test_app_with(pool.clone(), trusted(), Some(geo.clone()));
    let response = common::send(app, request("198.51.100.1")).await;
    assert_eq!(response.headers()["location"], "https://example.com/shop-intl");

    // Without a trusted proxy the header is ignored.
    let app = common::build_test_app_with_geo(pool, Some(geo));
    let response = common::send(app, request("203.0.113.9")).await;
    assert_eq!(response.headers()["location"], "https://example.com/shop-intl");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivery_matches_requests_under_subdirectory_home(pool: PgPool) {
    let mut config = common::test_config();
    config.redirects.home_url = "https://example.com/blog".into();

    let response = post_json(
        common::build_test_app_with(pool.clone(), config.clone(), None),
        "/api/v1/redirects",
        json!({"source": "https://example.com/blog/old", "destination": "/new"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["data"]["path"], "/old");

    let response = get(common::build_test_app_with(pool, config, None), "/blog/old").await;

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()["location"], "https://example.com/blog/new");
}
