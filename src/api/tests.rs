// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use super::*;
use crate::auth::{issue_token, TokenClaims};
use crate::download::SignedUrlResolver;
use crate::engine::{EngineSettings, PointEngine};
use crate::models::AccountIdentity;
use crate::state::AuthConfig;
use crate::storage::PointStore;
use crate::tenant::{NewTenant, TenantRegistry};

const SECRET: &[u8] = b"api-test-secret";
const OPERATOR_KEY: &str = "operator-key";
const HOST: &str = "docs.example";

struct Harness {
    state: AppState,
    tenant: Tenant,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(PointStore::open(&dir.path().join("points.redb")).unwrap());
        let registry = Arc::new(TenantRegistry::new(store.clone(), false));
        let tenant = registry
            .create(NewTenant {
                name: "Docs".into(),
                domain: HOST.into(),
                default_cost: Some(5),
            })
            .unwrap();
        let downloads =
            SignedUrlResolver::new("http://files.local/d/", Some(b"link-key".as_slice()), Duration::from_secs(60))
                .unwrap();
        let state = AppState::new(
            PointEngine::new(store, EngineSettings::default()),
            registry,
            Arc::new(downloads),
        )
        .with_auth_config(AuthConfig {
            jwt_secret: Some(Arc::from(SECRET)),
            allow_unsigned: false,
            operator_api_key: Some(Arc::from(OPERATOR_KEY)),
        });
        state
            .engine
            .promote_admin(&tenant, AccountIdentity::local("admin"))
            .await
            .unwrap();
        Self {
            state,
            tenant,
            _dir: dir,
        }
    }

    fn token(&self, username: &str) -> String {
        let claims = TokenClaims::new(
            &AccountIdentity::local(username),
            self.tenant.id,
            Utc::now(),
            Duration::from_secs(600),
        );
        issue_token(SECRET, &claims).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn get(&self, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri).header("Host", HOST);
        if let Some(user) = user {
            builder = builder.header("Authorization", format!("Bearer {}", self.token(user)));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn json(&self, method: &str, uri: &str, user: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", HOST)
            .header("Authorization", format!("Bearer {}", self.token(user)))
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn post_with(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Host", HOST)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn operator(&self, method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri).header("Host", HOST);
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }
}

#[tokio::test]
async fn router_builds_with_all_routes() {
    let harness = Harness::new().await;
    // Ensure the router can be converted into a service without panicking.
    let _ = router(harness.state.clone()).into_make_service();
}

#[tokio::test]
async fn health_reports_database() {
    let harness = Harness::new().await;
    let (status, body) = harness.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"], "ok");
    assert_eq!(body["checks"]["auth"], "ok");
}

#[tokio::test]
async fn responses_carry_request_id() {
    let harness = Harness::new().await;
    let request = Request::builder()
        .uri("/health/live")
        .body(Body::empty())
        .unwrap();
    let response = router(harness.state.clone()).oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let harness = Harness::new().await;
    let (status, body) = harness.get("/api-doc/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/downloads"].is_object());
}

#[tokio::test]
async fn unknown_site_is_not_found() {
    let harness = Harness::new().await;
    let request = Request::builder()
        .uri("/v1/site")
        .header("Host", "elsewhere.example")
        .body(Body::empty())
        .unwrap();
    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "tenant_not_found");

    let (status, body) = harness.get("/v1/site", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domain"], HOST);
}

#[tokio::test]
async fn file_info_uses_site_default_for_unpriced() {
    let harness = Harness::new().await;
    let (status, body) = harness.get("/v1/files/info?resource=/books/rust.pdf", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resource"], "books/rust.pdf");
    assert_eq!(body["file_name"], "rust.pdf");
    assert_eq!(body["cost"], 5);
    assert_eq!(body["priced"], false);
}

#[tokio::test]
async fn download_flow_charges_until_exhausted() {
    let harness = Harness::new().await;

    let (status, _) = harness
        .json("PUT", "/v1/admin/pricing", "admin", json!({"resource": "a.zip", "cost": 30}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, grant) = harness
        .json(
            "POST",
            "/v1/admin/grants",
            "admin",
            json!({"username": "alice", "delta": 100, "description": "welcome"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grant["created"], true);
    assert_eq!(grant["account"]["balance"], 100);
    assert!(grant["account"].get("credential").is_none());

    for expected in [70, 40, 10] {
        let (status, body) = harness
            .json("POST", "/v1/downloads", "alice", json!({"resource": "a.zip"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["new_balance"], expected);
        assert_eq!(body["cost"], 30);
        let url = body["download_url"].as_str().unwrap();
        assert!(url.starts_with("http://files.local/d/a.zip?expires="));
    }

    let (status, body) = harness
        .json("POST", "/v1/downloads", "alice", json!({"resource": "a.zip"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "insufficient_points");

    let (status, me) = harness.get("/v1/me", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["balance"], 10);

    let (status, ledger) = harness.get("/v1/me/ledger", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["count"], 4);
    assert_eq!(ledger["entries"][0]["balance_after"], 10);
    assert_eq!(ledger["entries"][3]["action"], "admin_grant");

    let account_id = me["id"].as_str().unwrap().to_string();
    let (status, report) = harness
        .get(&format!("/v1/admin/accounts/{account_id}/reconcile"), Some("admin"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["consistent"], true);
    assert_eq!(report["ledger_sum"], 10);

    let (status, balance) = harness
        .get(&format!("/v1/admin/accounts/{account_id}/balance"), Some("admin"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["balance"], 10);
}

#[tokio::test]
async fn downloads_require_a_token() {
    let harness = Harness::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/v1/downloads")
        .header("Host", HOST)
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"resource":"a.zip"}"#))
        .unwrap();
    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "missing_auth_header");
}

#[tokio::test]
async fn admin_endpoints_reject_regular_accounts() {
    let harness = Harness::new().await;
    let (status, body) = harness.get("/v1/admin/accounts", Some("mallory")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "insufficient_permissions");
}

#[tokio::test]
async fn admin_queries() {
    let harness = Harness::new().await;
    harness
        .json("POST", "/v1/admin/grants", "admin", json!({"username": "bob", "provider": "github", "delta": 20}))
        .await;

    let (status, found) = harness
        .get("/v1/admin/accounts/lookup?username=bob&provider=github", Some("admin"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["balance"], 20);

    let (status, _) = harness.get("/v1/admin/accounts/lookup?username=bob", Some("admin")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, accounts) = harness.get("/v1/admin/accounts", Some("admin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accounts["total"], 2);

    let (status, ledger) = harness.get("/v1/admin/ledger?limit=10", Some("admin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["count"], 1);

    let (status, body) = harness.get("/v1/admin/ledger?limit=0", Some("admin")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_argument");

    let (status, body) = harness
        .json("PUT", "/v1/admin/pricing", "admin", json!({"resource": "a.zip", "cost": -1}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_argument");

    let (status, body) = harness
        .get(&format!("/v1/admin/accounts/{}/balance", AccountId::new()), Some("admin"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "account_not_found");
}

#[tokio::test]
async fn site_management_requires_operator_key() {
    let harness = Harness::new().await;

    let (status, _) = harness.operator("GET", "/v1/sites", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = harness.operator("GET", "/v1/sites", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, created) = harness
        .operator(
            "POST",
            "/v1/sites",
            Some(OPERATOR_KEY),
            Some(json!({"name": "Media", "domain": "Media.Example:8443"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["domain"], "media.example:8443");

    let (status, body) = harness
        .operator(
            "POST",
            "/v1/sites",
            Some(OPERATOR_KEY),
            Some(json!({"name": "Again", "domain": "media.example:8443"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "tenant_exists");

    let id = created["id"].as_str().unwrap();
    let (status, updated) = harness
        .operator(
            "PATCH",
            &format!("/v1/sites/{id}"),
            Some(OPERATOR_KEY),
            Some(json!({"default_cost": 2})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["default_cost"], 2);
    assert_eq!(updated["name"], "Media");

    let (status, list) = harness.operator("GET", "/v1/sites", Some(OPERATOR_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 2);
}

#[tokio::test]
async fn local_account_registers_logs_in_and_downloads() {
    let harness = Harness::new().await;
    let credentials = json!({"username": "ann@example.com", "password": "hunter2hunter2"});

    let (status, registered) = harness.post_with("/v1/auth/register", None, credentials.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(registered["token_type"], "Bearer");
    assert_eq!(registered["account"]["username"], "ann@example.com");
    assert!(registered["account"].get("credential").is_none());
    let token = registered["token"].as_str().unwrap().to_string();

    let (status, body) = harness.post_with("/v1/auth/register", None, credentials.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "account_exists");

    let (status, _) = harness
        .json(
            "POST",
            "/v1/admin/grants",
            "admin",
            json!({"username": "ann@example.com", "delta": 20}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = harness
        .post_with("/v1/downloads", Some(&token), json!({"resource": "books/a.pdf"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], 15);

    let (status, logged_in) = harness.post_with("/v1/auth/login", None, credentials).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logged_in["account"]["balance"], 15);

    for wrong in [
        json!({"username": "ann@example.com", "password": "not-the-password"}),
        json!({"username": "nobody@example.com", "password": "hunter2hunter2"}),
        json!({"username": "admin", "password": "hunter2hunter2"}),
    ] {
        let (status, body) = harness.post_with("/v1/auth/login", None, wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "invalid_credentials");
    }

    let (status, body) = harness
        .post_with("/v1/auth/register", None, json!({"username": "bo", "password": "short"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_argument");
}

#[tokio::test]
async fn local_login_is_disabled_without_a_token_secret() {
    let mut harness = Harness::new().await;
    harness.state = harness.state.clone().with_auth_config(AuthConfig::default());
    let (status, body) = harness
        .post_with(
            "/v1/auth/register",
            None,
            json!({"username": "ann@example.com", "password": "hunter2hunter2"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "login_disabled");
}

#[tokio::test]
async fn unlinkable_download_is_refused_without_charge() {
    let harness = Harness::new().await;
    harness
        .json(
            "POST",
            "/v1/admin/grants",
            "admin",
            json!({"username": "carl", "delta": 50}),
        )
        .await;

    let (status, body) = harness
        .json("POST", "/v1/downloads", "carl", json!({"resource": "docs/../secret.zip"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_argument");

    let (_, me) = harness.get("/v1/me", Some("carl")).await;
    assert_eq!(me["balance"], 50);
}
