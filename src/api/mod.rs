// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::Request,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    download::UnlockedDownload,
    error::ErrorBody,
    models::{
        AccountId, LedgerAction, LedgerEntry, PricingEntry, Provider, Quote, Reconciliation,
        SpendReceipt, Tenant, TenantId,
    },
    state::AppState,
};

pub mod accounts;
pub mod admin;
pub mod health;
pub mod points;
pub mod session;
pub mod sites;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Local accounts
        .route("/auth/register", post(session::register))
        .route("/auth/login", post(session::login))
        // Caller
        .route("/site", get(points::site))
        .route("/files/info", get(points::file_info))
        .route("/downloads", post(points::download))
        .route("/me", get(accounts::me))
        .route("/me/ledger", get(accounts::my_ledger))
        // Admin
        .route(
            "/admin/pricing",
            get(admin::list_pricing).put(admin::configure_pricing),
        )
        .route("/admin/grants", post(admin::grant))
        .route("/admin/accounts", get(admin::list_accounts))
        .route("/admin/accounts/lookup", get(admin::lookup_account))
        .route(
            "/admin/accounts/{account_id}/balance",
            get(admin::account_balance),
        )
        .route(
            "/admin/accounts/{account_id}/reconcile",
            get(admin::reconcile_account),
        )
        .route("/admin/ledger", get(admin::ledger))
        // Operator
        .route("/sites", get(sites::list_sites).post(sites::create_site))
        .route(
            "/sites/{tenant_id}",
            get(sites::get_site).patch(sites::update_site),
        );

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http",
                method = %request.method(),
                uri = %request.uri(),
                request_id,
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        session::register,
        session::login,
        points::site,
        points::file_info,
        points::download,
        accounts::me,
        accounts::my_ledger,
        admin::list_pricing,
        admin::configure_pricing,
        admin::grant,
        admin::list_accounts,
        admin::lookup_account,
        admin::account_balance,
        admin::reconcile_account,
        admin::ledger,
        sites::list_sites,
        sites::create_site,
        sites::get_site,
        sites::update_site
    ),
    components(
        schemas(
            ErrorBody,
            TenantId,
            AccountId,
            Tenant,
            Provider,
            PricingEntry,
            Quote,
            LedgerAction,
            LedgerEntry,
            SpendReceipt,
            Reconciliation,
            UnlockedDownload,
            points::DownloadRequest,
            session::LocalCredentials,
            session::TokenResponse,
            accounts::AccountView,
            accounts::LedgerResponse,
            admin::PricingRequest,
            admin::PricingListResponse,
            admin::GrantRequest,
            admin::GrantResponse,
            admin::AccountListResponse,
            admin::BalanceResponse,
            sites::CreateSiteRequest,
            sites::UpdateSiteRequest,
            sites::SiteListResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Auth", description = "Local account registration and login"),
        (name = "Points", description = "Site info, prices and paid downloads"),
        (name = "Account", description = "The caller's account and ledger"),
        (name = "Admin", description = "Pricing, grants and ledger queries (site admins)"),
        (name = "Sites", description = "Site management (operators)")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests;
