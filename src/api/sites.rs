// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator endpoints for site management, guarded by `X-API-Key`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::OperatorKey,
    error::ApiError,
    models::{Tenant, TenantId},
    state::AppState,
    tenant::{NewTenant, TenantUpdate},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSiteRequest {
    pub name: String,
    /// Routing domain, port included when not default (e.g. `localhost:8080`).
    pub domain: String,
    /// Cost of unpriced resources on this site.
    pub default_cost: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSiteRequest {
    pub name: Option<String>,
    /// Absent: unchanged. `null`: fall back to the server default.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub default_cost: Option<Option<i64>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SiteListResponse {
    pub sites: Vec<Tenant>,
    pub total: usize,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

/// List all sites.
#[utoipa::path(
    get,
    path = "/v1/sites",
    tag = "Sites",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Sites", body = SiteListResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 403, description = "Site management disabled")
    )
)]
pub async fn list_sites(
    _operator: OperatorKey,
    State(state): State<AppState>,
) -> Result<Json<SiteListResponse>, ApiError> {
    let sites = state.registry.blocking(|registry| registry.list()).await?;
    Ok(Json(SiteListResponse {
        total: sites.len(),
        sites,
    }))
}

/// Register a site.
#[utoipa::path(
    post,
    path = "/v1/sites",
    tag = "Sites",
    security(("api_key" = [])),
    request_body = CreateSiteRequest,
    responses(
        (status = 201, description = "Site created", body = Tenant),
        (status = 400, description = "Invalid name, domain or default cost"),
        (status = 409, description = "Domain already registered")
    )
)]
pub async fn create_site(
    _operator: OperatorKey,
    State(state): State<AppState>,
    Json(request): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<Tenant>), ApiError> {
    let new = NewTenant {
        name: request.name,
        domain: request.domain,
        default_cost: request.default_cost,
    };
    let tenant = state.registry.blocking(move |registry| registry.create(new)).await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// Get a site.
#[utoipa::path(
    get,
    path = "/v1/sites/{tenant_id}",
    tag = "Sites",
    security(("api_key" = [])),
    params(
        ("tenant_id" = String, Path, description = "Site ID")
    ),
    responses(
        (status = 200, description = "Site", body = Tenant),
        (status = 404, description = "Site not found")
    )
)]
pub async fn get_site(
    _operator: OperatorKey,
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> Result<Json<Tenant>, ApiError> {
    let tenant = state
        .registry
        .blocking(move |registry| registry.get(&tenant_id))
        .await?;
    Ok(Json(tenant))
}

/// Update a site's name or default cost. The domain cannot change.
#[utoipa::path(
    patch,
    path = "/v1/sites/{tenant_id}",
    tag = "Sites",
    security(("api_key" = [])),
    params(
        ("tenant_id" = String, Path, description = "Site ID")
    ),
    request_body = UpdateSiteRequest,
    responses(
        (status = 200, description = "Updated site", body = Tenant),
        (status = 400, description = "Invalid name or default cost"),
        (status = 404, description = "Site not found")
    )
)]
pub async fn update_site(
    _operator: OperatorKey,
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    Json(request): Json<UpdateSiteRequest>,
) -> Result<Json<Tenant>, ApiError> {
    let update = TenantUpdate {
        name: request.name,
        default_cost: request.default_cost,
    };
    let tenant = state
        .registry
        .blocking(move |registry| registry.update(&tenant_id, update))
        .await?;
    Ok(Json(tenant))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_distinguishes_null_from_absent() {
        let absent: UpdateSiteRequest = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(absent.default_cost, None);

        let cleared: UpdateSiteRequest = serde_json::from_str(r#"{"default_cost":null}"#).unwrap();
        assert_eq!(cleared.default_cost, Some(None));

        let set: UpdateSiteRequest = serde_json::from_str(r#"{"default_cost":3}"#).unwrap();
        assert_eq!(set.default_cost, Some(Some(3)));
    }
}
