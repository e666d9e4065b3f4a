// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Site, file info and paid downloads.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{Caller, SiteScope},
    download::{unlock_download, UnlockedDownload},
    error::ApiError,
    models::{Quote, Tenant},
    state::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct FileInfoQuery {
    /// Resource path, e.g. `books/rust.pdf`.
    pub resource: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DownloadRequest {
    /// Resource path to unlock.
    pub resource: String,
}

/// Get the site addressed by the request host.
#[utoipa::path(
    get,
    path = "/v1/site",
    tag = "Points",
    responses(
        (status = 200, description = "Site", body = Tenant),
        (status = 404, description = "Site not configured")
    )
)]
pub async fn site(SiteScope(tenant): SiteScope) -> Json<Tenant> {
    Json(tenant)
}

/// Get the price of a resource.
#[utoipa::path(
    get,
    path = "/v1/files/info",
    tag = "Points",
    params(FileInfoQuery),
    responses(
        (status = 200, description = "Resource price", body = Quote),
        (status = 400, description = "Empty resource"),
        (status = 404, description = "Site not configured")
    )
)]
pub async fn file_info(
    SiteScope(tenant): SiteScope,
    State(state): State<AppState>,
    Query(query): Query<FileInfoQuery>,
) -> Result<Json<Quote>, ApiError> {
    let quote = state.engine.quote(&tenant, &query.resource).await?;
    Ok(Json(quote))
}

/// Spend points on a resource and get its download link.
///
/// The charge is committed before the link is produced. If the link cannot
/// be produced the response is 502 and the error names the ledger entry;
/// the points are not refunded automatically.
#[utoipa::path(
    post,
    path = "/v1/downloads",
    tag = "Points",
    security(("bearer_auth" = [])),
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "Download unlocked", body = UnlockedDownload),
        (status = 401, description = "Not authenticated"),
        (status = 422, description = "Insufficient points"),
        (status = 502, description = "Charged but no link could be produced"),
        (status = 503, description = "Transaction timed out, nothing charged")
    )
)]
pub async fn download(
    Caller { tenant, account }: Caller,
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<Json<UnlockedDownload>, ApiError> {
    let unlocked = unlock_download(
        &state.engine,
        state.downloads.as_ref(),
        &tenant,
        account.id,
        &request.resource,
    )
    .await?;
    Ok(Json(unlocked))
}
