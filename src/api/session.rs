// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local account registration and login.
//!
//! Both endpoints are scoped to the site addressed by `Host` and answer with
//! a bearer token for that site. They are disabled when no `JWT_SECRET` is
//! configured.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::{
    api::accounts::AccountView,
    auth::{
        hash_password, issue_token, verify_password, AuthError, SiteScope, TokenClaims,
        DEFAULT_TOKEN_TTL, MIN_PASSWORD_LEN,
    },
    engine::LedgerError,
    error::ApiError,
    models::{Account, AccountIdentity, Tenant},
    state::AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LocalCredentials {
    /// Local username, usually an email address.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    pub account: AccountView,
}

/// Register a local account and get a token.
///
/// An account created earlier by an admin grant is claimed, balance included.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "Auth",
    request_body = LocalCredentials,
    responses(
        (status = 201, description = "Registered", body = TokenResponse),
        (status = 200, description = "Existing account claimed", body = TokenResponse),
        (status = 400, description = "Empty username or short password"),
        (status = 403, description = "Local login disabled"),
        (status = 404, description = "Site not configured"),
        (status = 409, description = "Username already registered")
    )
)]
pub async fn register(
    SiteScope(tenant): SiteScope,
    State(state): State<AppState>,
    Json(request): Json<LocalCredentials>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let secret = signing_secret(&state)?;
    let identity = local_identity(&request.username)?;
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password = request.password;
    let credential = off_runtime(move || hash_password(&password)).await?;
    let (account, created) = state
        .engine
        .register_local(&tenant, identity, credential)
        .await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(token_response(&secret, &tenant, account)?)))
}

/// Log in to a local account and get a token.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LocalCredentials,
    responses(
        (status = 200, description = "Logged in", body = TokenResponse),
        (status = 401, description = "Unknown user or wrong password"),
        (status = 403, description = "Local login disabled"),
        (status = 404, description = "Site not configured")
    )
)]
pub async fn login(
    SiteScope(tenant): SiteScope,
    State(state): State<AppState>,
    Json(request): Json<LocalCredentials>,
) -> Result<Json<TokenResponse>, ApiError> {
    let secret = signing_secret(&state)?;
    let identity = local_identity(&request.username)?;

    let account = match state.engine.find_account(&tenant, identity).await {
        Ok(account) => account,
        Err(LedgerError::AccountNotFound { .. }) => return Err(AuthError::InvalidCredentials.into()),
        Err(err) => return Err(err.into()),
    };
    // Accounts created by grants or federated logins have no password.
    let Some(hash) = account.credential.clone() else {
        return Err(AuthError::InvalidCredentials.into());
    };

    let password = request.password;
    if !off_runtime(move || verify_password(&password, &hash)).await? {
        warn!(tenant_id = %tenant.id, account_id = %account.id, "local login failed");
        return Err(AuthError::InvalidCredentials.into());
    }
    Ok(Json(token_response(&secret, &tenant, account)?))
}

fn signing_secret(state: &AppState) -> Result<Arc<[u8]>, AuthError> {
    state
        .auth_config
        .jwt_secret
        .clone()
        .ok_or(AuthError::LoginDisabled)
}

fn local_identity(username: &str) -> Result<AccountIdentity, ApiError> {
    let identity = AccountIdentity::local(username);
    if identity.username.is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }
    Ok(identity)
}

fn token_response(secret: &[u8], tenant: &Tenant, account: Account) -> Result<TokenResponse, AuthError> {
    let claims = TokenClaims::new(&account.identity(), tenant.id, Utc::now(), DEFAULT_TOKEN_TTL);
    Ok(TokenResponse {
        token: issue_token(secret, &claims)?,
        token_type: "Bearer".to_string(),
        expires_in: DEFAULT_TOKEN_TTL.as_secs(),
        account: account.into(),
    })
}

async fn off_runtime<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::InternalError(format!("password worker failed: {e}")))?
}
