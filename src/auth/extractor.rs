// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for site scope and callers.
//!
//! ```rust,ignore
//! async fn my_handler(Caller { tenant, account }: Caller) -> impl IntoResponse {
//!     // account belongs to tenant, created on first sight
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, HOST},
        request::Parts,
    },
};
use tracing::debug;

use super::claims::{verify_token, TokenClaims};
use super::AuthError;
use crate::error::ApiError;
use crate::models::{Account, Tenant};
use crate::state::{AppState, AuthConfig};
use crate::tenant::resolve_blocking;

/// Header carrying the operator key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The tenant addressed by the request `Host`.
pub struct SiteScope(pub Tenant);

impl FromRequestParts<AppState> for SiteScope {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(tenant) = parts.extensions.get::<Tenant>().cloned() {
            return Ok(SiteScope(tenant));
        }

        let host = parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .ok_or(AuthError::MissingHost)?;

        let tenant = resolve_blocking(&state.tenants, host).await?;
        parts.extensions.insert(tenant.clone());
        Ok(SiteScope(tenant))
    }
}

/// An authenticated account of the addressed tenant.
///
/// The token must have been issued for that tenant. Accounts are created
/// with a zero balance on their first authenticated request.
#[derive(Clone)]
pub struct Caller {
    pub tenant: Tenant,
    pub account: Account,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>().cloned() {
            return Ok(caller);
        }
        let SiteScope(tenant) = SiteScope::from_request_parts(parts, state).await?;

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let claims = verify(token, &state.auth_config)?;
        if claims.tid != tenant.id {
            debug!(token_tenant = %claims.tid, site = %tenant.id, "token issued for another site");
            return Err(AuthError::TenantMismatch.into());
        }

        let (account, _) = state
            .engine
            .find_or_create_account(&tenant, claims.identity())
            .await?;
        let caller = Caller { tenant, account };
        parts.extensions.insert(caller.clone());
        Ok(caller)
    }
}

fn verify(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    match &config.jwt_secret {
        Some(secret) => verify_token(token, secret),
        None => verify_unsigned(token, config.allow_unsigned),
    }
}

#[cfg(feature = "dev")]
fn verify_unsigned(token: &str, allowed: bool) -> Result<TokenClaims, AuthError> {
    if !allowed {
        return Err(AuthError::InternalError("no token secret configured".into()));
    }
    super::claims::decode_unverified(token, chrono::Utc::now())
}

#[cfg(not(feature = "dev"))]
fn verify_unsigned(_token: &str, _allowed: bool) -> Result<TokenClaims, AuthError> {
    Err(AuthError::InternalError("no token secret configured".into()))
}

/// A caller whose account carries the admin flag.
pub struct AdminOnly(pub Caller);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        if !caller.account.is_admin {
            return Err(AuthError::InsufficientPermissions.into());
        }
        Ok(AdminOnly(caller))
    }
}

/// Operator access to site management via `X-API-Key`.
pub struct OperatorKey;

impl FromRequestParts<AppState> for OperatorKey {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state
            .auth_config
            .operator_api_key
            .as_deref()
            .ok_or(AuthError::OperatorDisabled)?;
        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::InvalidApiKey)?;
        if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            return Err(AuthError::InvalidApiKey);
        }
        Ok(OperatorKey)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
