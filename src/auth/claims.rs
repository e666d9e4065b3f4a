// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token claims, issuing and verification.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::models::{AccountIdentity, Provider, TenantId};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Lifetime of tokens issued by [`issue_token`] callers that don't pick one.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Claims carried by a points-gateway bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Username within the provider.
    pub sub: String,
    /// Identity provider.
    #[serde(default)]
    pub prv: Provider,
    /// Tenant the token was issued for.
    pub tid: TenantId,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn new(identity: &AccountIdentity, tenant_id: TenantId, now: DateTime<Utc>, ttl: Duration) -> Self {
        let iat = now.timestamp();
        Self {
            sub: identity.username.clone(),
            prv: identity.provider,
            tid: tenant_id,
            iat,
            exp: iat.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        }
    }

    /// Normalized identity of the token subject.
    pub fn identity(&self) -> AccountIdentity {
        AccountIdentity::new(&self.sub, self.prv)
    }
}

/// Sign `claims` with the HS256 `secret`.
pub fn issue_token(secret: &[u8], claims: &TokenClaims) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::InternalError(format!("token signing failed: {e}")))
}

/// Verify signature and expiry of an HS256 token.
pub fn verify_token(token: &str, secret: &[u8]) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation.validate_aud = false;

    decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        })
}

/// Decode without checking the signature.
///
/// WARNING: development builds only.
#[cfg(feature = "dev")]
pub fn decode_unverified(token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
    let claims = jsonwebtoken::dangerous::insecure_decode::<TokenClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?
        .claims;
    if claims.exp < now.timestamp() - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }
    Ok(claims)
}
