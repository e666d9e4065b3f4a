// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ApiError, ErrorBody};

#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Token is malformed
    MalformedToken,
    /// Token signature is invalid
    InvalidSignature,
    /// Token has expired
    TokenExpired,
    /// Token is not yet valid
    TokenNotYetValid,
    /// Token was issued for another site
    TenantMismatch,
    /// Request carries no usable `Host`
    MissingHost,
    /// Missing or wrong `X-API-Key`
    InvalidApiKey,
    /// Operator endpoints are disabled (no key configured)
    OperatorDisabled,
    /// Unknown local user or wrong password
    InvalidCredentials,
    /// Local login needs a token secret to sign with
    LoginDisabled,
    /// Internal error
    InternalError(String),
    /// Insufficient permissions
    InsufficientPermissions,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::TenantMismatch => "tenant_mismatch",
            AuthError::MissingHost => "missing_host",
            AuthError::InvalidApiKey => "invalid_api_key",
            AuthError::OperatorDisabled => "operator_disabled",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::LoginDisabled => "login_disabled",
            AuthError::InternalError(_) => "internal_error",
            AuthError::InsufficientPermissions => "insufficient_permissions",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::TokenNotYetValid
            | AuthError::InvalidApiKey
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::TenantMismatch
            | AuthError::InsufficientPermissions
            | AuthError::OperatorDisabled
            | AuthError::LoginDisabled => StatusCode::FORBIDDEN,
            AuthError::MissingHost => StatusCode::BAD_REQUEST,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenNotYetValid => write!(f, "Token is not yet valid"),
            AuthError::TenantMismatch => write!(f, "Token was issued for another site"),
            AuthError::MissingHost => write!(f, "Host header is required"),
            AuthError::InvalidApiKey => write!(f, "X-API-Key is missing or invalid"),
            AuthError::OperatorDisabled => write!(f, "Site management is disabled on this server"),
            AuthError::InvalidCredentials => write!(f, "Unknown user or wrong password"),
            AuthError::LoginDisabled => write!(f, "Local login is disabled on this server"),
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
            AuthError::InsufficientPermissions => {
                write!(f, "Insufficient permissions for this operation")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::new(err.status_code(), err.error_code(), err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
