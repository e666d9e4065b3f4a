// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::LedgerError;

const PERSISTENCE_MESSAGE: &str = "the ledger could not be read or written";
const CONFLICT_MESSAGE: &str = "the ledger is busy, retry the request";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

/// Error body returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::TenantNotFound(_) | LedgerError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::InsufficientPoints { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::TransactionTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::TransactionConflict(_)
            | LedgerError::TenantExists(_)
            | LedgerError::AccountExists(_) => StatusCode::CONFLICT,
            LedgerError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::DownstreamResolutionFailure { .. } => StatusCode::BAD_GATEWAY,
            LedgerError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        };
        // Storage detail stays in the logs.
        let message = match &err {
            LedgerError::PersistenceFailure(_) => PERSISTENCE_MESSAGE.to_string(),
            LedgerError::TransactionConflict(_) => CONFLICT_MESSAGE.to_string(),
            _ => err.to_string(),
        };
        Self::new(status, err.error_code(), message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}
