// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy of the transaction engine.
//!
//! Storage errors never leave the engine raw: they are translated here into
//! [`LedgerError::PersistenceFailure`] or, for store lock contention,
//! [`LedgerError::TransactionConflict`].

use thiserror::Error;
use tracing::{error, warn};

use crate::models::TenantId;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// No tenant for the given id or origin.
    #[error("site not configured: {0}")]
    TenantNotFound(String),

    #[error("account {account} not found in tenant {tenant_id}")]
    AccountNotFound { tenant_id: TenantId, account: String },

    /// Balance below cost. Never retried.
    #[error(
        "insufficient points for {} in tenant {tenant_id}: {cost} required, balance is {balance}",
        .resource.as_deref().unwrap_or("admin debit")
    )]
    InsufficientPoints {
        tenant_id: TenantId,
        resource: Option<String>,
        cost: i64,
        balance: i64,
    },

    /// The transaction did not finish within its deadline and was rolled back.
    #[error("{operation} timed out after {timeout_ms} ms and was rolled back")]
    TransactionTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// The debit committed but no download link could be produced.
    #[error("download link for {resource} unavailable after charge {ledger_entry_id}: {reason}")]
    DownstreamResolutionFailure {
        tenant_id: TenantId,
        resource: String,
        ledger_entry_id: u64,
        reason: String,
    },

    #[error("a site is already registered for {0}")]
    TenantExists(String),

    #[error("account {0} is already registered")]
    AccountExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(message.into())
    }

    /// Whether a caller may retry: no partial mutation happened and the
    /// failure was caused by contention rather than the request itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::TransactionTimeout { .. } | LedgerError::TransactionConflict(_)
        )
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::TenantNotFound(_) => "tenant_not_found",
            LedgerError::AccountNotFound { .. } => "account_not_found",
            LedgerError::InsufficientPoints { .. } => "insufficient_points",
            LedgerError::TransactionTimeout { .. } => "transaction_timeout",
            LedgerError::TransactionConflict(_) => "transaction_conflict",
            LedgerError::PersistenceFailure(_) => "persistence_failure",
            LedgerError::DownstreamResolutionFailure { .. } => "downstream_resolution_failure",
            LedgerError::TenantExists(_) => "tenant_exists",
            LedgerError::AccountExists(_) => "account_exists",
            LedgerError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        if err.is_contention() {
            warn!(error = %err, "store contention");
            LedgerError::TransactionConflict(err.to_string())
        } else {
            error!(error = %err, "store failure");
            LedgerError::PersistenceFailure(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        let timeout = LedgerError::TransactionTimeout {
            operation: "spend",
            timeout_ms: 5,
        };
        assert!(timeout.is_retryable());
        assert!(LedgerError::TransactionConflict("busy".into()).is_retryable());

        let insufficient = LedgerError::InsufficientPoints {
            tenant_id: TenantId::new(),
            resource: Some("a.zip".into()),
            cost: 30,
            balance: 10,
        };
        assert!(!insufficient.is_retryable());
        assert!(insufficient
            .to_string()
            .starts_with("insufficient points for a.zip in tenant "));
        assert!(insufficient.to_string().ends_with(": 30 required, balance is 10"));

        let debit = LedgerError::InsufficientPoints {
            tenant_id: TenantId::new(),
            resource: None,
            cost: 5,
            balance: 1,
        };
        assert!(debit.to_string().starts_with("insufficient points for admin debit"));
    }

    #[test]
    fn storage_errors_become_persistence_failures() {
        let err: LedgerError = StoreError::Corrupt("bad row".into()).into();
        assert!(matches!(err, LedgerError::PersistenceFailure(ref m) if m.contains("bad row")));
        assert_eq!(err.error_code(), "persistence_failure");
    }
}
