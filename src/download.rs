// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Download Links
//!
//! After a spend commits, the caller needs a link to the storage backend.
//! [`SignedUrlResolver`] builds it from `DOWNLOAD_BASE_URL` and, when a
//! signing key is configured, appends a short-lived HMAC signature the
//! backend can check with [`SignedUrlResolver::verify`].
//!
//! Link resolution happens after the ledger commit. A failure there does not
//! refund: [`unlock_download`] logs it on the `points_gateway::reconcile`
//! target and reports the ledger entry id so an operator can settle it.

use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::error;
use url::Url;
use utoipa::ToSchema;

use crate::engine::{LedgerError, LedgerResult, PointEngine};
use crate::models::{normalize_resource, resource_path_problem, AccountId, SpendReceipt, Tenant};

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the expiry (unix seconds).
pub const EXPIRES_PARAM: &str = "expires";
/// Query parameter carrying the signature.
pub const SIGN_PARAM: &str = "sign";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid download base url: {0}")]
    InvalidBase(String),

    #[error("cannot build a link for {resource}: {reason}")]
    InvalidResource { resource: String, reason: String },

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Produces the download link of an unlocked resource.
pub trait DownloadUrlResolver: Send + Sync {
    fn download_url(&self, resource: &str) -> Result<Url, DownloadError>;
}

/// Joins resources onto a base URL and optionally signs them.
pub struct SignedUrlResolver {
    base: Url,
    signing_key: Option<Vec<u8>>,
    ttl: Duration,
}

impl SignedUrlResolver {
    pub fn new(base: &str, signing_key: Option<&[u8]>, ttl: Duration) -> Result<Self, DownloadError> {
        let mut base = Url::parse(base).map_err(|e| DownloadError::InvalidBase(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(DownloadError::InvalidBase(format!("{base} cannot be a base")));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            signing_key: signing_key.filter(|k| !k.is_empty()).map(<[u8]>::to_vec),
            ttl,
        })
    }

    pub fn is_signing(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Check a signature produced by this resolver at `now` (unix seconds).
    pub fn verify(&self, resource: &str, expires: i64, signature: &str, now: i64) -> bool {
        let Some(key) = &self.signing_key else {
            return false;
        };
        if expires < now {
            return false;
        }
        let Ok(expected) = Base64UrlUnpadded::decode_vec(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
            return false;
        };
        mac.update(signing_payload(&normalize_resource(resource), expires).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    fn link(&self, resource: &str, now: i64) -> Result<Url, DownloadError> {
        let resource = normalize_resource(resource);
        let invalid = |reason: &str| DownloadError::InvalidResource {
            resource: resource.clone(),
            reason: reason.to_string(),
        };
        if let Some(problem) = resource_path_problem(&resource) {
            return Err(invalid(problem));
        }

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| invalid("base url has no path"))?
            .pop_if_empty()
            .extend(resource.split('/'));

        if let Some(key) = &self.signing_key {
            let expires = now.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX));
            let mut mac = HmacSha256::new_from_slice(key).map_err(|e| DownloadError::Signing(e.to_string()))?;
            mac.update(signing_payload(&resource, expires).as_bytes());
            let signature = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
            url.query_pairs_mut()
                .append_pair(EXPIRES_PARAM, &expires.to_string())
                .append_pair(SIGN_PARAM, &signature);
        }
        Ok(url)
    }
}

impl DownloadUrlResolver for SignedUrlResolver {
    fn download_url(&self, resource: &str) -> Result<Url, DownloadError> {
        self.link(resource, Utc::now().timestamp())
    }
}

fn signing_payload(resource: &str, expires: i64) -> String {
    format!("{resource}:{expires}")
}

/// A paid-for download.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UnlockedDownload {
    #[serde(flatten)]
    pub receipt: SpendReceipt,
    pub download_url: String,
}

/// Spend the resource price, then resolve its link.
///
/// The debit stays committed when resolution fails; the returned
/// [`LedgerError::DownstreamResolutionFailure`] names the ledger entry.
pub async fn unlock_download(
    engine: &PointEngine,
    resolver: &dyn DownloadUrlResolver,
    tenant: &Tenant,
    account_id: AccountId,
    resource: &str,
) -> LedgerResult<UnlockedDownload> {
    let receipt = engine.spend(tenant, account_id, resource).await?;
    match resolver.download_url(&receipt.resource) {
        Ok(url) => Ok(UnlockedDownload {
            receipt,
            download_url: url.into(),
        }),
        Err(err) => {
            error!(
                target: "points_gateway::reconcile",
                tenant_id = %tenant.id,
                account_id = %account_id,
                resource = %receipt.resource,
                cost = receipt.cost,
                entry_id = receipt.ledger_entry_id,
                error = %err,
                "charged download has no link; manual reconciliation required"
            );
            Err(LedgerError::DownstreamResolutionFailure {
                tenant_id: tenant.id,
                resource: receipt.resource,
                ledger_entry_id: receipt.ledger_entry_id,
                reason: err.to_string(),
            })
        }
    }
}
