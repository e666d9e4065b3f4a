// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::download::{DownloadError, DownloadUrlResolver, SignedUrlResolver};
use crate::engine::PointEngine;
use crate::storage::PointStore;
use crate::tenant::{TenantRegistry, TenantResolver};

/// Authentication configuration.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret. `None` only in development mode.
    pub jwt_secret: Option<Arc<[u8]>>,
    /// Accept unsigned tokens when no secret is set (needs the `dev` feature).
    pub allow_unsigned: bool,
    /// Key guarding site management. `None` disables those endpoints.
    pub operator_api_key: Option<Arc<str>>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: PointEngine,
    /// Site management.
    pub registry: Arc<TenantRegistry>,
    /// Request origin to tenant; normally the registry itself.
    pub tenants: Arc<dyn TenantResolver>,
    pub downloads: Arc<dyn DownloadUrlResolver>,
    pub auth_config: AuthConfig,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: PointEngine, registry: Arc<TenantRegistry>, downloads: Arc<dyn DownloadUrlResolver>) -> Self {
        Self {
            engine,
            tenants: registry.clone(),
            registry,
            downloads,
            auth_config: AuthConfig::default(),
            started_at: Utc::now(),
        }
    }

    /// Wire every component from the runtime configuration.
    pub fn from_config(store: Arc<PointStore>, config: &AppConfig) -> Result<Self, DownloadError> {
        let engine = PointEngine::new(Arc::clone(&store), config.engine.clone());
        let registry = Arc::new(TenantRegistry::new(store, config.is_development()));
        let downloads = SignedUrlResolver::new(
            &config.download_base_url,
            config.download_signing_key.as_deref().map(str::as_bytes),
            config.download_url_ttl,
        )?;
        Ok(Self::new(engine, registry, Arc::new(downloads)).with_auth_config(AuthConfig {
            jwt_secret: config.jwt_secret.as_deref().map(|s| Arc::from(s.as_bytes())),
            allow_unsigned: config.is_development(),
            operator_api_key: config.operator_api_key.as_deref().map(Arc::from),
        }))
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }
}
