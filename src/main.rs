// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Points Gateway command line.
//!
//! Usage:
//!   points-gateway [serve]   - Run the HTTP server
//!   points-gateway init      - Create a site and its first admin

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use points_gateway::{
    api::router,
    auth::{issue_token, TokenClaims, DEFAULT_TOKEN_TTL},
    config::AppConfig,
    engine::PointEngine,
    logging,
    models::AccountIdentity,
    state::AppState,
    storage::PointStore,
    tenant::{NewTenant, TenantRegistry},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// In-flight requests get this long after a shutdown signal.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "points-gateway")]
#[command(about = "Multi-tenant points ledger gating file downloads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Create a site with an admin account and print an admin token
    Init {
        /// Display name of the site
        #[arg(long)]
        site_name: String,
        /// Routing domain, port included when not default
        #[arg(long)]
        site_domain: String,
        /// Username of the local admin account
        #[arg(long, default_value = "admin")]
        admin_user: String,
        /// Cost of unpriced resources on this site
        #[arg(long)]
        default_points: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(config.log_format) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Init {
            site_name,
            site_domain,
            admin_user,
            default_points,
        } => init(config, site_name, site_domain, admin_user, default_points).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "points gateway failed");
            ExitCode::FAILURE
        }
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<PointStore>, BoxError> {
    std::fs::create_dir_all(&config.data_dir)?;
    let path = config.database_path();
    let store = PointStore::open(&path)?;
    info!(path = %path.display(), "ledger database opened");
    Ok(Arc::new(store))
}

async fn serve(config: AppConfig) -> Result<(), BoxError> {
    let store = open_store(&config)?;
    let state = AppState::from_config(store, &config)?;

    if config.is_development() {
        warn!("development mode: unknown hosts get a default site");
        if config.jwt_secret.is_none() {
            warn!("JWT_SECRET not set: bearer tokens are only accepted by builds with the `dev` feature");
        }
    }
    if config.operator_api_key.is_none() {
        info!("OPERATOR_API_KEY not set: site management endpoints are disabled");
    }

    let addr: SocketAddr = config.bind_address().parse()?;
    let shutdown = CancellationToken::new();
    let handle = axum_server::Handle::new();

    tokio::spawn(shutdown_signal(shutdown.clone()));
    tokio::spawn({
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
        }
    });

    info!(%addr, "points gateway listening (docs at /docs)");
    axum_server::bind(addr)
        .handle(handle)
        .serve(router(state).into_make_service())
        .await?;

    shutdown.cancel();
    info!("points gateway stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => return,
    }
    info!("shutdown signal received");
    shutdown.cancel();
}

async fn init(
    config: AppConfig,
    site_name: String,
    site_domain: String,
    admin_user: String,
    default_points: Option<i64>,
) -> Result<(), BoxError> {
    let store = open_store(&config)?;
    let registry = Arc::new(TenantRegistry::new(Arc::clone(&store), false));
    let new = NewTenant {
        name: site_name,
        domain: site_domain,
        default_cost: default_points,
    };
    let tenant = registry.blocking(move |registry| registry.create(new)).await?;

    let engine = PointEngine::new(store, config.engine.clone());
    let admin = engine
        .promote_admin(&tenant, AccountIdentity::local(&admin_user))
        .await?;

    println!("site:    {} ({})", tenant.name, tenant.domain);
    println!("site id: {}", tenant.id);
    println!("admin:   {} ({})", admin.username, admin.id);

    match config.jwt_secret.as_deref() {
        Some(secret) => {
            let claims = TokenClaims::new(&admin.identity(), tenant.id, Utc::now(), DEFAULT_TOKEN_TTL);
            let token = issue_token(secret.as_bytes(), &claims)?;
            println!("token:   {token}");
        }
        None => println!("token:   not issued (JWT_SECRET is not set)"),
    }
    Ok(())
}
