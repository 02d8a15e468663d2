//! Folio server: scheduled portfolio snapshots from browser-rendered
//! dashboards, cached in memory and on disk, served over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod source;
pub mod store;

use std::sync::Arc;

use axum::Router;
use folio_core::ChainKind;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, WalletRoster};
use crate::orchestrator::{Orchestrator, RetryPolicy, SourceLane};
use crate::session::{BrowserLauncher, LaunchProfile, SessionManager};
use crate::source::{DebankSource, JupiterSource, PageSettings, PortfolioSource, SourceId};
use crate::store::{ResultCache, SnapshotStore};

pub use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub roster: Arc<WalletRoster>,
    pub cache: Arc<ResultCache>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire roster, sources, sessions, cache and orchestrator from config.
    ///
    /// The cache is warmed from existing snapshot files before returning.
    pub async fn build(
        config: AppConfig,
        launcher: Arc<dyn BrowserLauncher>,
        cancel: CancellationToken,
    ) -> AppResult<Self> {
        let roster = config.validate().map_err(|e| AppError::Config(e.to_string()))?;
        tracing::info!(
            solana = roster.solana.len(),
            evm = roster.evm.len(),
            "Wallet roster validated"
        );

        let cache = Arc::new(ResultCache::new(SnapshotStore::new(&config.output.dir)));
        cache.restore(&roster).await;

        let lanes = build_lanes(&config, &roster, launcher);
        let orchestrator = Arc::new(Orchestrator::new(lanes, cache.clone(), cancel));

        Ok(Self {
            config: Arc::new(config),
            roster: Arc::new(roster),
            cache,
            orchestrator,
        })
    }
}

/// One lane per enabled source, carrying the wallets routed to its chain.
pub fn build_lanes(
    config: &AppConfig,
    roster: &WalletRoster,
    launcher: Arc<dyn BrowserLauncher>,
) -> Vec<SourceLane> {
    let mut lanes = Vec::new();
    for chain in [ChainKind::Solana, ChainKind::Evm] {
        let source_config = config.sources.for_chain(chain);
        let wallets = roster.for_chain(chain).to_vec();
        let id = SourceId::for_chain(chain);

        if !source_config.enabled {
            if !wallets.is_empty() {
                tracing::warn!(
                    source = %id,
                    wallets = wallets.len(),
                    "Source disabled, its wallets will not be refreshed"
                );
            }
            continue;
        }

        let settings = PageSettings::from_config(source_config, &config.filters);
        let source: Arc<dyn PortfolioSource> = match id {
            SourceId::Jupiter => Arc::new(JupiterSource::new(settings)),
            SourceId::Debank => Arc::new(DebankSource::new(settings)),
        };
        let profile = LaunchProfile::from_config(
            &config.browser,
            source_config.profile_dir.clone(),
            source_config.page_timeout(),
        );
        let sessions = Arc::new(SessionManager::new(
            id,
            launcher.clone(),
            profile,
            source_config.startup_timeout(),
        ));
        lanes.push(SourceLane::new(
            source,
            sessions,
            wallets,
            RetryPolicy::from_config(source_config),
        ));
    }
    lanes
}

/// Router with CORS and request tracing, ready to serve.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(api::create_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
