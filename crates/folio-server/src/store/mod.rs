//! Result cache
//!
//! Latest successful snapshot per wallet plus the time of the last run that
//! produced at least one success. Readers take a short read lock and clone an
//! `Arc`, so they never wait on an extraction; only the orchestrator writes.

pub mod snapshot_file;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_core::{ChainKind, PortfolioSnapshot, WalletAddress};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::WalletRoster;

pub use snapshot_file::{SnapshotStore, StoreError};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: Arc<PortfolioSnapshot>,
    /// When this entry was last replaced
    pub last_success_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// The snapshot was not newer than the cached one
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletStatus {
    pub wallet: String,
    pub chain: ChainKind,
    pub cached: bool,
    pub projects_count: Option<usize>,
    pub captured_at: Option<DateTime<Utc>>,
    /// When the cached entry was last replaced
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfiguredCounts {
    pub solana: usize,
    pub evm: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub last_update: Option<DateTime<Utc>>,
    pub configured: ConfiguredCounts,
    pub cached_count: usize,
    pub wallets: Vec<WalletStatus>,
}

pub struct ResultCache {
    entries: RwLock<HashMap<WalletAddress, CacheEntry>>,
    last_update: RwLock<Option<DateTime<Utc>>>,
    store: SnapshotStore,
}

impl ResultCache {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            last_update: RwLock::new(None),
            store,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Cache a successful extraction, then persist it.
    ///
    /// The in-memory entry is replaced only by a strictly newer snapshot. A
    /// persistence error is returned after the entry has been updated.
    pub async fn put(&self, snapshot: PortfolioSnapshot) -> Result<PutOutcome, StoreError> {
        let wallet = snapshot.wallet_address.clone();
        let snapshot = Arc::new(snapshot);

        {
            let mut entries = self.entries.write().await;
            if let Some(existing) = entries.get(&wallet) {
                if !snapshot.is_newer_than(&existing.snapshot) {
                    tracing::warn!(
                        wallet = %wallet.short(),
                        cached_at = %existing.snapshot.captured_at,
                        offered_at = %snapshot.captured_at,
                        "Ignoring snapshot that is not newer than the cached one"
                    );
                    return Ok(PutOutcome::Rejected);
                }
            }
            entries.insert(
                wallet.clone(),
                CacheEntry {
                    snapshot: snapshot.clone(),
                    last_success_at: Utc::now(),
                },
            );
        }

        let path = self.store.write(&snapshot).await?;
        tracing::debug!(wallet = %wallet.short(), path = %path.display(), "Snapshot persisted");
        Ok(PutOutcome::Stored)
    }

    pub async fn get(&self, wallet: &WalletAddress) -> Option<Arc<PortfolioSnapshot>> {
        self.entries.read().await.get(wallet).map(|e| e.snapshot.clone())
    }

    pub async fn entry(&self, wallet: &WalletAddress) -> Option<CacheEntry> {
        self.entries.read().await.get(wallet).cloned()
    }

    /// Run-level success time. Never moves backwards.
    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read().await
    }

    pub async fn mark_run_success(&self, at: DateTime<Utc>) {
        let mut last = self.last_update.write().await;
        if last.map_or(true, |current| at > current) {
            *last = Some(at);
        }
    }

    pub async fn status(&self, roster: &WalletRoster) -> CacheStatus {
        let entries = self.entries.read().await;
        let wallets: Vec<WalletStatus> = roster
            .all()
            .map(|wallet| {
                let entry = entries.get(wallet);
                WalletStatus {
                    wallet: wallet.to_string(),
                    chain: wallet.chain(),
                    cached: entry.is_some(),
                    projects_count: entry.map(|e| e.snapshot.project_count()),
                    captured_at: entry.map(|e| e.snapshot.captured_at),
                    last_success_at: entry.map(|e| e.last_success_at),
                }
            })
            .collect();
        drop(entries);

        CacheStatus {
            last_update: self.last_update().await,
            configured: ConfiguredCounts {
                solana: roster.solana.len(),
                evm: roster.evm.len(),
                total: roster.len(),
            },
            cached_count: wallets.iter().filter(|w| w.cached).count(),
            wallets,
        }
    }

    /// Warm the cache from snapshot files of configured wallets.
    ///
    /// Returns how many entries were restored. Unreadable files are skipped.
    pub async fn restore(&self, roster: &WalletRoster) -> usize {
        let mut restored = 0;
        let mut newest: Option<DateTime<Utc>> = None;
        for wallet in roster.all() {
            match self.store.read(wallet).await {
                Ok(Some(snapshot)) => {
                    let captured_at = snapshot.captured_at;
                    newest = newest.max(Some(captured_at));
                    self.entries.write().await.insert(
                        wallet.clone(),
                        CacheEntry {
                            snapshot: Arc::new(snapshot),
                            last_success_at: captured_at,
                        },
                    );
                    restored += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(wallet = %wallet.short(), error = %e, "Could not restore snapshot file");
                }
            }
        }
        if let Some(at) = newest {
            self.mark_run_success(at).await;
        }
        tracing::info!(restored, dir = %self.store.dir().display(), "Cache warm start complete");
        restored
    }
}
