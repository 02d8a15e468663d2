//! Durable per-wallet snapshot files.
//!
//! One JSON file per wallet, named `{chain}_portfolio_{prefix}.json`. Writes
//! go to a uniquely named temp file in the same directory, are synced, then
//! renamed over the target, so a reader sees either the old file or the new
//! one and never a partial write.

use std::path::{Path, PathBuf};

use folio_core::{PortfolioSnapshot, WalletAddress};
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(wallet: &WalletAddress) -> String {
        format!("{}_portfolio_{}.json", wallet.chain(), wallet.prefix())
    }

    pub fn path_for(&self, wallet: &WalletAddress) -> PathBuf {
        self.dir.join(Self::file_name(wallet))
    }

    /// Atomically replace the wallet's snapshot file.
    pub async fn write(&self, snapshot: &PortfolioSnapshot) -> Result<PathBuf, StoreError> {
        self.stage(snapshot).await?.commit().await
    }

    /// Write and sync the temp file without publishing it.
    pub async fn stage(&self, snapshot: &PortfolioSnapshot) -> Result<StagedWrite, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let target = self.path_for(&snapshot.wallet_address);
        let temp = self.dir.join(format!(
            ".{}.{}.tmp",
            Self::file_name(&snapshot.wallet_address),
            uuid::Uuid::new_v4().simple()
        ));

        let body = serde_json::to_vec_pretty(snapshot)?;
        let staged = StagedWrite { temp, target };
        if let Err(e) = staged.write_temp(&body).await {
            staged.discard().await;
            return Err(e);
        }
        Ok(staged)
    }

    /// Read a wallet's file. `Ok(None)` when there is no file for this wallet.
    pub async fn read(&self, wallet: &WalletAddress) -> Result<Option<PortfolioSnapshot>, StoreError> {
        let path = self.path_for(wallet);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        let snapshot: PortfolioSnapshot = serde_json::from_slice(&bytes)?;

        // Distinct wallets can share a prefix
        if &snapshot.wallet_address != wallet {
            tracing::warn!(
                wallet = %wallet.short(),
                file_wallet = %snapshot.wallet_address.short(),
                path = %path.display(),
                "Snapshot file belongs to another wallet, ignoring"
            );
            return Ok(None);
        }
        Ok(Some(snapshot))
    }
}

/// A synced temp file waiting to be renamed over its target.
#[derive(Debug)]
pub struct StagedWrite {
    temp: PathBuf,
    target: PathBuf,
}

impl StagedWrite {
    async fn write_temp(&self, body: &[u8]) -> Result<(), StoreError> {
        let mut file = tokio::fs::File::create(&self.temp)
            .await
            .map_err(io_error(&self.temp))?;
        file.write_all(body).await.map_err(io_error(&self.temp))?;
        file.sync_all().await.map_err(io_error(&self.temp))?;
        Ok(())
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    pub async fn commit(self) -> Result<PathBuf, StoreError> {
        if let Err(e) = tokio::fs::rename(&self.temp, &self.target).await {
            self.discard().await;
            return Err(io_error(&self.target)(e));
        }
        Ok(self.target)
    }

    pub async fn discard(&self) {
        let _ = tokio::fs::remove_file(&self.temp).await;
    }
}
