//! Portfolio snapshot model
//!
//! A [`PortfolioSnapshot`] is the immutable result of one successful
//! extraction for one wallet. Field names are part of the durable file format
//! and the HTTP payload, so they are fixed here with serde attributes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::wallet::{ChainKind, WalletAddress};

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Chain family of the wallet
    pub chain: ChainKind,

    /// When the extraction that produced this snapshot finished
    #[serde(rename = "timestamp")]
    pub captured_at: DateTime<Utc>,

    pub wallet_address: WalletAddress,

    /// Always equal to `projects.len()`; kept in the payload for readers
    pub projects_count: usize,

    pub projects: Vec<Project>,
}

impl PortfolioSnapshot {
    pub fn new(wallet: WalletAddress, captured_at: DateTime<Utc>, projects: Vec<Project>) -> Self {
        Self {
            chain: wallet.chain(),
            captured_at,
            wallet_address: wallet,
            projects_count: projects.len(),
            projects,
        }
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    /// Sum of every project's total value.
    pub fn total_value(&self) -> Decimal {
        self.projects.iter().map(|p| p.total_value).sum()
    }

    pub fn is_newer_than(&self, other: &PortfolioSnapshot) -> bool {
        self.captured_at > other.captured_at
    }
}

// =============================================================================
// Projects and sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "project_name")]
    pub name: String,

    /// Chain tag reported by the dashboard (e.g. "eth", "arb", "solana")
    #[serde(rename = "chain")]
    pub chain_tag: String,

    pub total_value: Decimal,

    pub sections: Vec<Section>,
}

impl Project {
    /// Value implied by the project's own sections.
    pub fn computed_value(&self) -> Decimal {
        self.sections.iter().map(Section::net_value).sum()
    }
}

/// One labelled block inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section_type")]
pub enum Section {
    Wallet {
        assets: Vec<Asset>,
    },
    Farming {
        assets: Vec<Asset>,
    },
    Lending {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        market_name: Option<String>,
        supplied: Vec<Asset>,
        borrowed: Vec<Asset>,
    },
    Deposit {
        assets: Vec<Asset>,
    },
    Yield {
        assets: Vec<Asset>,
    },
    Staked {
        assets: Vec<Asset>,
    },
    Locked {
        assets: Vec<Asset>,
    },
}

impl Section {
    /// Build a non-lending section of the given kind.
    ///
    /// Returns `None` for [`SectionKind::Lending`], which needs supplied and
    /// borrowed lists instead.
    pub fn with_assets(kind: SectionKind, assets: Vec<Asset>) -> Option<Self> {
        let section = match kind {
            SectionKind::Wallet => Section::Wallet { assets },
            SectionKind::Farming => Section::Farming { assets },
            SectionKind::Deposit => Section::Deposit { assets },
            SectionKind::Yield => Section::Yield { assets },
            SectionKind::Staked => Section::Staked { assets },
            SectionKind::Locked => Section::Locked { assets },
            SectionKind::Lending => return None,
        };
        Some(section)
    }

    pub fn asset_count(&self) -> usize {
        match self {
            Section::Lending { supplied, borrowed, .. } => supplied.len() + borrowed.len(),
            Section::Wallet { assets }
            | Section::Farming { assets }
            | Section::Deposit { assets }
            | Section::Yield { assets }
            | Section::Staked { assets }
            | Section::Locked { assets } => assets.len(),
        }
    }

    /// USD value of the section; borrowed value counts against lending.
    pub fn net_value(&self) -> Decimal {
        fn sum(assets: &[Asset]) -> Decimal {
            assets.iter().map(|a| a.value).sum()
        }
        match self {
            Section::Lending { supplied, borrowed, .. } => sum(supplied) - sum(borrowed),
            Section::Wallet { assets }
            | Section::Farming { assets }
            | Section::Deposit { assets }
            | Section::Yield { assets }
            | Section::Staked { assets }
            | Section::Locked { assets } => sum(assets),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    Wallet,
    Farming,
    Lending,
    Deposit,
    Yield,
    Staked,
    Locked,
}

impl SectionKind {
    /// Match a dashboard label such as "Lending" or "Liquidity Farming".
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        let kind = if label.contains("lending") {
            SectionKind::Lending
        } else if label.contains("farming") {
            SectionKind::Farming
        } else if label.contains("deposit") {
            SectionKind::Deposit
        } else if label.contains("yield") {
            SectionKind::Yield
        } else if label.contains("staked") {
            SectionKind::Staked
        } else if label.contains("locked") {
            SectionKind::Locked
        } else if label == "wallet" || label == "holdings" || label == "tokens" {
            SectionKind::Wallet
        } else {
            return None;
        };
        Some(kind)
    }
}

/// A single token or pool line inside a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Token symbol or pool identifier
    pub token: String,

    pub balance: Decimal,

    /// USD value
    pub value: Decimal,

    /// APY/yield percentage where the dashboard shows one
    #[serde(default, rename = "yield", skip_serializing_if = "Option::is_none")]
    pub apy: Option<Decimal>,
}
