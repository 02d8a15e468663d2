use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Length of an EVM address including the `0x` prefix.
pub const EVM_ADDRESS_LEN: usize = 42;

/// Solana addresses must be strictly longer than this.
pub const SOLANA_MIN_EXCLUSIVE_LEN: usize = 30;

/// Number of leading characters used for short display and file names.
pub const SHORT_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Solana,
    Evm,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Solana => write!(f, "solana"),
            ChainKind::Evm => write!(f, "evm"),
        }
    }
}

impl ChainKind {
    /// Classify a raw address string.
    ///
    /// EVM: `0x` followed by 40 hex digits. Solana is the residual case:
    /// anything longer than 30 characters without the `0x` prefix.
    pub fn classify(address: &str) -> Option<Self> {
        if let Some(hex) = address.strip_prefix("0x") {
            let is_hex = hex.chars().all(|c| c.is_ascii_hexdigit());
            return (address.len() == EVM_ADDRESS_LEN && is_hex).then_some(ChainKind::Evm);
        }

        (address.chars().count() > SOLANA_MIN_EXCLUSIVE_LEN).then_some(ChainKind::Solana)
    }
}

/// A configured wallet address together with the chain it was classified to.
///
/// Only constructible through [`WalletAddress::parse`], so every instance has
/// exactly one [`ChainKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress {
    address: String,
    chain: ChainKind,
}

impl WalletAddress {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let address = raw.trim();
        let chain =
            ChainKind::classify(address).ok_or_else(|| CoreError::InvalidWallet(raw.to_string()))?;
        Ok(Self {
            address: address.to_string(),
            chain,
        })
    }

    /// Parse and require a specific chain family.
    pub fn parse_for(raw: &str, expected: ChainKind) -> CoreResult<Self> {
        let wallet = Self::parse(raw)?;
        if wallet.chain != expected {
            return Err(CoreError::ChainMismatch {
                address: wallet.address,
                expected,
                actual: wallet.chain,
            });
        }
        Ok(wallet)
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }

    pub fn chain(&self) -> ChainKind {
        self.chain
    }

    /// First eight characters, used for durable file names.
    pub fn prefix(&self) -> &str {
        let end = self
            .address
            .char_indices()
            .nth(SHORT_PREFIX_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.address.len());
        &self.address[..end]
    }

    /// `abcdefgh...stuvwxyz` form for logs and status keys.
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.address.chars().collect();
        if chars.len() <= SHORT_PREFIX_LEN * 2 {
            return self.address.clone();
        }
        let head: String = chars[..SHORT_PREFIX_LEN].iter().collect();
        let tail: String = chars[chars.len() - SHORT_PREFIX_LEN..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.address)
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        WalletAddress::parse(&raw).map_err(serde::de::Error::custom)
    }
}
