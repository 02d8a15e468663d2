//! Error types for Folio Core

use thiserror::Error;

use crate::wallet::ChainKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid wallet address: {0}")]
    InvalidWallet(String),

    #[error("Wallet {address} is a {actual} address, expected {expected}")]
    ChainMismatch {
        address: String,
        expected: ChainKind,
        actual: ChainKind,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;
