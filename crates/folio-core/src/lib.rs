//! # Folio Core
//!
//! Data model shared by every part of Folio: wallet classification, the
//! immutable portfolio snapshot produced by a successful extraction, and the
//! tolerant value parsers used to turn rendered dashboard text into numbers.

pub mod error;
pub mod models;
pub mod numeric;
pub mod wallet;

pub use error::*;
pub use models::*;
pub use numeric::*;
pub use wallet::*;
