//! `#[serde(with = ...)]` adapters for the collector's loosely typed JSON.

pub mod ordered;
pub mod serde_bit;
pub mod serde_hex;
pub mod serde_index;
