//! # Chest Shared
//!
//! Common types used by the ledger core and the contract-call layer.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on the ledger itself. If a type needs
//! ledger state to make sense, it belongs in `chest_ledger`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod asset;
pub mod batch;

pub use asset::{AssetId, AssetKind, ItemId, Quantity, UnknownKindTag, FUNGIBLE_ITEM};
pub use batch::{BatchLeg, BatchRequest, Direction, LengthMismatch};
