//! # Ledger Error Types
//!
//! All errors that can occur in the custody ledger.

use alloy_primitives::Address;
use chest_shared::{AssetId, AssetKind, ItemId, LengthMismatch, Quantity, UnknownKindTag};
use thiserror::Error;

use crate::gateway::TransferFailed;

/// Errors that can occur in the custody ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Asset contract is not on the whitelist.
    #[error("asset {asset} is not whitelisted")]
    NotWhitelisted {
        /// The rejected asset.
        asset: AssetId,
    },

    /// Asset is already registered with a different kind.
    #[error("asset {asset} already registered as {existing}, cannot register as {requested}")]
    DuplicateEntry {
        /// The conflicting asset.
        asset: AssetId,
        /// Kind already on record.
        existing: AssetKind,
        /// Kind that was requested.
        requested: AssetKind,
    },

    /// Asset is not registered.
    #[error("asset {asset} is not registered")]
    UnknownAsset {
        /// The missing asset.
        asset: AssetId,
    },

    /// Quantity breaks the rules of the asset kind.
    #[error("quantity {quantity} of item {item} is invalid for {kind} asset {asset}")]
    InvalidQuantityForKind {
        /// The asset.
        asset: AssetId,
        /// The item.
        item: ItemId,
        /// Kind of the asset.
        kind: AssetKind,
        /// Offending quantity (resulting quantity for deposits onto a held item).
        quantity: Quantity,
    },

    /// Fungible assets only accept the fungible item sentinel.
    #[error("item {item} is invalid for fungible asset {asset}")]
    InvalidItemForKind {
        /// The asset.
        asset: AssetId,
        /// Offending item id.
        item: ItemId,
    },

    /// Deposits and withdrawals must move a positive quantity.
    #[error("zero quantity for item {item} of asset {asset}")]
    ZeroQuantity {
        /// The asset.
        asset: AssetId,
        /// The item.
        item: ItemId,
    },

    /// A holding would exceed the 256-bit range.
    #[error("quantity overflow for item {item} of asset {asset}")]
    QuantityOverflow {
        /// The asset.
        asset: AssetId,
        /// The item.
        item: ItemId,
    },

    /// Withdrawal exceeds what is held.
    #[error("insufficient balance: need {requested} of item {item} of asset {asset}, have {available}")]
    InsufficientBalance {
        /// The asset.
        asset: AssetId,
        /// The item.
        item: ItemId,
        /// Amount requested.
        requested: Quantity,
        /// Amount held at that point.
        available: Quantity,
    },

    /// A leg failed validation; nothing was transferred.
    #[error("batch rejected at leg {leg_index}: {source}")]
    BatchValidationFailed {
        /// Index of the failing leg.
        leg_index: usize,
        /// Why the leg failed.
        source: Box<LedgerError>,
    },

    /// A transfer failed; earlier legs were compensated.
    #[error("transfer failed at leg {leg_index} (asset {asset}, item {item}): {source}")]
    BatchTransferFailed {
        /// Index of the failing leg.
        leg_index: usize,
        /// The asset.
        asset: AssetId,
        /// The item.
        item: ItemId,
        /// Gateway failure.
        source: TransferFailed,
    },

    /// Batch has more legs than the configured limit.
    #[error("batch has {legs} legs, limit is {max}")]
    BatchTooLarge {
        /// Legs submitted.
        legs: usize,
        /// Configured limit.
        max: usize,
    },

    /// Parallel input arrays differ in length.
    #[error(transparent)]
    LengthMismatch(#[from] LengthMismatch),

    /// Numeric kind tag outside the known range.
    #[error(transparent)]
    UnknownKindTag(#[from] UnknownKindTag),

    /// Caller is not the chest owner.
    #[error("caller {caller} is not authorized")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// The ledger was entered again while a batch is in flight.
    #[error("ledger is busy with a batch in flight")]
    Reentrant,

    /// Bookkeeping diverged from custody. Signals a bug, not a user error.
    #[error("internal consistency fault: {reason}")]
    InternalConsistencyFault {
        /// Leg whose failure led to the fault.
        leg_index: Option<usize>,
        /// Asset of that leg.
        asset: Option<AssetId>,
        /// Item of that leg.
        item: Option<ItemId>,
        /// What went wrong.
        reason: String,
    },

    /// Journal could not be read or written.
    #[error("journal error: {0}")]
    Journal(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LedgerError {
    /// Wraps a leg failure as a batch validation failure.
    #[must_use]
    pub fn at_leg(self, leg_index: usize) -> Self {
        Self::BatchValidationFailed {
            leg_index,
            source: Box::new(self),
        }
    }

    /// Index of the offending leg, for batch failures.
    #[must_use]
    pub fn leg_index(&self) -> Option<usize> {
        match self {
            Self::BatchValidationFailed { leg_index, .. }
            | Self::BatchTransferFailed { leg_index, .. } => Some(*leg_index),
            Self::InternalConsistencyFault { leg_index, .. } => *leg_index,
            _ => None,
        }
    }

    /// Returns true for faults that indicate corrupted state.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InternalConsistencyFault { .. })
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
