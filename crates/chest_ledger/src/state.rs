//! # Ledger State
//!
//! The registry and the inventory, owned together. Everything that must be
//! consistent across both lives here: kind resolution for withdrawals of
//! revoked assets, the rule that a revoked asset cannot come back as a
//! different kind while it is still held, and journal replay.

use chest_shared::{AssetId, AssetKind};

use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{Holding, Inventory};
use crate::journal::JournalOp;
use crate::registry::WhitelistRegistry;

/// Registry and inventory of one chest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub(crate) registry: WhitelistRegistry,
    pub(crate) inventory: Inventory,
}

impl LedgerState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The whitelist.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &WhitelistRegistry {
        &self.registry
    }

    /// The holdings.
    #[inline]
    #[must_use]
    pub const fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Kind of an asset for withdrawal purposes.
    ///
    /// A revoked asset still resolves through the kind recorded on its
    /// holdings, so what is held can always leave.
    #[must_use]
    pub fn resolve_kind(&self, asset: &AssetId) -> Option<AssetKind> {
        self.registry
            .kind_of(asset)
            .or_else(|| self.inventory.kind_of_holding(asset))
    }

    /// Adds whitelist entries atomically.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEntry` if an entry conflicts with the registry or
    /// with the kind recorded on existing holdings.
    pub fn add_whitelist(&mut self, entries: &[(AssetId, AssetKind)]) -> LedgerResult<Vec<AssetId>> {
        for &(asset, kind) in entries {
            if let Some(held) = self.inventory.kind_of_holding(&asset) {
                if held != kind {
                    return Err(LedgerError::DuplicateEntry {
                        asset,
                        existing: held,
                        requested: kind,
                    });
                }
            }
        }
        self.registry.add_whitelist(entries)
    }

    /// Removes an asset from the whitelist.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAsset` if the asset is not whitelisted.
    pub fn remove_whitelist(&mut self, asset: &AssetId) -> LedgerResult<AssetKind> {
        self.registry.remove(asset)
    }

    /// Applies a committed journal operation.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the operation contradicts the state, which means
    /// the journal does not belong to this ledger.
    pub(crate) fn replay(&mut self, op: &JournalOp) -> LedgerResult<()> {
        let result = match *op {
            JournalOp::Whitelist { asset, kind } => {
                self.registry.restore_entry(asset, kind);
                Ok(())
            }
            JournalOp::Unwhitelist { asset } => self.registry.remove(&asset).map(|_| ()),
            JournalOp::Credit {
                asset,
                item,
                quantity,
                kind,
            } => self.inventory.deposit(asset, item, quantity, kind).map(|_| ()),
            JournalOp::Debit {
                asset,
                item,
                quantity,
            } => self.inventory.withdraw(asset, item, quantity).map(|_| ()),
        };

        result.map_err(|e| LedgerError::Journal(format!("replay of {op:?} failed: {e}")))
    }

    /// The two persisted tables as journal operations: whitelist rows, then
    /// holding rows.
    #[must_use]
    pub(crate) fn table_ops(&self) -> Vec<JournalOp> {
        let whitelist = self
            .registry
            .entries()
            .map(|(asset, kind)| JournalOp::Whitelist { asset, kind });

        let holdings = self.inventory.snapshot().into_iter().map(
            |Holding {
                 asset,
                 item,
                 quantity,
                 kind,
             }| JournalOp::Credit {
                asset,
                item,
                quantity,
                kind,
            },
        );

        whitelist.chain(holdings).collect()
    }
}
