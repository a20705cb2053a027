//! # Inventory
//!
//! What the chest holds, keyed by (asset, item).
//!
//! Pure bookkeeping: nothing here talks to a gateway. Records that reach
//! zero are pruned, so enumeration never shows an empty holding.

use std::collections::BTreeMap;

use chest_shared::{AssetId, AssetKind, ItemId, Quantity};

use crate::error::{LedgerError, LedgerResult};

/// A held quantity and the kind it was deposited as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoldingRecord {
    /// Held amount, never zero while the record exists.
    pub quantity: Quantity,
    /// Kind of the asset when it was deposited.
    pub kind: AssetKind,
}

/// One entry of an inventory snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Holding {
    /// Asset contract.
    pub asset: AssetId,
    /// Item inside the asset contract.
    pub item: ItemId,
    /// Held amount.
    pub quantity: Quantity,
    /// Kind of the asset.
    pub kind: AssetKind,
}

/// All holdings of the chest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    records: BTreeMap<(AssetId, ItemId), HoldingRecord>,
}

impl Inventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Held quantity of one (asset, item), zero if absent.
    #[inline]
    #[must_use]
    pub fn balance_of(&self, asset: &AssetId, item: &ItemId) -> Quantity {
        self.records
            .get(&(*asset, *item))
            .map(|record| record.quantity)
            .unwrap_or_default()
    }

    /// Kind recorded on any holding of `asset`.
    #[must_use]
    pub fn kind_of_holding(&self, asset: &AssetId) -> Option<AssetKind> {
        self.records
            .range((*asset, ItemId::ZERO)..=(*asset, ItemId::MAX))
            .map(|(_, record)| record.kind)
            .next()
    }

    /// Returns true if anything of `asset` is held.
    #[must_use]
    pub fn holds_asset(&self, asset: &AssetId) -> bool {
        self.kind_of_holding(asset).is_some()
    }

    /// Adds `quantity` to a holding.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `ZeroQuantity` if `quantity` is zero
    /// - `InvalidQuantityForKind` if a non-fungible holding would exceed 1
    /// - `QuantityOverflow` if the balance would not fit in 256 bits
    pub fn deposit(
        &mut self,
        asset: AssetId,
        item: ItemId,
        quantity: Quantity,
        kind: AssetKind,
    ) -> LedgerResult<Quantity> {
        if quantity.is_zero() {
            return Err(LedgerError::ZeroQuantity { asset, item });
        }

        let current = self.balance_of(&asset, &item);
        let updated = current
            .checked_add(quantity)
            .ok_or(LedgerError::QuantityOverflow { asset, item })?;

        if kind.is_unique() && updated > Quantity::from(1) {
            return Err(LedgerError::InvalidQuantityForKind {
                asset,
                item,
                kind,
                quantity: updated,
            });
        }

        self.records.insert(
            (asset, item),
            HoldingRecord {
                quantity: updated,
                kind,
            },
        );
        Ok(updated)
    }

    /// Removes `quantity` from a holding, pruning it at zero.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `ZeroQuantity` if `quantity` is zero
    /// - `InsufficientBalance` if less than `quantity` is held
    pub fn withdraw(
        &mut self,
        asset: AssetId,
        item: ItemId,
        quantity: Quantity,
    ) -> LedgerResult<Quantity> {
        if quantity.is_zero() {
            return Err(LedgerError::ZeroQuantity { asset, item });
        }

        let key = (asset, item);
        let available = self.balance_of(&asset, &item);
        let remaining = available
            .checked_sub(quantity)
            .ok_or(LedgerError::InsufficientBalance {
                asset,
                item,
                requested: quantity,
                available,
            })?;

        if remaining.is_zero() {
            self.records.remove(&key);
        } else if let Some(record) = self.records.get_mut(&key) {
            record.quantity = remaining;
        }
        Ok(remaining)
    }

    /// Ordered view of every non-zero holding, by asset then item.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Holding> {
        self.records
            .iter()
            .filter(|(_, record)| !record.quantity.is_zero())
            .map(|(&(asset, item), record)| Holding {
                asset,
                item,
                quantity: record.quantity,
                kind: record.kind,
            })
            .collect()
    }

    /// Number of held (asset, item) pairs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is held.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Captures the inventory for rollback.
    #[must_use]
    pub fn checkpoint(&self) -> InventoryCheckpoint {
        InventoryCheckpoint {
            records: self.records.clone(),
        }
    }

    /// Restores the inventory captured by [`Inventory::checkpoint`].
    pub fn restore(&mut self, checkpoint: InventoryCheckpoint) {
        self.records = checkpoint.records;
    }
}

/// Inventory state captured for transactional rollback.
#[derive(Clone, Debug)]
pub struct InventoryCheckpoint {
    records: BTreeMap<(AssetId, ItemId), HoldingRecord>,
}
