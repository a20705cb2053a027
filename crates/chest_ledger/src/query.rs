//! # Query Service
//!
//! Read-only views of what the chest holds. Nothing here mutates state.

use chest_shared::{AssetId, AssetKind, ItemId, Quantity};

use crate::inventory::Holding;
use crate::state::LedgerState;

/// Parallel arrays, the shape returned by the contract's `look()` and
/// `batchLoot` calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Columns {
    /// Asset contracts.
    pub items: Vec<AssetId>,
    /// Item ids.
    pub token_ids: Vec<ItemId>,
    /// Quantities.
    pub amounts: Vec<Quantity>,
    /// Asset kinds.
    pub kinds: Vec<AssetKind>,
}

impl Columns {
    /// Builds columns from rows.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (AssetId, ItemId, Quantity, AssetKind)>,
    {
        let mut columns = Self::default();
        for (asset, item, quantity, kind) in rows {
            columns.items.push(asset);
            columns.token_ids.push(item);
            columns.amounts.push(quantity);
            columns.kinds.push(kind);
        }
        columns
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Holdings at one point in time, ordered by asset then item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Non-zero holdings.
    pub holdings: Vec<Holding>,
}

impl Snapshot {
    /// Held quantity of one (asset, item), zero if absent.
    #[must_use]
    pub fn quantity_of(&self, asset: &AssetId, item: &ItemId) -> Quantity {
        self.holdings
            .binary_search_by(|h| (h.asset, h.item).cmp(&(*asset, *item)))
            .map(|index| self.holdings[index].quantity)
            .unwrap_or_default()
    }

    /// Holdings of a single asset.
    pub fn of_asset<'a>(&'a self, asset: &'a AssetId) -> impl Iterator<Item = &'a Holding> + 'a {
        self.holdings.iter().filter(move |h| &h.asset == asset)
    }

    /// Columnar form.
    #[must_use]
    pub fn columns(&self) -> Columns {
        Columns::from_rows(
            self.holdings
                .iter()
                .map(|h| (h.asset, h.item, h.quantity, h.kind)),
        )
    }

    /// Number of holdings.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    /// Returns true if nothing is held.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

/// Read-only access to a ledger state.
#[derive(Clone, Copy, Debug)]
pub struct QueryService<'a> {
    state: &'a LedgerState,
}

impl<'a> QueryService<'a> {
    /// Wraps a state for reading.
    #[must_use]
    pub const fn new(state: &'a LedgerState) -> Self {
        Self { state }
    }

    /// Every non-zero holding.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            holdings: self.state.inventory().snapshot(),
        }
    }

    /// Held quantity of one (asset, item).
    #[must_use]
    pub fn balance_of(&self, asset: &AssetId, item: &ItemId) -> Quantity {
        self.state.inventory().balance_of(asset, item)
    }

    /// Whitelisted kind of an asset.
    #[must_use]
    pub fn kind_of(&self, asset: &AssetId) -> Option<AssetKind> {
        self.state.registry().kind_of(asset)
    }

    /// Whitelist entries in address order.
    #[must_use]
    pub fn whitelist(&self) -> Vec<(AssetId, AssetKind)> {
        self.state.registry().entries().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use chest_shared::FUNGIBLE_ITEM;

    const TOKEN: AssetId = Address::new([0x20; 20]);
    const MULTI: AssetId = Address::new([0x11; 20]);

    fn state() -> LedgerState {
        let mut state = LedgerState::new();
        state
            .add_whitelist(&[(TOKEN, AssetKind::Fungible), (MULTI, AssetKind::SemiFungible)])
            .unwrap();
        state
            .inventory
            .deposit(TOKEN, FUNGIBLE_ITEM, U256::from(600), AssetKind::Fungible)
            .unwrap();
        state
            .inventory
            .deposit(MULTI, U256::from(2), U256::from(50), AssetKind::SemiFungible)
            .unwrap();
        state
    }

    #[test]
    fn test_snapshot_lookup() {
        let state = state();
        let snapshot = QueryService::new(&state).snapshot();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.quantity_of(&TOKEN, &FUNGIBLE_ITEM), U256::from(600));
        assert_eq!(snapshot.quantity_of(&MULTI, &U256::from(3)), U256::ZERO);
        assert_eq!(snapshot.of_asset(&MULTI).count(), 1);
    }

    #[test]
    fn test_columns_match_rows() {
        let state = state();
        let columns = QueryService::new(&state).snapshot().columns();

        assert_eq!(columns.items, vec![MULTI, TOKEN]);
        assert_eq!(columns.token_ids, vec![U256::from(2), FUNGIBLE_ITEM]);
        assert_eq!(columns.amounts, vec![U256::from(50), U256::from(600)]);
        assert_eq!(columns.kinds, vec![AssetKind::SemiFungible, AssetKind::Fungible]);
    }

    #[test]
    fn test_query_does_not_mutate() {
        let state = state();
        let before = state.clone();
        let query = QueryService::new(&state);

        let _ = query.snapshot();
        let _ = query.whitelist();
        assert_eq!(query.kind_of(&TOKEN), Some(AssetKind::Fungible));
        assert_eq!(state, before);
    }
}
