//! # Transfer Gateway
//!
//! The boundary where assets physically move. The ledger never implements
//! token contracts; it asks a gateway to pull assets into custody or push
//! them out, and treats every call as one that may fail.
//!
//! [`InMemoryGateway`] keeps external balances in a map. It is the gateway
//! used by tests and benches, and a reference for what a real one must do.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use chest_shared::{AssetId, AssetKind, Direction, ItemId, Quantity};
use thiserror::Error;

/// A transfer the gateway refused or could not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transfer failed: {reason}")]
pub struct TransferFailed {
    /// Why the transfer failed.
    pub reason: String,
}

impl TransferFailed {
    /// Creates a new transfer failure.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One movement of one (asset, item) pair across the custody boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Asset contract.
    pub asset: AssetId,
    /// Item inside the asset contract.
    pub item: ItemId,
    /// Amount to move.
    pub quantity: Quantity,
    /// Kind of the asset, selects the transfer mechanism.
    pub kind: AssetKind,
    /// The party assets come from (pull) or go to (push).
    pub counterparty: Address,
}

/// Moves assets into and out of custody.
///
/// Implementations exist per deployment: the ledger only consumes this
/// contract. Calls are synchronous and must not suspend indefinitely.
pub trait TransferGateway {
    /// Moves `transfer.quantity` from the counterparty into custody.
    ///
    /// # Errors
    ///
    /// Returns [`TransferFailed`] if nothing was moved.
    fn pull_in(&mut self, transfer: &Transfer) -> Result<(), TransferFailed>;

    /// Moves `transfer.quantity` out of custody to the counterparty.
    ///
    /// # Errors
    ///
    /// Returns [`TransferFailed`] if nothing was moved.
    fn push_out(&mut self, transfer: &Transfer) -> Result<(), TransferFailed>;

    /// Performs the transfer matching `direction`.
    ///
    /// # Errors
    ///
    /// Propagates the gateway failure.
    fn transfer(&mut self, direction: Direction, transfer: &Transfer) -> Result<(), TransferFailed> {
        match direction {
            Direction::Deposit => self.pull_in(transfer),
            Direction::Withdraw => self.push_out(transfer),
        }
    }

    /// Undoes a transfer previously performed in `direction`.
    ///
    /// # Errors
    ///
    /// Propagates the gateway failure.
    fn reverse(&mut self, direction: Direction, transfer: &Transfer) -> Result<(), TransferFailed> {
        match direction {
            Direction::Deposit => self.push_out(transfer),
            Direction::Withdraw => self.pull_in(transfer),
        }
    }
}

/// A call observed by [`InMemoryGateway`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GatewayCall {
    /// `Deposit` for `pull_in`, `Withdraw` for `push_out`.
    pub direction: Direction,
    /// The requested transfer.
    pub transfer: Transfer,
    /// Whether the call succeeded.
    pub succeeded: bool,
}

type BalanceKey = (Address, AssetId, ItemId);

/// Gateway backed by an in-memory balance map.
///
/// Every party, the custodian included, has a balance per (asset, item).
/// Faults can be injected by call number or by asset.
#[derive(Clone, Debug)]
pub struct InMemoryGateway {
    /// Address holding assets in custody.
    custodian: Address,
    /// External balances, custodian included.
    balances: BTreeMap<BalanceKey, Quantity>,
    /// Every call in order.
    calls: Vec<GatewayCall>,
    /// 1-based call number that fails.
    fail_on_call: Option<usize>,
    /// Assets whose transfers always fail.
    failing_assets: Vec<AssetId>,
}

impl InMemoryGateway {
    /// Creates a gateway with no balances.
    #[must_use]
    pub fn new(custodian: Address) -> Self {
        Self {
            custodian,
            balances: BTreeMap::new(),
            calls: Vec::new(),
            fail_on_call: None,
            failing_assets: Vec::new(),
        }
    }

    /// Credits `party` out of thin air (the token contract's mint).
    pub fn mint(&mut self, party: Address, asset: AssetId, item: ItemId, quantity: Quantity) {
        let balance = self.balances.entry((party, asset, item)).or_default();
        *balance = balance.saturating_add(quantity);
    }

    /// Balance of `party` for one (asset, item).
    #[must_use]
    pub fn balance(&self, party: Address, asset: AssetId, item: ItemId) -> Quantity {
        self.balances
            .get(&(party, asset, item))
            .copied()
            .unwrap_or_default()
    }

    /// All non-zero external balances.
    #[must_use]
    pub fn balances(&self) -> BTreeMap<BalanceKey, Quantity> {
        self.balances
            .iter()
            .filter(|(_, quantity)| !quantity.is_zero())
            .map(|(key, quantity)| (*key, *quantity))
            .collect()
    }

    /// Every call made so far.
    #[must_use]
    pub fn calls(&self) -> &[GatewayCall] {
        &self.calls
    }

    /// Makes the `n`-th call from now on fail (1-based, counted over all calls).
    pub fn fail_on_call(&mut self, n: usize) {
        self.fail_on_call = Some(self.calls.len() + n);
    }

    /// Makes every transfer of `asset` fail.
    pub fn fail_asset(&mut self, asset: AssetId) {
        self.failing_assets.push(asset);
    }

    /// Removes all injected faults.
    pub fn clear_faults(&mut self) {
        self.fail_on_call = None;
        self.failing_assets.clear();
    }

    fn injected_fault(&self, transfer: &Transfer) -> Option<TransferFailed> {
        let call_number = self.calls.len() + 1;
        if self.fail_on_call == Some(call_number) {
            return Some(TransferFailed::new(format!("injected fault on call {call_number}")));
        }
        if self.failing_assets.contains(&transfer.asset) {
            return Some(TransferFailed::new(format!(
                "asset {} rejects transfers",
                transfer.asset
            )));
        }
        None
    }

    fn shift(
        &mut self,
        from: Address,
        to: Address,
        transfer: &Transfer,
    ) -> Result<(), TransferFailed> {
        let from_key = (from, transfer.asset, transfer.item);
        let available = self.balances.get(&from_key).copied().unwrap_or_default();
        let remaining = available.checked_sub(transfer.quantity).ok_or_else(|| {
            TransferFailed::new(format!(
                "{from} holds {available} of item {}, cannot send {}",
                transfer.item, transfer.quantity
            ))
        })?;

        if from == to {
            return Ok(());
        }

        let to_key = (to, transfer.asset, transfer.item);
        let received = self
            .balances
            .get(&to_key)
            .copied()
            .unwrap_or_default()
            .checked_add(transfer.quantity)
            .ok_or_else(|| TransferFailed::new("receiver balance overflow"))?;

        self.balances.insert(from_key, remaining);
        self.balances.insert(to_key, received);
        Ok(())
    }

    fn record(
        &mut self,
        direction: Direction,
        transfer: &Transfer,
        result: Result<(), TransferFailed>,
    ) -> Result<(), TransferFailed> {
        self.calls.push(GatewayCall {
            direction,
            transfer: *transfer,
            succeeded: result.is_ok(),
        });
        result
    }
}

impl TransferGateway for InMemoryGateway {
    fn pull_in(&mut self, transfer: &Transfer) -> Result<(), TransferFailed> {
        let custodian = self.custodian;
        let result = match self.injected_fault(transfer) {
            Some(fault) => Err(fault),
            None => self.shift(transfer.counterparty, custodian, transfer),
        };
        self.record(Direction::Deposit, transfer, result)
    }

    fn push_out(&mut self, transfer: &Transfer) -> Result<(), TransferFailed> {
        let custodian = self.custodian;
        let result = match self.injected_fault(transfer) {
            Some(fault) => Err(fault),
            None => self.shift(custodian, transfer.counterparty, transfer),
        };
        self.record(Direction::Withdraw, transfer, result)
    }
}
