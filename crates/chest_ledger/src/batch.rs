//! # Batch Processor
//!
//! All-or-nothing execution of a deposit or withdrawal batch.
//!
//! ## Phases
//!
//! 1. Validate every leg against projected balances. No gateway call yet.
//! 2. Stage transfers in leg order. A failed transfer reverses the legs
//!    already staged, last first.
//! 3. Commit the inventory, then the journal. A failure in either restores
//!    the inventory checkpoint and reverses every transfer.
//!
//! Legs are applied cumulatively in the order given. Two legs on the same
//! (asset, item) are never netted.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use chest_shared::{
    AssetId, AssetKind, BatchLeg, BatchRequest, Direction, ItemId, Quantity, FUNGIBLE_ITEM,
};

use crate::error::{LedgerError, LedgerResult};
use crate::gateway::{Transfer, TransferGateway};
use crate::inventory::Inventory;
use crate::journal::{JournalOp, JournalSink};
use crate::query::Columns;
use crate::state::LedgerState;

/// Default upper bound on legs per batch.
pub const DEFAULT_MAX_BATCH_LEGS: usize = 256;

/// One executed (or previewed) leg.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegReceipt {
    /// Asset contract.
    pub asset: AssetId,
    /// Item.
    pub item: ItemId,
    /// Quantity moved.
    pub quantity: Quantity,
    /// Kind of the asset.
    pub kind: AssetKind,
}

/// Result of a batch, one entry per leg in request order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReceipt {
    /// Direction of the batch.
    pub direction: Direction,
    /// Executed legs.
    pub legs: Vec<LegReceipt>,
}

impl BatchReceipt {
    fn from_transfers(direction: Direction, transfers: &[Transfer]) -> Self {
        Self {
            direction,
            legs: transfers
                .iter()
                .map(|t| LegReceipt {
                    asset: t.asset,
                    item: t.item,
                    quantity: t.quantity,
                    kind: t.kind,
                })
                .collect(),
        }
    }

    /// Columnar form, as returned by the contract's `batchLoot`.
    #[must_use]
    pub fn columns(&self) -> Columns {
        Columns::from_rows(
            self.legs
                .iter()
                .map(|leg| (leg.asset, leg.item, leg.quantity, leg.kind)),
        )
    }

    /// Number of legs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.legs.len()
    }

    /// Returns true for the receipt of an empty batch.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

/// Executes batches against a ledger state and a gateway.
#[derive(Clone, Copy, Debug)]
pub struct BatchProcessor {
    max_legs: usize,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_LEGS)
    }
}

impl BatchProcessor {
    /// Creates a processor accepting at most `max_legs` legs per batch.
    #[must_use]
    pub const fn new(max_legs: usize) -> Self {
        Self { max_legs }
    }

    /// Validates a batch without touching anything.
    ///
    /// Returns the transfers the batch would perform, in leg order.
    ///
    /// # Errors
    ///
    /// - `BatchTooLarge` if the batch exceeds the leg limit
    /// - `BatchValidationFailed` naming the first failing leg
    pub fn validate(
        &self,
        state: &LedgerState,
        request: &BatchRequest,
        counterparty: Address,
    ) -> LedgerResult<Vec<Transfer>> {
        if request.len() > self.max_legs {
            return Err(LedgerError::BatchTooLarge {
                legs: request.len(),
                max: self.max_legs,
            });
        }

        let mut projected: BTreeMap<(AssetId, ItemId), Quantity> = BTreeMap::new();

        request
            .legs
            .iter()
            .enumerate()
            .map(|(index, leg)| {
                validate_leg(state, request.direction, leg, &mut projected)
                    .map(|kind| Transfer {
                        asset: leg.asset,
                        item: leg.item,
                        quantity: leg.quantity,
                        kind,
                        counterparty,
                    })
                    .map_err(|e| e.at_leg(index))
            })
            .collect()
    }

    /// Receipt the batch would produce, without side effects.
    ///
    /// # Errors
    ///
    /// Same as [`BatchProcessor::validate`].
    pub fn preview(
        &self,
        state: &LedgerState,
        request: &BatchRequest,
        counterparty: Address,
    ) -> LedgerResult<BatchReceipt> {
        let transfers = self.validate(state, request, counterparty)?;
        Ok(BatchReceipt::from_transfers(request.direction, &transfers))
    }

    /// Executes a batch.
    ///
    /// On success every transfer happened and the inventory (and journal,
    /// if any) reflects all legs. On failure the inventory is unchanged and
    /// every completed transfer has been reversed.
    ///
    /// # Errors
    ///
    /// - `BatchTooLarge` / `BatchValidationFailed`: nothing happened
    /// - `BatchTransferFailed`: staged legs were reversed
    /// - `Journal`: the journal write failed, all legs were reversed
    /// - `InternalConsistencyFault`: bookkeeping or a reversal failed
    pub fn execute<G>(
        &self,
        state: &mut LedgerState,
        request: &BatchRequest,
        counterparty: Address,
        gateway: &mut G,
        journal: Option<&dyn JournalSink>,
    ) -> LedgerResult<BatchReceipt>
    where
        G: TransferGateway + ?Sized,
    {
        let direction = request.direction;

        let transfers = self.validate(state, request, counterparty).map_err(|e| {
            tracing::warn!("Rejected {} batch from {}: {}", direction, counterparty, e);
            e
        })?;

        if transfers.is_empty() {
            return Ok(BatchReceipt::from_transfers(direction, &transfers));
        }

        // Stage
        for (index, transfer) in transfers.iter().enumerate() {
            tracing::debug!(
                "Staging {} leg {}: {} x{} of {}",
                direction,
                index,
                transfer.item,
                transfer.quantity,
                transfer.asset
            );

            if let Err(source) = gateway.transfer(direction, transfer) {
                tracing::warn!(
                    "Transfer failed at leg {}, reversing {} staged legs: {}",
                    index,
                    index,
                    source
                );
                compensate(gateway, direction, &transfers[..index], Some((index, transfer)))?;
                return Err(LedgerError::BatchTransferFailed {
                    leg_index: index,
                    asset: transfer.asset,
                    item: transfer.item,
                    source,
                });
            }
        }

        // Commit
        if let Err(e) = commit(state, direction, &transfers, journal) {
            tracing::warn!("Commit failed, reversing batch: {}", e);
            compensate(gateway, direction, &transfers, None)?;
            return Err(e);
        }

        tracing::info!(
            "Committed {} batch of {} legs for {}",
            direction,
            transfers.len(),
            counterparty
        );

        Ok(BatchReceipt::from_transfers(direction, &transfers))
    }
}

/// Checks one leg and advances the projection. Returns the leg's kind.
fn validate_leg(
    state: &LedgerState,
    direction: Direction,
    leg: &BatchLeg,
    projected: &mut BTreeMap<(AssetId, ItemId), Quantity>,
) -> LedgerResult<AssetKind> {
    let BatchLeg {
        asset,
        item,
        quantity,
    } = *leg;

    let kind = match direction {
        Direction::Deposit => state.registry().kind_of(&asset),
        Direction::Withdraw => state.resolve_kind(&asset),
    }
    .ok_or(LedgerError::NotWhitelisted { asset })?;

    if !kind.uses_item_ids() && item != FUNGIBLE_ITEM {
        return Err(LedgerError::InvalidItemForKind { asset, item });
    }
    if quantity.is_zero() {
        return Err(LedgerError::ZeroQuantity { asset, item });
    }
    if kind.is_unique() && quantity != Quantity::from(1) {
        return Err(LedgerError::InvalidQuantityForKind {
            asset,
            item,
            kind,
            quantity,
        });
    }

    let balance = projected
        .entry((asset, item))
        .or_insert_with(|| state.inventory().balance_of(&asset, &item));

    match direction {
        Direction::Deposit => {
            let updated = balance
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
            *balance = updated;
        }
        Direction::Withdraw => {
            *balance = balance
                .checked_sub(quantity)
                .ok_or(LedgerError::InsufficientBalance {
                    asset,
                    item,
                    requested: quantity,
                    available: *balance,
                })?;
        }
    }

    Ok(kind)
}

/// Applies `transfers` to the inventory, then journals them.
///
/// On failure the inventory is back to where it was before the call.
fn commit(
    state: &mut LedgerState,
    direction: Direction,
    transfers: &[Transfer],
    journal: Option<&dyn JournalSink>,
) -> LedgerResult<()> {
    let checkpoint = state.inventory.checkpoint();

    if let Err((index, e)) = apply(&mut state.inventory, direction, transfers) {
        state.inventory.restore(checkpoint);
        tracing::error!("Inventory commit failed at leg {} after staging: {}", index, e);
        let leg = transfers.get(index);
        return Err(LedgerError::InternalConsistencyFault {
            leg_index: Some(index),
            asset: leg.map(|t| t.asset),
            item: leg.map(|t| t.item),
            reason: format!("inventory commit failed at leg {index} after transfers: {e}"),
        });
    }

    if let Some(journal) = journal {
        if let Err(e) = journal.record(&journal_ops(direction, transfers)) {
            state.inventory.restore(checkpoint);
            return Err(e);
        }
    }

    Ok(())
}

/// Applies every transfer in order. Fails with the index of the first
/// transfer the inventory rejects.
fn apply(
    inventory: &mut Inventory,
    direction: Direction,
    transfers: &[Transfer],
) -> Result<(), (usize, LedgerError)> {
    for (index, t) in transfers.iter().enumerate() {
        let applied = match direction {
            Direction::Deposit => inventory.deposit(t.asset, t.item, t.quantity, t.kind),
            Direction::Withdraw => inventory.withdraw(t.asset, t.item, t.quantity),
        };
        applied.map_err(|e| (index, e))?;
    }
    Ok(())
}

fn journal_ops(direction: Direction, transfers: &[Transfer]) -> Vec<JournalOp> {
    transfers
        .iter()
        .map(|t| match direction {
            Direction::Deposit => JournalOp::Credit {
                asset: t.asset,
                item: t.item,
                quantity: t.quantity,
                kind: t.kind,
            },
            Direction::Withdraw => JournalOp::Debit {
                asset: t.asset,
                item: t.item,
                quantity: t.quantity,
            },
        })
        .collect()
}

/// Reverses `staged` transfers, last first.
///
/// Every reversal is attempted even after one fails. The resulting fault
/// names `failed_leg` (the transfer whose failure triggered the reversal)
/// when given, otherwise the lowest leg that could not be reversed.
fn compensate<G>(
    gateway: &mut G,
    direction: Direction,
    staged: &[Transfer],
    failed_leg: Option<(usize, &Transfer)>,
) -> LedgerResult<()>
where
    G: TransferGateway + ?Sized,
{
    let mut failed = Vec::new();

    for (index, transfer) in staged.iter().enumerate().rev() {
        if let Err(e) = gateway.reverse(direction, transfer) {
            tracing::error!(
                "Compensation failed for leg {} ({} of {}): {}",
                index,
                transfer.item,
                transfer.asset,
                e
            );
            failed.push(index);
        }
    }

    let Some(&lowest) = failed.last() else {
        return Ok(());
    };

    let (leg_index, leg) = match failed_leg {
        Some((index, transfer)) => (index, Some(transfer)),
        None => (lowest, staged.get(lowest)),
    };

    Err(LedgerError::InternalConsistencyFault {
        leg_index: Some(leg_index),
        asset: leg.map(|t| t.asset),
        item: leg.map(|t| t.item),
        reason: format!("compensation failed for legs {failed:?} after leg {leg_index} failed"),
    })
}
