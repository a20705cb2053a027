//! # Chest
//!
//! The custody facade: one owner, one whitelist, one inventory, an optional
//! journal.
//!
//! All state sits behind a single re-entrant lock. Calls from other threads
//! queue on the lock; a call made on the same thread while a batch is in
//! flight (a gateway calling back in) fails with `Reentrant` and never sees
//! partial state.

use std::cell::RefCell;

use alloy_primitives::Address;
use chest_shared::{AssetId, AssetKind, BatchLeg, BatchRequest, ItemId, Quantity};
use parking_lot::ReentrantMutex;

use crate::batch::{BatchProcessor, BatchReceipt};
use crate::config::ChestConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::gateway::TransferGateway;
use crate::journal::{Journal, JournalOp, JournalSink};
use crate::query::{QueryService, Snapshot};
use crate::registry::tagged_entries;
use crate::state::LedgerState;

/// A custody ledger instance.
pub struct Chest {
    config: ChestConfig,
    state: ReentrantMutex<RefCell<LedgerState>>,
    journal: Option<Journal>,
    processor: BatchProcessor,
}

impl Chest {
    /// Opens a chest. With a journal configured, its committed history is
    /// replayed first.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the configuration is invalid
    /// - `Journal` if the journal cannot be opened or replayed
    pub fn new(config: ChestConfig) -> LedgerResult<Self> {
        config.validate()?;

        let mut state = LedgerState::new();
        let journal = match &config.journal_path {
            Some(path) => {
                let (journal, ops) = Journal::open(path)?;
                for op in &ops {
                    state.replay(op)?;
                }
                tracing::info!(
                    "Chest '{}' restored {} assets and {} holdings from {}",
                    config.name,
                    state.registry().len(),
                    state.inventory().len(),
                    path.display()
                );
                Some(journal)
            }
            None => None,
        };

        let processor = BatchProcessor::new(config.max_batch_legs);

        Ok(Self {
            config,
            state: ReentrantMutex::new(RefCell::new(state)),
            journal,
            processor,
        })
    }

    /// In-memory chest with default settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for the zero owner address.
    pub fn in_memory(owner: Address) -> LedgerResult<Self> {
        Self::new(ChestConfig::new(owner))
    }

    /// The configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ChestConfig {
        &self.config
    }

    /// The owner account.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> Address {
        self.config.owner
    }

    fn ensure_owner(&self, caller: Address) -> LedgerResult<()> {
        if caller == self.config.owner {
            Ok(())
        } else {
            tracing::warn!("Rejected call from {}: not the owner", caller);
            Err(LedgerError::Unauthorized { caller })
        }
    }

    fn read<R>(&self, f: impl FnOnce(&LedgerState) -> R) -> LedgerResult<R> {
        let guard = self.state.lock();
        let state = guard.try_borrow().map_err(|_| LedgerError::Reentrant)?;
        Ok(f(&state))
    }

    fn write<R>(&self, f: impl FnOnce(&mut LedgerState) -> LedgerResult<R>) -> LedgerResult<R> {
        let guard = self.state.lock();
        let mut state = guard.try_borrow_mut().map_err(|_| LedgerError::Reentrant)?;
        f(&mut state)
    }

    fn record(&self, ops: &[JournalOp]) -> LedgerResult<()> {
        match &self.journal {
            Some(journal) if !ops.is_empty() => journal.record(ops).map(|_| ()),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Whitelists assets. Owner only.
    ///
    /// Returns the assets that were not whitelisted before.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if `caller` is not the owner
    /// - `DuplicateEntry` on a kind conflict; nothing is applied
    /// - `Journal` if the change cannot be persisted; nothing is applied
    pub fn add_whitelist(
        &self,
        caller: Address,
        entries: &[(AssetId, AssetKind)],
    ) -> LedgerResult<Vec<AssetId>> {
        self.ensure_owner(caller)?;

        self.write(|state| {
            let before = state.registry.clone();
            let added = state.add_whitelist(entries)?;

            let ops: Vec<JournalOp> = added
                .iter()
                .filter_map(|asset| {
                    state
                        .registry()
                        .kind_of(asset)
                        .map(|kind| JournalOp::Whitelist {
                            asset: *asset,
                            kind,
                        })
                })
                .collect();

            if let Err(e) = self.record(&ops) {
                state.registry = before;
                return Err(e);
            }

            for op in &ops {
                if let JournalOp::Whitelist { asset, kind } = op {
                    tracing::info!("Whitelisted {} as {}", asset, kind);
                }
            }
            Ok(added)
        })
    }

    /// Whitelists assets given as parallel `addresses[]` and `types[]`
    /// (1 = fungible, 2 = non-fungible, 3 = semi-fungible). Owner only.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` and `UnknownKindTag` in addition to what
    /// [`Chest::add_whitelist`] returns.
    pub fn add_whitelist_tagged(
        &self,
        caller: Address,
        assets: &[AssetId],
        tags: &[u8],
    ) -> LedgerResult<Vec<AssetId>> {
        self.ensure_owner(caller)?;
        let entries = tagged_entries(assets, tags)?;
        self.add_whitelist(caller, &entries)
    }

    /// Removes an asset from the whitelist. Owner only.
    ///
    /// Blocks future deposits; current holdings stay withdrawable.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if `caller` is not the owner
    /// - `UnknownAsset` if the asset is not whitelisted
    /// - `Journal` if the change cannot be persisted
    pub fn remove_whitelist(&self, caller: Address, asset: AssetId) -> LedgerResult<AssetKind> {
        self.ensure_owner(caller)?;

        self.write(|state| {
            let kind = state.remove_whitelist(&asset)?;

            if let Err(e) = self.record(&[JournalOp::Unwhitelist { asset }]) {
                state.registry.restore_entry(asset, kind);
                return Err(e);
            }

            tracing::info!("Removed {} ({}) from the whitelist", asset, kind);
            Ok(kind)
        })
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Pulls every leg from `caller` into custody, all or nothing.
    ///
    /// Anyone may deposit unless the chest is configured owner-only.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `Reentrant`, or any batch error.
    pub fn batch_deposit<G>(
        &self,
        caller: Address,
        legs: Vec<BatchLeg>,
        gateway: &mut G,
    ) -> LedgerResult<BatchReceipt>
    where
        G: TransferGateway + ?Sized,
    {
        if !self.config.open_deposits {
            self.ensure_owner(caller)?;
        }
        self.execute(&BatchRequest::deposit(legs), caller, gateway)
    }

    /// Pushes every leg out of custody to `caller`, all or nothing. Owner
    /// only.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `Reentrant`, or any batch error.
    pub fn batch_loot<G>(
        &self,
        caller: Address,
        legs: Vec<BatchLeg>,
        gateway: &mut G,
    ) -> LedgerResult<BatchReceipt>
    where
        G: TransferGateway + ?Sized,
    {
        self.ensure_owner(caller)?;
        self.execute(&BatchRequest::withdraw(legs), caller, gateway)
    }

    /// What [`Chest::batch_loot`] would return, without moving anything.
    /// Owner only.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `Reentrant`, `BatchTooLarge` or
    /// `BatchValidationFailed`.
    pub fn preview_loot(&self, caller: Address, legs: Vec<BatchLeg>) -> LedgerResult<BatchReceipt> {
        self.ensure_owner(caller)?;
        let request = BatchRequest::withdraw(legs);
        self.read(|state| self.processor.preview(state, &request, caller))?
    }

    fn execute<G>(
        &self,
        request: &BatchRequest,
        caller: Address,
        gateway: &mut G,
    ) -> LedgerResult<BatchReceipt>
    where
        G: TransferGateway + ?Sized,
    {
        self.write(|state| {
            let journal = self.journal.as_ref().map(|j| j as &dyn JournalSink);
            self.processor
                .execute(state, request, caller, gateway, journal)
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every non-zero holding.
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` while a batch is in flight on this thread.
    pub fn look(&self) -> LedgerResult<Snapshot> {
        self.read(|state| QueryService::new(state).snapshot())
    }

    /// Whitelisted kind of an asset.
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` while a batch is in flight on this thread.
    pub fn kind_of(&self, asset: &AssetId) -> LedgerResult<Option<AssetKind>> {
        self.read(|state| QueryService::new(state).kind_of(asset))
    }

    /// Held quantity of one (asset, item).
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` while a batch is in flight on this thread.
    pub fn balance_of(&self, asset: &AssetId, item: &ItemId) -> LedgerResult<Quantity> {
        self.read(|state| QueryService::new(state).balance_of(asset, item))
    }

    /// Whitelist entries in address order.
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` while a batch is in flight on this thread.
    pub fn whitelist(&self) -> LedgerResult<Vec<(AssetId, AssetKind)>> {
        self.read(|state| QueryService::new(state).whitelist())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Compacts the journal into the current tables. No-op without one.
    ///
    /// The state lock is held until the compacted file is in place.
    ///
    /// # Errors
    ///
    /// `Reentrant` or `Journal`.
    pub fn checkpoint(&self) -> LedgerResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        self.write(|state| journal.compact(&state.table_ops()))
    }

    /// Checkpoints and releases the chest.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the final checkpoint fails.
    pub fn close(self) -> LedgerResult<()> {
        self.checkpoint()?;
        tracing::info!("Chest '{}' closed", self.config.name);
        Ok(())
    }
}

impl std::fmt::Debug for Chest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chest")
            .field("config", &self.config)
            .field("journaled", &self.journal.is_some())
            .finish_non_exhaustive()
    }
}
