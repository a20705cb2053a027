//! # Chest Ledger
//!
//! Custody bookkeeping for a chest holding fungible, non-fungible and
//! semi-fungible assets on behalf of an owner.
//!
//! ## Design Principles
//!
//! 1. **Explicit whitelist** - Only assets the owner registered can come in
//! 2. **Validate, then transfer, then book** - No bookkeeping before every
//!    transfer of a batch succeeded
//! 3. **All-or-nothing batches** - A failed leg reverses the legs before it
//! 4. **No netting** - Legs on the same item apply one after another
//!
//! ## Thread Safety
//!
//! A [`Chest`] serializes every call behind one lock. A gateway that calls
//! back into the chest mid-batch gets [`LedgerError::Reentrant`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use chest_ledger::{Chest, ChestConfig, InMemoryGateway};
//! use chest_shared::{AssetKind, BatchLeg, FUNGIBLE_ITEM};
//!
//! let chest = Chest::new(ChestConfig::from_toml_file("chest.toml")?)?;
//! chest.add_whitelist(owner, &[(token, AssetKind::Fungible)])?;
//!
//! let receipt = chest.batch_deposit(
//!     player,
//!     vec![BatchLeg::new(token, FUNGIBLE_ITEM, amount)],
//!     &mut gateway,
//! )?;
//! let holdings = chest.look()?.columns();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod batch;
pub mod chest;
pub mod config;
pub mod error;
pub mod gateway;
pub mod inventory;
pub mod journal;
pub mod query;
pub mod registry;
pub mod state;

pub use batch::{BatchProcessor, BatchReceipt, LegReceipt, DEFAULT_MAX_BATCH_LEGS};
pub use chest::Chest;
pub use config::ChestConfig;
pub use error::{LedgerError, LedgerResult};
pub use gateway::{GatewayCall, InMemoryGateway, Transfer, TransferFailed, TransferGateway};
pub use inventory::{Holding, Inventory};
pub use journal::{Journal, JournalOp, JournalSink};
pub use query::{Columns, QueryService, Snapshot};
pub use registry::WhitelistRegistry;
pub use state::LedgerState;
