//! # Chest Contracts
//!
//! Token contract calls for the custody ledger.
//!
//! ```text
//! ┌─────────────┐  Transfer  ┌─────────────────┐  TransferCall  ┌──────────────┐
//! │ BatchProc.  │ ─────────▶ │ CalldataGateway │ ─────────────▶ │ CallExecutor │
//! └─────────────┘            └─────────────────┘                └──────────────┘
//! ```
//!
//! | Kind          | Pull (deposit)                     | Push (loot)                        |
//! |---------------|------------------------------------|------------------------------------|
//! | Fungible      | `transferFrom(player, chest, amt)` | `transfer(player, amt)`            |
//! | Non-fungible  | `transferFrom(player, chest, id)`  | `transferFrom(chest, player, id)`  |
//! | Semi-fungible | `safeTransferFrom(.., id, amt, "")`| `safeTransferFrom(.., id, amt, "")`|

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod contracts;
pub mod gateway;

pub use contracts::{TransferCall, IERC1155, IERC20, IERC721};
pub use gateway::{CallExecutor, CalldataGateway, ExecutionError};
