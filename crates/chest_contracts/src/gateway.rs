//! # Calldata Gateway
//!
//! A [`TransferGateway`] that turns every transfer into a token contract
//! call and hands it to a [`CallExecutor`]. Signing, gas and submission are
//! the executor's business.

use alloy_primitives::Address;
use chest_ledger::{Transfer, TransferFailed, TransferGateway};
use chest_shared::Direction;
use thiserror::Error;

use crate::contracts::TransferCall;

/// Errors reported by a call executor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The contract reverted.
    #[error("call to {target} reverted: {reason}")]
    Reverted {
        /// Called contract.
        target: Address,
        /// Revert reason, if any.
        reason: String,
    },

    /// The call could not be delivered.
    #[error("call to {target} not delivered: {reason}")]
    Undelivered {
        /// Called contract.
        target: Address,
        /// What went wrong.
        reason: String,
    },
}

/// Executes contract calls on behalf of the chest.
pub trait CallExecutor {
    /// Executes `call` and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the call did not take effect.
    fn execute(&mut self, call: &TransferCall) -> Result<(), ExecutionError>;
}

/// Gateway that moves assets through token contract calls.
#[derive(Debug)]
pub struct CalldataGateway<E> {
    /// The chest's on-chain address.
    chest: Address,
    /// Call executor.
    executor: E,
}

impl<E: CallExecutor> CalldataGateway<E> {
    /// Creates a gateway for the chest at `chest`.
    #[must_use]
    pub const fn new(chest: Address, executor: E) -> Self {
        Self { chest, executor }
    }

    /// The chest's on-chain address.
    #[inline]
    #[must_use]
    pub const fn chest(&self) -> Address {
        self.chest
    }

    /// The executor.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Consumes the gateway, returning the executor.
    #[must_use]
    pub fn into_executor(self) -> E {
        self.executor
    }

    fn call(&mut self, direction: Direction, transfer: &Transfer) -> Result<(), TransferFailed> {
        let call = TransferCall::for_transfer(direction, self.chest, transfer);
        tracing::debug!(
            "{} call to {}: {} bytes",
            direction,
            call.target,
            call.calldata.len()
        );
        self.executor
            .execute(&call)
            .map_err(|e| TransferFailed::new(e.to_string()))
    }
}

impl<E: CallExecutor> TransferGateway for CalldataGateway<E> {
    fn pull_in(&mut self, transfer: &Transfer) -> Result<(), TransferFailed> {
        self.call(Direction::Deposit, transfer)
    }

    fn push_out(&mut self, transfer: &Transfer) -> Result<(), TransferFailed> {
        self.call(Direction::Withdraw, transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{IERC1155, IERC20};
    use alloy_primitives::U256;
    use alloy_sol_types::SolCall;
    use chest_shared::AssetKind;

    const CHEST: Address = Address::new([0xc0; 20]);
    const ALICE: Address = Address::new([0xa1; 20]);
    const TOKEN: Address = Address::new([0x20; 20]);

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Vec<TransferCall>,
        revert_next: bool,
    }

    impl CallExecutor for RecordingExecutor {
        fn execute(&mut self, call: &TransferCall) -> Result<(), ExecutionError> {
            if std::mem::take(&mut self.revert_next) {
                return Err(ExecutionError::Reverted {
                    target: call.target,
                    reason: "insufficient allowance".to_string(),
                });
            }
            self.calls.push(call.clone());
            Ok(())
        }
    }

    fn transfer(kind: AssetKind) -> Transfer {
        Transfer {
            asset: TOKEN,
            item: U256::from(2),
            quantity: U256::from(5),
            kind,
            counterparty: ALICE,
        }
    }

    #[test]
    fn test_directions_map_to_calls() {
        let mut gateway = CalldataGateway::new(CHEST, RecordingExecutor::default());

        gateway.pull_in(&transfer(AssetKind::SemiFungible)).unwrap();
        gateway.push_out(&transfer(AssetKind::Fungible)).unwrap();

        let calls = &gateway.executor().calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].selector(), Some(IERC1155::safeTransferFromCall::SELECTOR));
        assert_eq!(calls[1].selector(), Some(IERC20::transferCall::SELECTOR));
    }

    #[test]
    fn test_revert_becomes_transfer_failure() {
        let mut gateway = CalldataGateway::new(
            CHEST,
            RecordingExecutor {
                revert_next: true,
                ..RecordingExecutor::default()
            },
        );

        let err = gateway.pull_in(&transfer(AssetKind::Fungible)).unwrap_err();
        assert!(err.reason.contains("insufficient allowance"));
        assert!(gateway.into_executor().calls.is_empty());
    }
}
