//! # Contract Definitions
//!
//! Token interfaces the chest calls to move assets.

// The sol! macro generates code that we can't document, so allow missing_docs
#![allow(missing_docs)]

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{sol, SolCall};
use chest_ledger::Transfer;
use chest_shared::{AssetKind, Direction};

sol! {
    /// Fungible token.
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
    }
}

sol! {
    /// Non-fungible token.
    #[derive(Debug, PartialEq, Eq)]
    interface IERC721 {
        function transferFrom(address from, address to, uint256 tokenId) external;
    }
}

sol! {
    /// Multi-token.
    #[derive(Debug, PartialEq, Eq)]
    interface IERC1155 {
        function safeTransferFrom(
            address from,
            address to,
            uint256 id,
            uint256 amount,
            bytes data
        ) external;
    }
}

/// A contract call that performs one transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferCall {
    /// Token contract to call.
    pub target: Address,
    /// ABI-encoded call.
    pub calldata: Bytes,
}

impl TransferCall {
    /// Builds the call moving `transfer` in `direction`.
    ///
    /// Deposits pull from the counterparty into `chest`; withdrawals push
    /// from `chest` to the counterparty. Fungible pushes use `transfer`
    /// since the chest is the sender.
    #[must_use]
    pub fn for_transfer(direction: Direction, chest: Address, transfer: &Transfer) -> Self {
        let (from, to) = match direction {
            Direction::Deposit => (transfer.counterparty, chest),
            Direction::Withdraw => (chest, transfer.counterparty),
        };

        let calldata = match (transfer.kind, direction) {
            (AssetKind::Fungible, Direction::Deposit) => IERC20::transferFromCall {
                from,
                to,
                amount: transfer.quantity,
            }
            .abi_encode(),
            (AssetKind::Fungible, Direction::Withdraw) => IERC20::transferCall {
                to,
                amount: transfer.quantity,
            }
            .abi_encode(),
            (AssetKind::NonFungible, _) => IERC721::transferFromCall {
                from,
                to,
                tokenId: transfer.item,
            }
            .abi_encode(),
            (AssetKind::SemiFungible, _) => IERC1155::safeTransferFromCall {
                from,
                to,
                id: transfer.item,
                amount: transfer.quantity,
                data: Vec::new(),
            }
            .abi_encode(),
        };

        Self {
            target: transfer.asset,
            calldata: calldata.into(),
        }
    }

    /// The 4-byte function selector.
    #[must_use]
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.calldata.get(..4)?.try_into().ok()
    }
}
