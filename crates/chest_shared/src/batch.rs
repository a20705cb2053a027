//! Batch request types.
//!
//! A batch is an ordered list of legs moving in one direction. Callers that
//! speak the contract ABI pass three parallel arrays instead; see
//! [`BatchRequest::from_columns`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::{AssetId, ItemId, Quantity};

/// Which way a batch moves assets relative to custody.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Assets move into custody.
    Deposit,
    /// Assets leave custody ("loot").
    Withdraw,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => f.write_str("deposit"),
            Self::Withdraw => f.write_str("withdraw"),
        }
    }
}

/// One requested movement of a single (asset, item) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLeg {
    /// Asset contract.
    pub asset: AssetId,
    /// Item inside the asset contract.
    pub item: ItemId,
    /// Amount to move.
    pub quantity: Quantity,
}

impl BatchLeg {
    /// Creates a new leg.
    #[inline]
    #[must_use]
    pub const fn new(asset: AssetId, item: ItemId, quantity: Quantity) -> Self {
        Self {
            asset,
            item,
            quantity,
        }
    }
}

/// Parallel input arrays of different lengths.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("column `{column}` has {found} entries, expected {expected}")]
pub struct LengthMismatch {
    /// Name of the column that does not match the first one.
    pub column: &'static str,
    /// Length of the first column.
    pub expected: usize,
    /// Length of the offending column.
    pub found: usize,
}

impl LengthMismatch {
    /// Checks that `column` has `expected` entries.
    ///
    /// # Errors
    ///
    /// Returns the mismatch when the lengths differ.
    pub const fn check(column: &'static str, expected: usize, found: usize) -> Result<(), Self> {
        if expected == found {
            Ok(())
        } else {
            Err(Self {
                column,
                expected,
                found,
            })
        }
    }
}

/// An ordered set of legs, all moving in the same direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Direction shared by every leg.
    pub direction: Direction,
    /// Legs in submission order.
    pub legs: Vec<BatchLeg>,
}

impl BatchRequest {
    /// Creates a request from legs.
    #[must_use]
    pub fn new(direction: Direction, legs: Vec<BatchLeg>) -> Self {
        Self { direction, legs }
    }

    /// Creates a deposit request.
    #[must_use]
    pub fn deposit(legs: Vec<BatchLeg>) -> Self {
        Self::new(Direction::Deposit, legs)
    }

    /// Creates a withdrawal request.
    #[must_use]
    pub fn withdraw(legs: Vec<BatchLeg>) -> Self {
        Self::new(Direction::Withdraw, legs)
    }

    /// Builds a request from the `tokens[]`, `ids[]`, `amounts[]` shape.
    ///
    /// # Errors
    ///
    /// Returns [`LengthMismatch`] naming the first column whose length
    /// differs from `assets`.
    pub fn from_columns(
        direction: Direction,
        assets: &[AssetId],
        items: &[ItemId],
        quantities: &[Quantity],
    ) -> Result<Self, LengthMismatch> {
        LengthMismatch::check("items", assets.len(), items.len())?;
        LengthMismatch::check("quantities", assets.len(), quantities.len())?;

        let legs = assets
            .iter()
            .zip(items)
            .zip(quantities)
            .map(|((&asset, &item), &quantity)| BatchLeg::new(asset, item, quantity))
            .collect();

        Ok(Self::new(direction, legs))
    }

    /// Number of legs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.legs.len()
    }

    /// Returns true if the request has no legs.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}
