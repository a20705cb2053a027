//! Asset identity.
//!
//! An asset is an external token contract, addressed by its contract
//! address. Inside a contract, an item id selects what is held: nothing for
//! fungible tokens, a unique token for non-fungible ones, a token class for
//! semi-fungible ones.

use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an external asset contract.
pub type AssetId = Address;

/// Identifier of an item inside an asset contract.
pub type ItemId = U256;

/// Held amount. Fungible amounts are in base units.
pub type Quantity = U256;

/// Item id used for every fungible holding.
pub const FUNGIBLE_ITEM: ItemId = U256::ZERO;

/// What kind of token an asset contract represents.
///
/// The discriminants are the numeric tags used by the whitelisting call.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Interchangeable balance, no item identity (ERC-20 style).
    Fungible = 1,
    /// Unique tokens, quantity is always 0 or 1 (ERC-721 style).
    NonFungible = 2,
    /// Token classes carrying a quantity (ERC-1155 style).
    SemiFungible = 3,
}

impl AssetKind {
    /// Returns the numeric tag of this kind.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Converts a numeric tag into a kind.
    #[inline]
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Fungible),
            2 => Some(Self::NonFungible),
            3 => Some(Self::SemiFungible),
            _ => None,
        }
    }

    /// Whether a single item of this kind can be held more than once.
    #[inline]
    #[must_use]
    pub const fn is_unique(self) -> bool {
        matches!(self, Self::NonFungible)
    }

    /// Whether holdings of this kind are keyed by [`FUNGIBLE_ITEM`] only.
    #[inline]
    #[must_use]
    pub const fn uses_item_ids(self) -> bool {
        !matches!(self, Self::Fungible)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fungible => "fungible",
            Self::NonFungible => "non-fungible",
            Self::SemiFungible => "semi-fungible",
        };
        f.write_str(name)
    }
}

/// A numeric kind tag outside 1..=3.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown asset kind tag {0}")]
pub struct UnknownKindTag(pub u8);

impl TryFrom<u8> for AssetKind {
    type Error = UnknownKindTag;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::from_tag(tag).ok_or(UnknownKindTag(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_match_whitelist_call() {
        assert_eq!(AssetKind::Fungible.tag(), 1);
        assert_eq!(AssetKind::NonFungible.tag(), 2);
        assert_eq!(AssetKind::SemiFungible.tag(), 3);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(AssetKind::try_from(0), Err(UnknownKindTag(0)));
        assert_eq!(AssetKind::try_from(4), Err(UnknownKindTag(4)));
        assert_eq!(AssetKind::try_from(2), Ok(AssetKind::NonFungible));
    }

    #[test]
    fn test_kind_rules() {
        assert!(AssetKind::NonFungible.is_unique());
        assert!(!AssetKind::SemiFungible.is_unique());
        assert!(!AssetKind::Fungible.uses_item_ids());
        assert!(AssetKind::SemiFungible.uses_item_ids());
    }

    #[test]
    fn test_display() {
        assert_eq!(AssetKind::SemiFungible.to_string(), "semi-fungible");
    }
}
