//! # Whitelist Registry
//!
//! Authoritative list of trusted asset contracts and the kind each one is.
//!
//! Entries only appear through an explicit administrative call. A deposit
//! never whitelists anything implicitly.

use std::collections::BTreeMap;

use chest_shared::{AssetId, AssetKind, LengthMismatch};

use crate::error::{LedgerError, LedgerResult};

/// Trusted asset contracts, keyed by address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhitelistRegistry {
    entries: BTreeMap<AssetId, AssetKind>,
}

impl WhitelistRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds entries atomically.
    ///
    /// Re-adding an asset with the kind it already has is a no-op. Returns
    /// the assets that were not registered before, in call order.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEntry` if an asset is already registered, or listed
    /// earlier in the same call, with a different kind. Nothing is applied.
    pub fn add_whitelist(&mut self, entries: &[(AssetId, AssetKind)]) -> LedgerResult<Vec<AssetId>> {
        let mut pending: BTreeMap<AssetId, AssetKind> = BTreeMap::new();
        let mut added = Vec::new();

        for &(asset, kind) in entries {
            let existing = self
                .entries
                .get(&asset)
                .or_else(|| pending.get(&asset))
                .copied();

            match existing {
                Some(existing) if existing != kind => {
                    return Err(LedgerError::DuplicateEntry {
                        asset,
                        existing,
                        requested: kind,
                    });
                }
                Some(_) => {}
                None => {
                    pending.insert(asset, kind);
                    added.push(asset);
                }
            }
        }

        self.entries.extend(pending);
        Ok(added)
    }

    /// Adds entries given as parallel `addresses[]` and numeric `types[]`.
    ///
    /// # Errors
    ///
    /// - `LengthMismatch` if the columns differ in length
    /// - `UnknownKindTag` for a tag outside 1..=3
    /// - anything [`WhitelistRegistry::add_whitelist`] returns
    pub fn add_whitelist_tagged(&mut self, assets: &[AssetId], tags: &[u8]) -> LedgerResult<Vec<AssetId>> {
        let entries = tagged_entries(assets, tags)?;
        self.add_whitelist(&entries)
    }

    /// Kind of a whitelisted asset.
    #[inline]
    #[must_use]
    pub fn kind_of(&self, asset: &AssetId) -> Option<AssetKind> {
        self.entries.get(asset).copied()
    }

    /// Returns true if the asset is whitelisted.
    #[inline]
    #[must_use]
    pub fn contains(&self, asset: &AssetId) -> bool {
        self.entries.contains_key(asset)
    }

    /// Removes an asset. Existing holdings are not touched.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAsset` if the asset is not registered.
    pub fn remove(&mut self, asset: &AssetId) -> LedgerResult<AssetKind> {
        self.entries
            .remove(asset)
            .ok_or(LedgerError::UnknownAsset { asset: *asset })
    }

    /// Inserts an entry without checks. Used when replaying the journal.
    pub(crate) fn restore_entry(&mut self, asset: AssetId, kind: AssetKind) {
        self.entries.insert(asset, kind);
    }

    /// Entries in address order.
    pub fn entries(&self) -> impl Iterator<Item = (AssetId, AssetKind)> + '_ {
        self.entries.iter().map(|(asset, kind)| (*asset, *kind))
    }

    /// Number of whitelisted assets.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is whitelisted.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pairs addresses with the kinds their numeric tags name.
///
/// # Errors
///
/// Returns `LengthMismatch` or `UnknownKindTag`.
pub fn tagged_entries(assets: &[AssetId], tags: &[u8]) -> LedgerResult<Vec<(AssetId, AssetKind)>> {
    LengthMismatch::check("types", assets.len(), tags.len())?;

    assets
        .iter()
        .zip(tags)
        .map(|(&asset, &tag)| {
            AssetKind::try_from(tag)
                .map(|kind| (asset, kind))
                .map_err(LedgerError::from)
        })
        .collect()
}
