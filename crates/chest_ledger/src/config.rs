//! # Chest Configuration
//!
//! Loaded once from a TOML file:
//!
//! ```toml
//! name = "My beautiful chest"
//! symbol = "gw3s"
//! owner = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
//! open_deposits = true
//! max_batch_legs = 256
//! journal_path = "chest.journal"
//! ```

use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::batch::DEFAULT_MAX_BATCH_LEGS;
use crate::error::{LedgerError, LedgerResult};

/// Settings of one chest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChestConfig {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Short symbol.
    #[serde(default)]
    pub symbol: String,
    /// Account allowed to administer and loot the chest.
    pub owner: Address,
    /// Whether anyone may deposit, or only the owner.
    #[serde(default = "default_open_deposits")]
    pub open_deposits: bool,
    /// Upper bound on legs per batch.
    #[serde(default = "default_max_batch_legs")]
    pub max_batch_legs: usize,
    /// Journal file. No persistence when absent.
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

const fn default_open_deposits() -> bool {
    true
}

const fn default_max_batch_legs() -> usize {
    DEFAULT_MAX_BATCH_LEGS
}

impl ChestConfig {
    /// In-memory chest owned by `owner`, with default settings.
    #[must_use]
    pub fn new(owner: Address) -> Self {
        Self {
            name: String::new(),
            symbol: String::new(),
            owner,
            open_deposits: default_open_deposits(),
            max_batch_legs: default_max_batch_legs(),
            journal_path: None,
        }
    }

    /// Sets the journal file.
    #[must_use]
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the document does not parse or a value is
    /// out of range.
    pub fn from_toml_str(source: &str) -> LedgerResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| LedgerError::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_toml_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first bad value.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.max_batch_legs == 0 {
            return Err(LedgerError::InvalidConfig(
                "max_batch_legs must be at least 1".to_string(),
            ));
        }
        if self.owner.is_zero() {
            return Err(LedgerError::InvalidConfig(
                "owner must not be the zero address".to_string(),
            ));
        }
        Ok(())
    }
}
