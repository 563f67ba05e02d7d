//! Construction-time ledger configuration.

use serde::Deserialize;
use thiserror::Error;

use custody_core::{Amount, DomainError};

pub const BANK_CAP_VAR: &str = "CUSTODY_BANK_CAP";
pub const WITHDRAWAL_LIMIT_VAR: &str = "CUSTODY_WITHDRAWAL_LIMIT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {var}: {source}")]
    Invalid {
        var: &'static str,
        #[source]
        source: DomainError,
    },

    #[error("malformed ledger configuration: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The two immutable limits of a ledger.
///
/// Neither limit is validated: a zero cap or a withdrawal limit above the cap
/// is accepted as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LedgerConfig {
    /// Maximum total value the ledger may hold.
    pub bank_cap: Amount,
    /// Maximum value removable in a single withdrawal.
    pub withdrawal_limit: Amount,
}

impl LedgerConfig {
    pub fn new(bank_cap: Amount, withdrawal_limit: Amount) -> Self {
        Self {
            bank_cap,
            withdrawal_limit,
        }
    }

    /// Read `CUSTODY_BANK_CAP` and `CUSTODY_WITHDRAWAL_LIMIT` (decimal integers).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Parse a JSON document such as `{"bank_cap": 10, "withdrawal_limit": 5}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |var: &'static str| -> Result<Amount, ConfigError> {
            let raw = lookup(var).ok_or(ConfigError::Missing(var))?;
            raw.parse()
                .map_err(|source| ConfigError::Invalid { var, source })
        };

        Ok(Self {
            bank_cap: read(BANK_CAP_VAR)?,
            withdrawal_limit: read(WITHDRAWAL_LIMIT_VAR)?,
        })
    }
}
