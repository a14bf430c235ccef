use std::time::Duration;

use crate::domain::PointPolicy;

const MAX_CHARGE_VAR: &str = "POINT_LEDGER_MAX_CHARGE";
const MAX_BALANCE_VAR: &str = "POINT_LEDGER_MAX_BALANCE";
const LOCK_TIMEOUT_VAR: &str = "POINT_LEDGER_LOCK_TIMEOUT_MS";

/// Settings of a [`PointLedger`](crate::commands::PointLedger)
///
/// The default configuration has no charge or balance cap and waits for user locks
/// indefinitely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerConfig {
    pub policy: PointPolicy,
    /// Longest time a mutation waits for the user's lock before failing with `Contention`
    pub lock_timeout: Option<Duration>,
}

impl LedgerConfig {
    pub fn with_policy(mut self, policy: PointPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = Some(lock_timeout);
        self
    }

    /// Read the configuration from `POINT_LEDGER_*` environment variables
    ///
    /// Unset or empty variables keep their default value.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |name: &'static str| -> Result<Option<u64>, Error> {
            match lookup(name) {
                None => Ok(None),
                Some(value) if value.trim().is_empty() => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|source| Error::InvalidValue {
                        name,
                        value,
                        source,
                    }),
            }
        };

        Ok(Self {
            policy: PointPolicy {
                max_charge_amount: parse(MAX_CHARGE_VAR)?,
                max_balance: parse(MAX_BALANCE_VAR)?,
            },
            lock_timeout: parse(LOCK_TIMEOUT_VAR)?.map(Duration::from_millis),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value {value:?} for {name}: {source}")]
    InvalidValue {
        name: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },
}
