use chrono::{DateTime, Utc};
use std::fmt;

/// Identifier of a point holder
///
/// Only positive values are valid. `0` is reserved and rejected by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl UserId {
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current point balance of a user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserBalance {
    pub user_id: UserId,

    /// Current amount of points
    pub points: u64,

    /// Time of the last mutation
    ///
    /// For a user that never transacted, this is the time the zero-value balance was produced.
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            points: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionKind {
    Charge,
    Use,
}

impl TransactionKind {
    /// Apply a transaction of this kind to `points`
    ///
    /// Returns `None` if the result would be negative or overflow.
    pub fn apply(&self, points: u64, amount: u64) -> Option<u64> {
        match self {
            TransactionKind::Charge => points.checked_add(amount),
            TransactionKind::Use => points.checked_sub(amount),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Charge => f.write_str("CHARGE"),
            TransactionKind::Use => f.write_str("USE"),
        }
    }
}

/// Entry of the history log
///
/// Records are immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Ordering key assigned by the history log
    pub id: u64,
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Number of points added or removed, always positive
    pub amount: u64,
    /// Balance immediately after this transaction was applied
    pub resulting_balance: u64,
    pub timestamp: DateTime<Utc>,
}

/// Replay a user's history from a zero balance
///
/// Returns the final balance, or `None` if any record's `resulting_balance` disagrees with the
/// running total, or if a record would drive the total below zero.
pub fn replay<'a, I>(records: I) -> Option<u64>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records.into_iter().try_fold(0u64, |points, record| {
        let next = record.kind.apply(points, record.amount)?;
        (next == record.resulting_balance).then_some(next)
    })
}

/// Limits applied to charges
///
/// Both limits are optional. With the default policy, only `u64` overflow is rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PointPolicy {
    /// Largest amount accepted by a single charge
    pub max_charge_amount: Option<u64>,
    /// Largest balance a user can hold
    pub max_balance: Option<u64>,
}

impl PointPolicy {
    /// Checks that only depend on the requested amount
    pub fn check_charge_amount(&self, amount: u64) -> Result<(), PolicyViolation> {
        match self.max_charge_amount {
            Some(limit) if amount > limit => {
                Err(PolicyViolation::ChargeLimitExceeded { limit, amount })
            }
            _ => Ok(()),
        }
    }

    /// Compute the balance after charging `amount` on top of `current`
    pub fn charged_balance(&self, current: u64, amount: u64) -> Result<u64, PolicyViolation> {
        let resulting = current
            .checked_add(amount)
            .ok_or(PolicyViolation::BalanceOverflow { current, amount })?;

        match self.max_balance {
            Some(limit) if resulting > limit => {
                Err(PolicyViolation::BalanceLimitExceeded { limit, resulting })
            }
            _ => Ok(resulting),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("charge of {amount} exceeds the single charge limit of {limit}")]
    ChargeLimitExceeded { limit: u64, amount: u64 },

    #[error("resulting balance {resulting} exceeds the balance limit of {limit}")]
    BalanceLimitExceeded { limit: u64, resulting: u64 },

    /// The balance cannot be represented anymore
    #[error("charging {amount} on top of {current} overflows the balance")]
    BalanceOverflow { current: u64, amount: u64 },
}
