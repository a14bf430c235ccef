//! Per-user point balances with concurrency-safe charge and use operations.
//!
//! [`PointLedger`] serializes every mutation of a user's balance behind a lock dedicated to that
//! user, validates it against a [`PointPolicy`], then writes the new balance and appends the
//! matching [`TransactionRecord`] to the history before releasing the lock. Storage is accessed
//! through the [`BalanceStorePort`] and [`HistoryLogPort`] traits; in-memory adapters are
//! provided in [`adapters`].

pub mod adapters;
pub mod commands;
pub mod config;
pub mod domain;
pub mod ports;

pub use commands::{
    charge::ChargeRequest,
    queries::{AuditReport, BalanceQuery, HistoryQuery},
    use_points::UseRequest,
    Error, PointLedger,
};
pub use config::LedgerConfig;
pub use domain::{
    PointPolicy, PolicyViolation, TransactionKind, TransactionRecord, UserBalance, UserId,
};
pub use ports::{balance::BalanceStorePort, history::HistoryLogPort};
