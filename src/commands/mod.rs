use std::{sync::Arc, time::Duration};

use log::{debug, error};

use crate::{
    config::LedgerConfig,
    domain::{PolicyViolation, TransactionKind, UserBalance, UserId},
    ports::{balance::BalanceStorePort, history::HistoryLogPort},
};
use user_lock::UserLocks;

pub mod charge;
pub mod queries;
pub mod use_points;
mod user_lock;

/// Coordinates every read and mutation of point balances
///
/// Mutations for one user run one at a time, in the order they reached the user's lock.
/// Mutations for different users never wait on each other. Reads never wait on mutations.
pub struct PointLedger<B, H> {
    balances: Arc<B>,
    history: Arc<H>,
    locks: Arc<UserLocks>,
    config: LedgerConfig,
}

impl<B, H> PointLedger<B, H>
where
    B: BalanceStorePort,
    H: HistoryLogPort,
{
    pub fn new(balances: Arc<B>, history: Arc<H>, config: LedgerConfig) -> Self {
        Self {
            balances,
            history,
            locks: Arc::default(),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Forget the locks of users with no mutation in flight
    ///
    /// The registry otherwise keeps one entry for every user that was ever mutated.
    pub fn release_idle_locks(&self) -> usize {
        self.locks.release_idle()
    }

    /// Run the read-validate-write-append section of a mutation for `user_id`
    ///
    /// Waiting for the lock can be cancelled without side effects. Once the lock is held, the
    /// section runs on its own task and always reaches the end, even if the caller's future is
    /// dropped, so the balance and the history are never left out of step.
    ///
    /// `next_points` computes the new balance from the current one, or rejects the mutation.
    async fn mutate<F>(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: u64,
        next_points: F,
    ) -> Result<UserBalance, Error>
    where
        B: 'static,
        H: 'static,
        F: FnOnce(&UserBalance) -> Result<u64, Error> + Send + 'static,
    {
        let lock = self.locks.acquire(user_id, self.config.lock_timeout).await?;

        let ledger = self.clone();
        let section = tokio::spawn(async move {
            let _lock = lock;
            let current = ledger.balances.select_by_id(user_id).await?;
            let points = next_points(&current)?;
            ledger.commit(current, kind, amount, points).await
        });

        section.await?
    }

    /// Write the new balance then append the matching record
    ///
    /// Must be called while holding the user's lock. If the append fails, `previous` is restored
    /// as is, `updated_at` included, so the balance keeps matching the history.
    ///
    /// Readers that skip the lock (`get_balance`) may observe the new points between the write
    /// and the restore. `audit` holds the lock and never does.
    async fn commit(
        &self,
        previous: UserBalance,
        kind: TransactionKind,
        amount: u64,
        points: u64,
    ) -> Result<UserBalance, Error> {
        let user_id = previous.user_id;
        let previous_points = previous.points;
        let updated = self.balances.insert_or_update(user_id, points).await?;

        if let Err(err) = self.history.insert(user_id, kind, amount, points).await {
            if let Err(restore_err) = self.balances.restore(previous).await {
                error!(
                    "user {user_id}: failed to restore balance {previous_points}: {restore_err}"
                );
            }
            return Err(err.into());
        }

        debug!("user {user_id}: {kind} {amount}, balance {previous_points} -> {points}");
        Ok(updated)
    }
}

impl<B, H> Clone for PointLedger<B, H> {
    fn clone(&self) -> Self {
        Self {
            balances: self.balances.clone(),
            history: self.history.clone(),
            locks: self.locks.clone(),
            config: self.config.clone(),
        }
    }
}

fn validate(user_id: UserId, amount: u64) -> Result<(), Error> {
    if !user_id.is_valid() {
        return Err(Error::InvalidUserId);
    }
    if amount == 0 {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(u64),

    #[error("user id must be positive")]
    InvalidUserId,

    #[error("user {user_id} has {current} points, cannot use {requested}")]
    InsufficientBalance {
        user_id: UserId,
        current: u64,
        requested: u64,
    },

    #[error("policy violation: {0}")]
    PolicyViolation(#[from] PolicyViolation),

    /// The user's lock could not be acquired in time
    #[error("user {user_id} is busy, waited {waited:?}")]
    Contention { user_id: UserId, waited: Duration },

    #[error("balance store error: {0:?}")]
    BalanceStore(#[from] crate::ports::balance::Error),
    #[error("history log error: {0:?}")]
    HistoryLog(#[from] crate::ports::history::Error),

    /// The task running the critical section panicked or was shut down
    #[error("mutation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
