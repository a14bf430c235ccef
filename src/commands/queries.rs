use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use log::warn;
use tower::Service;

use super::{Error, PointLedger};
use crate::{
    domain::{replay, TransactionRecord, UserBalance, UserId},
    ports::{balance::BalanceStorePort, history::HistoryLogPort},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceQuery {
    pub user_id: UserId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    pub user_id: UserId,
}

/// Comparison between a user's balance and the replay of their history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditReport {
    pub user_id: UserId,
    /// Points held by the balance store
    pub balance: u64,
    /// Points obtained by replaying the history, `None` if the history is inconsistent with itself
    pub replayed: Option<u64>,
    pub record_count: usize,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.replayed == Some(self.balance)
    }
}

impl<B, H> PointLedger<B, H>
where
    B: BalanceStorePort,
    H: HistoryLogPort,
{
    /// Current balance, without waiting on in-flight mutations
    pub async fn get_balance(&self, user_id: UserId) -> Result<UserBalance, Error> {
        if !user_id.is_valid() {
            return Err(Error::InvalidUserId);
        }
        Ok(self.balances.select_by_id(user_id).await?)
    }

    /// Every transaction applied for the user, oldest first
    pub async fn get_history(&self, user_id: UserId) -> Result<Vec<TransactionRecord>, Error> {
        if !user_id.is_valid() {
            return Err(Error::InvalidUserId);
        }
        Ok(self.history.select_all_by_user_id(user_id).await?)
    }

    /// Check that replaying the history of the user gives back their balance
    ///
    /// Holds the user's lock so that no mutation lands between the two reads.
    pub async fn audit(&self, user_id: UserId) -> Result<AuditReport, Error> {
        if !user_id.is_valid() {
            return Err(Error::InvalidUserId);
        }
        let _lock = self.locks.acquire(user_id, self.config.lock_timeout).await?;

        let balance = self.balances.select_by_id(user_id).await?;
        let records = self.history.select_all_by_user_id(user_id).await?;

        let report = AuditReport {
            user_id,
            balance: balance.points,
            replayed: replay(&records),
            record_count: records.len(),
        };
        if !report.is_consistent() {
            warn!("user {user_id}: history does not match balance: {report:?}");
        }

        Ok(report)
    }
}

impl<B, H> Service<BalanceQuery> for PointLedger<B, H>
where
    B: BalanceStorePort + 'static,
    H: HistoryLogPort + 'static,
{
    type Response = UserBalance;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BalanceQuery) -> Self::Future {
        let ledger = self.clone();
        Box::pin(async move { ledger.get_balance(req.user_id).await })
    }
}

impl<B, H> Service<HistoryQuery> for PointLedger<B, H>
where
    B: BalanceStorePort + 'static,
    H: HistoryLogPort + 'static,
{
    type Response = Vec<TransactionRecord>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HistoryQuery) -> Self::Future {
        let ledger = self.clone();
        Box::pin(async move { ledger.get_history(req.user_id).await })
    }
}
