use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use log::warn;
use tower::Service;

use super::{validate, Error, PointLedger};
use crate::{
    domain::{TransactionKind, UserBalance, UserId},
    ports::{balance::BalanceStorePort, history::HistoryLogPort},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UseRequest {
    pub user_id: UserId,
    pub amount: u64,
}

impl<B, H> PointLedger<B, H>
where
    B: BalanceStorePort + 'static,
    H: HistoryLogPort + 'static,
{
    /// Remove `amount` points from the balance of `user_id`
    ///
    /// Fails with [`Error::InsufficientBalance`] rather than letting the balance go negative.
    pub async fn use_points(&self, user_id: UserId, amount: u64) -> Result<UserBalance, Error> {
        validate(user_id, amount)?;

        self.mutate(user_id, TransactionKind::Use, amount, move |current| {
            TransactionKind::Use
                .apply(current.points, amount)
                .ok_or_else(|| {
                    warn!(
                        "user {user_id}: cannot use {amount} points out of {}",
                        current.points
                    );
                    Error::InsufficientBalance {
                        user_id,
                        current: current.points,
                        requested: amount,
                    }
                })
        })
        .await
    }
}

impl<B, H> Service<UseRequest> for PointLedger<B, H>
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

    fn call(&mut self, req: UseRequest) -> Self::Future {
        let ledger = self.clone();
        Box::pin(async move { ledger.use_points(req.user_id, req.amount).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::balance::memory::MemoryBalanceStore,
        commands::test_support::memory_ledger,
        config::LedgerConfig,
        ports::history::{self, MockHistoryLogPort},
    };
    use mockall::predicate::*;
    use rstest::*;
    use speculoos::prelude::*;
    use std::{sync::Arc, time::Duration};
    use tower::{BoxError, ServiceExt};

    #[fixture]
    fn user_id() -> UserId {
        UserId(2)
    }

    #[rstest]
    #[tokio::test]
    async fn test_use(user_id: UserId) -> Result<(), BoxError> {
        // GIVEN a user with 100 points
        let ledger = memory_ledger(LedgerConfig::default());
        ledger.charge(user_id, 100).await?;

        // WHEN using part of them
        let res = ledger.use_points(user_id, 40).await;

        // THEN the balance decreases and a USE record is appended
        assert_that!(res).is_ok().matches(|balance| balance.points == 60);
        let history = ledger.get_history(user_id).await?;
        assert_that!(history).has_length(2);
        assert_that!(history[1].kind).is_equal_to(TransactionKind::Use);
        assert_that!(history[1].amount).is_equal_to(40);
        assert_that!(history[1].resulting_balance).is_equal_to(60);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_use_everything(user_id: UserId) -> Result<(), BoxError> {
        let ledger = memory_ledger(LedgerConfig::default());
        ledger.charge(user_id, 100).await?;

        let res = ledger.use_points(user_id, 100).await;

        assert_that!(res).is_ok().matches(|balance| balance.points == 0);

        Ok(())
    }

    #[rstest]
    #[case::never_charged(0, 1)]
    #[case::one_over(100, 101)]
    #[tokio::test]
    async fn test_use_insufficient_has_no_side_effect(
        user_id: UserId,
        #[case] charged: u64,
        #[case] requested: u64,
    ) -> Result<(), BoxError> {
        // GIVEN a user with `charged` points
        let ledger = memory_ledger(LedgerConfig::default());
        if charged > 0 {
            ledger.charge(user_id, charged).await?;
        }
        let history_before = ledger.get_history(user_id).await?;

        // WHEN using more than available
        let res = ledger.use_points(user_id, requested).await;

        // THEN
        // * it fails with InsufficientBalance
        // * the balance and the history are unchanged
        assert_that!(res).is_err().matches(|err| {
            matches!(
                err,
                Error::InsufficientBalance { current, requested: r, .. }
                    if *current == charged && *r == requested
            )
        });
        let balance = ledger.get_balance(user_id).await?;
        assert_that!(balance.points).is_equal_to(charged);
        let history_after = ledger.get_history(user_id).await?;
        assert_that!(history_after).is_equal_to(history_before);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_use_zero(user_id: UserId) {
        let ledger = memory_ledger(LedgerConfig::default());

        let res = ledger.use_points(user_id, 0).await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InvalidAmount(0)));
    }

    #[rstest]
    #[tokio::test]
    async fn test_use_history_failure_restores_balance(
        user_id: UserId,
    ) -> Result<(), BoxError> {
        // GIVEN
        // * a balance store holding 300 points
        // * a history log that is unavailable
        let balances = MemoryBalanceStore::default();
        balances.insert_or_update(user_id, 300).await?;
        let mut history = MockHistoryLogPort::new();
        history
            .expect_insert()
            .times(1)
            .with(eq(user_id), eq(TransactionKind::Use), eq(100), eq(200))
            .returning(|_, _, _, _| Err(history::Error::Adapter("log unavailable".into())));
        let ledger = PointLedger::new(
            Arc::new(balances.clone()),
            Arc::new(history),
            LedgerConfig::default(),
        );

        // WHEN using points
        let res = ledger.use_points(user_id, 100).await;

        // THEN the error is surfaced and the previous balance is kept
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::HistoryLog(_)));
        assert_that!(balances.select_by_id(user_id).await?.points).is_equal_to(300);

        Ok(())
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_use_contention_timeout(user_id: UserId) -> Result<(), BoxError> {
        // GIVEN a ledger that waits at most 20ms for a user's lock
        let ledger =
            memory_ledger(LedgerConfig::default().with_lock_timeout(Duration::from_millis(20)));

        // WHEN a mutation arrives while someone else holds the lock
        let guard = ledger.locks.acquire(user_id, None).await?;
        let contender = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.use_points(user_id, 10).await })
        };
        let res = contender.await?;
        drop(guard);

        // THEN it gives up with a contention error, without touching the balance
        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::Contention { waited, .. } if *waited == Duration::from_millis(20))
        });
        assert_that!(ledger.get_balance(user_id).await?.points).is_equal_to(0);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_call(user_id: UserId) -> Result<(), BoxError> {
        let ledger = memory_ledger(LedgerConfig::default());
        ledger.charge(user_id, 30).await?;

        let res = ledger
            .clone()
            .oneshot(UseRequest {
                user_id,
                amount: 30,
            })
            .await;

        assert_that!(res).is_ok().matches(|balance| balance.points == 0);

        Ok(())
    }
}
