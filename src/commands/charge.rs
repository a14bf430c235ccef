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
pub struct ChargeRequest {
    pub user_id: UserId,
    pub amount: u64,
}

impl<B, H> PointLedger<B, H>
where
    B: BalanceStorePort + 'static,
    H: HistoryLogPort + 'static,
{
    /// Add `amount` points to the balance of `user_id`
    ///
    /// Returns the new balance. Rejected charges leave both the balance and the history untouched.
    pub async fn charge(&self, user_id: UserId, amount: u64) -> Result<UserBalance, Error> {
        validate(user_id, amount)?;
        if let Err(violation) = self.config.policy.check_charge_amount(amount) {
            warn!("user {user_id}: rejected charge: {violation}");
            return Err(violation.into());
        }

        let policy = self.config.policy;
        self.mutate(user_id, TransactionKind::Charge, amount, move |current| {
            policy
                .charged_balance(current.points, amount)
                .map_err(|violation| {
                    warn!("user {user_id}: rejected charge: {violation}");
                    violation.into()
                })
        })
        .await
    }
}

impl<B, H> Service<ChargeRequest> for PointLedger<B, H>
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

    fn call(&mut self, req: ChargeRequest) -> Self::Future {
        let ledger = self.clone();
        Box::pin(async move { ledger.charge(req.user_id, req.amount).await })
    }
}
