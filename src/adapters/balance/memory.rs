use crate::{
    adapters::{simulate_latency, ErasedPoisonError},
    domain::{UserBalance, UserId},
    ports::balance::{BalanceStorePort, Error},
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

#[derive(Clone, Debug)]
pub struct MemoryBalanceStore {
    balances: Arc<Mutex<HashMap<UserId, UserBalance>>>,
    /// Delay applied before every operation
    latency: Option<Duration>,
}

impl MemoryBalanceStore {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl BalanceStorePort for MemoryBalanceStore {
    async fn select_by_id(&self, user_id: UserId) -> Result<UserBalance, Error> {
        simulate_latency(self.latency).await;

        let balance = self
            .balances
            .lock()?
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserBalance::new(user_id));

        Ok(balance)
    }

    async fn insert_or_update(&self, user_id: UserId, points: u64) -> Result<UserBalance, Error> {
        simulate_latency(self.latency).await;

        let balance = UserBalance {
            user_id,
            points,
            updated_at: Utc::now(),
        };
        self.balances.lock()?.insert(user_id, balance.clone());

        Ok(balance)
    }

    async fn restore(&self, balance: UserBalance) -> Result<(), Error> {
        simulate_latency(self.latency).await;

        self.balances.lock()?.insert(balance.user_id, balance);

        Ok(())
    }
}

impl Default for MemoryBalanceStore {
    fn default() -> Self {
        Self {
            balances: Arc::new(Mutex::new(HashMap::new())),
            latency: None,
        }
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError::from(err)))
    }
}
