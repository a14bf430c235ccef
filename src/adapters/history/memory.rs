use crate::{
    adapters::{simulate_latency, ErasedPoisonError},
    domain::{TransactionKind, TransactionRecord, UserId},
    ports::history::{Error, HistoryLogPort},
};
use chrono::Utc;
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// History log keeping every record in insertion order
///
/// The position of a record in the log determines its ordering key.
#[derive(Clone, Debug)]
pub struct MemoryHistoryLog {
    records: Arc<Mutex<Vec<TransactionRecord>>>,
    latency: Option<Duration>,
}

impl MemoryHistoryLog {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl HistoryLogPort for MemoryHistoryLog {
    async fn insert(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: u64,
        resulting_balance: u64,
    ) -> Result<TransactionRecord, Error> {
        simulate_latency(self.latency).await;

        let mut records = self.records.lock()?;
        let record = TransactionRecord {
            id: records.len() as u64 + 1,
            user_id,
            kind,
            amount,
            resulting_balance,
            timestamp: Utc::now(),
        };
        records.push(record.clone());

        Ok(record)
    }

    async fn select_all_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TransactionRecord>, Error> {
        simulate_latency(self.latency).await;

        let records = self
            .records
            .lock()?
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();

        Ok(records)
    }
}

impl Default for MemoryHistoryLog {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            latency: None,
        }
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError::from(err)))
    }
}
