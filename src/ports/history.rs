use crate::domain::{TransactionKind, TransactionRecord, UserId};

/// Append-only log of applied transactions
#[mockall::automock]
#[async_trait::async_trait]
pub trait HistoryLogPort: Send + Sync {
    /// Append a record
    ///
    /// The log assigns the ordering key and the timestamp of the returned record.
    async fn insert(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: u64,
        resulting_balance: u64,
    ) -> Result<TransactionRecord, Error>;

    /// All records of the user, oldest first
    async fn select_all_by_user_id(&self, user_id: UserId)
        -> Result<Vec<TransactionRecord>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
