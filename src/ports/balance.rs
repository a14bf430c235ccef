use crate::domain::{UserBalance, UserId};

/// Storage for the current balance of each user
///
/// Implementations do not need to serialize concurrent writers: the ledger guarantees that only
/// one mutation per user reaches `insert_or_update` at a time.
#[mockall::automock]
#[async_trait::async_trait]
pub trait BalanceStorePort: Send + Sync {
    /// Current balance of the user, or a zero-value balance if the user never transacted
    async fn select_by_id(&self, user_id: UserId) -> Result<UserBalance, Error>;

    /// Set the balance of the user, creating it if needed
    async fn insert_or_update(&self, user_id: UserId, points: u64) -> Result<UserBalance, Error>;

    /// Put back a balance previously returned by the store, keeping its `updated_at`
    async fn restore(&self, balance: UserBalance) -> Result<(), Error>;
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
