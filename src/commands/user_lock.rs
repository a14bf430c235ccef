use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use log::warn;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::Error;
use crate::domain::UserId;

/// Lazily-populated registry of one mutation lock per user
///
/// Waiters on the same user are served in FIFO order. Users never share a lock.
#[derive(Debug, Default)]
pub(crate) struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

/// Proof that the caller holds the mutation lock of a user
#[derive(Debug)]
pub(crate) struct UserLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl UserLocks {
    /// Acquire the lock of `user_id`, waiting at most `timeout` if provided
    pub async fn acquire(
        &self,
        user_id: UserId,
        timeout: Option<Duration>,
    ) -> Result<UserLockGuard, Error> {
        let lock = self.handle(user_id);

        let guard = match timeout {
            None => lock.lock_owned().await,
            Some(waited) => tokio::time::timeout(waited, lock.lock_owned())
                .await
                .map_err(|_| {
                    warn!("gave up waiting {waited:?} for the lock of user {user_id}");
                    Error::Contention { user_id, waited }
                })?,
        };

        Ok(UserLockGuard { _guard: guard })
    }

    /// Drop the handles nobody holds or waits on
    ///
    /// Returns the number of removed handles.
    pub fn release_idle(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = locks.len();
        // The registry owns one reference; any other one belongs to a holder or a waiter.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    fn handle(&self, user_id: UserId) -> Arc<AsyncMutex<()>> {
        // The map only stores handles, so it stays valid even if a holder panicked.
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id)
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speculoos::prelude::*;

    #[tokio::test]
    async fn test_same_user_times_out() {
        let locks = UserLocks::default();
        let _held = locks.acquire(UserId(1), None).await.unwrap();

        let res = locks
            .acquire(UserId(1), Some(Duration::from_millis(10)))
            .await;

        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::Contention { user_id, .. } if *user_id == UserId(1))
        });
    }

    #[tokio::test]
    async fn test_other_user_does_not_block() {
        let locks = UserLocks::default();
        let _held = locks.acquire(UserId(1), None).await.unwrap();

        let res = locks
            .acquire(UserId(2), Some(Duration::from_millis(10)))
            .await;

        assert_that!(res).is_ok();
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let locks = UserLocks::default();
        drop(locks.acquire(UserId(1), None).await.unwrap());

        let res = locks
            .acquire(UserId(1), Some(Duration::from_millis(10)))
            .await;

        assert_that!(res).is_ok();
    }

    #[tokio::test]
    async fn test_release_idle() {
        // GIVEN a held lock and an idle one
        let locks = UserLocks::default();
        let held = locks.acquire(UserId(1), None).await.unwrap();
        drop(locks.acquire(UserId(2), None).await.unwrap());

        // WHEN releasing idle locks
        let removed = locks.release_idle();

        // THEN
        // * only the idle one is removed
        // * the held one goes once released
        assert_that!(removed).is_equal_to(1);
        assert_that!(locks.release_idle()).is_equal_to(0);
        drop(held);
        assert_that!(locks.release_idle()).is_equal_to(1);
    }
}
