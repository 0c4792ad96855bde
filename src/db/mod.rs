pub mod models;
pub mod pool;
pub mod queries;

use std::future::Future;

use tracing::warn;

use crate::error::{BotError, Result};

/// Run a statement, retrying once after a connection-level failure.
/// A second failure propagates and aborts the calling tick.
pub async fn retry_once<T, F, Fut>(op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(BotError::Database(e)) if is_connection_error(&e) => {
            warn!(error = %e, "database connection error, retrying once");
            op().await
        }
        other => other,
    }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_connection_errors_exactly_once() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_once(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BotError::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_connection_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_once(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BotError::Database(sqlx::Error::PoolTimedOut))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_connection_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_once(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BotError::Database(sqlx::Error::RowNotFound))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
