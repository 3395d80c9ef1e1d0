//! Bounded retry of serializable transactions that lost a conflict.

use crate::error::{AppError, AppResult};
use std::future::Future;
use tracing::warn;

/// Run `attempt` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` runs have ended in `TransientConflict`.
///
/// Each run must open its own transaction; nothing is carried between runs.
pub async fn retry_transient<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    mut attempt: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut run = 1;

    loop {
        match attempt().await {
            Err(AppError::TransientConflict(reason)) if run < max_attempts => {
                warn!(operation, run, max_attempts, %reason, "Serialization conflict, retrying");
                run += 1;
                tokio::task::yield_now().await;
            }
            other => return other,
        }
    }
}

/// Extra runs allowed while conflicts keep coming with visible progress.
const PROGRESS_RUN_CEILING: u32 = 64;

/// Like [`retry_transient`], but a conflict only uses up an attempt when
/// `progress` reads the same value it read after the previous conflict.
///
/// Losing to a writer whose commit is visible in `progress` is not a stall.
/// Those runs are bounded separately by `PROGRESS_RUN_CEILING`.
pub async fn retry_transient_while_progressing<T, P, F, Fut, G, GFut>(
    operation: &str,
    max_attempts: u32,
    mut attempt: F,
    mut progress: G,
) -> AppResult<T>
where
    P: PartialEq,
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    G: FnMut() -> GFut,
    GFut: Future<Output = AppResult<P>>,
{
    let max_attempts = max_attempts.max(1);
    let mut stalled = 0;
    let mut progressed = 0;
    let mut last_seen: Option<P> = None;

    loop {
        match attempt().await {
            Err(AppError::TransientConflict(reason)) => {
                let seen = progress().await?;
                let moved = last_seen.as_ref().is_some_and(|prev| *prev != seen);

                if moved && progressed < PROGRESS_RUN_CEILING {
                    progressed += 1;
                } else {
                    stalled += 1;
                }
                if stalled >= max_attempts {
                    return Err(AppError::TransientConflict(reason));
                }

                warn!(operation, stalled, progressed, max_attempts, %reason, "Serialization conflict, retrying");
                last_seen = Some(seen);
                tokio::task::yield_now().await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_transient("test", 3, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::TransientConflict("conflict".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_surfaces_conflict_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: AppResult<()> = retry_transient("test", 3, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::TransientConflict("conflict".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::TransientConflict(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: AppResult<()> = retry_transient("test", 5, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::InvalidState("already completed".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::InvalidState(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_does_not_use_up_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        // Every run conflicts, but the ledger moves between the first five.
        let result = retry_transient_while_progressing(
            "test",
            2,
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 5 {
                    Err(AppError::TransientConflict("conflict".to_string()))
                } else {
                    Ok("settled")
                }
            },
            move || async move { Ok(calls.load(Ordering::SeqCst)) },
        )
        .await;

        assert_eq!(result.unwrap(), "settled");
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_stalled_conflicts_use_up_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: AppResult<()> = retry_transient_while_progressing(
            "test",
            3,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::TransientConflict("conflict".to_string()))
            },
            || async { Ok(0u32) },
        )
        .await;

        assert!(matches!(result, Err(AppError::TransientConflict(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_progress_reads_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: AppResult<()> = retry_transient_while_progressing(
            "test",
            2,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::TransientConflict("conflict".to_string()))
            },
            move || async move { Ok(calls.load(Ordering::SeqCst)) },
        )
        .await;

        assert!(matches!(result, Err(AppError::TransientConflict(_))));
        assert_eq!(counter.load(Ordering::SeqCst), PROGRESS_RUN_CEILING + 2);
    }
}
