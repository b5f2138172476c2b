//! Bounded retry for partially processed batch operations.
//!
//! Remote batch APIs may accept only part of a request under load and hand
//! the rest back as "unprocessed". [`drain_batch`] keeps resubmitting just
//! that remainder, backing off between attempts, until nothing is left or
//! the attempt budget is spent.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::RetryConfig;

/// Attempt budget and backoff for [`drain_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total submissions, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the given retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Result of one batch submission.
#[derive(Debug)]
pub struct BatchOutcome<T, R> {
    /// Results for the items the backend handled
    pub processed: Vec<R>,
    /// Items to submit again
    pub unprocessed: Vec<T>,
}

impl<T, R> BatchOutcome<T, R> {
    pub fn complete(processed: Vec<R>) -> Self {
        Self {
            processed,
            unprocessed: Vec::new(),
        }
    }
}

/// Submit `items` through `op` until the backend reports nothing unprocessed.
///
/// Results from every attempt are accumulated in submission order. Fails
/// with [`AppError::PartialBatch`] once `policy.max_attempts` submissions
/// still leave items behind; errors from `op` are returned immediately.
pub async fn drain_batch<T, R, F, Fut>(
    policy: &RetryPolicy,
    items: Vec<T>,
    mut op: F,
) -> Result<Vec<R>>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<BatchOutcome<T, R>>>,
{
    let mut results = Vec::new();
    let mut pending = items;
    let mut attempts = 0;

    while !pending.is_empty() {
        if attempts >= policy.max_attempts {
            return Err(AppError::PartialBatch {
                remaining: pending.len(),
                attempts,
            });
        }
        if attempts > 0 {
            let delay = policy.backoff(attempts);
            log::debug!(
                "Resubmitting {} unprocessed item(s) after {:?} (attempt {})",
                pending.len(),
                delay,
                attempts + 1
            );
            tokio::time::sleep(delay).await;
        }

        let outcome = op(pending).await?;
        attempts += 1;
        results.extend(outcome.processed);
        pending = outcome.unprocessed;
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff(1), Duration::from_millis(10));
        assert_eq!(p.backoff(2), Duration::from_millis(20));
        assert_eq!(p.backoff(3), Duration::from_millis(25));
        assert_eq!(p.backoff(30), Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmits_only_the_remainder() {
        let submissions = RefCell::new(Vec::new());

        let results = drain_batch(&policy(5), vec![1, 2, 3, 4, 5], |batch: Vec<i32>| {
            submissions.borrow_mut().push(batch.clone());
            async move {
                // Backend handles at most two items per call
                let (done, rest) = batch.split_at(batch.len().min(2));
                Ok(BatchOutcome {
                    processed: done.iter().map(|n| n * 10).collect(),
                    unprocessed: rest.to_vec(),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(results, vec![10, 20, 30, 40, 50]);
        assert_eq!(
            submissions.into_inner(),
            vec![vec![1, 2, 3, 4, 5], vec![3, 4, 5], vec![5]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = RefCell::new(0);

        let result = drain_batch(&policy(3), vec!["a", "b"], |batch: Vec<&str>| {
            *calls.borrow_mut() += 1;
            async move {
                Ok(BatchOutcome::<&str, ()> {
                    processed: Vec::new(),
                    unprocessed: batch,
                })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(AppError::PartialBatch {
                remaining: 2,
                attempts: 3
            })
        ));
        assert_eq!(calls.into_inner(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_calls() {
        let results: Vec<()> = drain_batch(&policy(3), Vec::<u8>::new(), |_| async {
            Err::<BatchOutcome<u8, ()>, _>(AppError::remote_store("unexpected call"))
        })
        .await
        .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_operation_error_is_returned() {
        let result: Result<Vec<()>> = drain_batch(&policy(3), vec![1], |_| async {
            Err::<BatchOutcome<i32, ()>, _>(AppError::remote_store("throttled"))
        })
        .await;
        assert!(matches!(result, Err(AppError::RemoteStore(_))));
    }
}
