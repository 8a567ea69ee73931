//! Retry with exponential backoff.
//!
//! Every remote call in the pipeline (staging upload, staged-object delete,
//! inference) goes through [`RetryPolicy::run`]. The delay before retry `n`
//! (0-based count of failures so far) is `base_delay * 2^n`; with the 1.5 s
//! inference default and three attempts the waits are 1.5 s then 3 s.
//! No sleep follows the final failed attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded attempts with doubling backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Treated as at least 1.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after the `failures`-th failure (0-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failures.min(16)))
    }

    /// Run `op` until it succeeds, the error is not retryable, or attempts
    /// run out.
    ///
    /// `op` receives the 0-based attempt number. Returns the final result
    /// together with the number of attempts actually made.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut op: F,
    ) -> (Result<T, E>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt + 1),
                Err(e) => {
                    let made = attempt + 1;
                    if made >= attempts || !is_retryable(&e) {
                        return (Err(e), made);
                    }
                    let backoff = self.delay_for(attempt);
                    warn!(
                        "{}: attempt {}/{} failed: {}; retry in {:.1}s",
                        label,
                        made,
                        attempts,
                        e,
                        backoff.as_secs_f64()
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_doubles() {
        let p = RetryPolicy::new(3, Duration::from_millis(1500));
        assert_eq!(p.delay_for(0), Duration::from_millis(1500));
        assert_eq!(p.delay_for(1), Duration::from_millis(3000));
        assert_eq!(p.delay_for(2), Duration::from_millis(6000));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let p = RetryPolicy::new(3, Duration::from_millis(1));
        let (res, made) = p
            .run("test", |_: &String| true, move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("boom".to_string())
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(res, Ok(7));
        assert_eq!(made, 3);
    }

    #[tokio::test]
    async fn gives_up_after_all_attempts() {
        let p = RetryPolicy::new(2, Duration::from_millis(1));
        let (res, made) = p
            .run("test", |_: &String| true, |n| async move {
                Err::<(), _>(format!("fail {n}"))
            })
            .await;
        assert_eq!(res, Err("fail 1".to_string()));
        assert_eq!(made, 2);
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let p = RetryPolicy::new(5, Duration::from_millis(1));
        let (res, made) = p
            .run("test", |_: &String| false, move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("permanent".to_string())
            })
            .await;
        assert!(res.is_err());
        assert_eq!(made, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
