//! Bounded fixed-interval retry.

use std::future::Future;
use std::time::Duration;

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }
}

/// Outcome of an exhausted retry: the attempt count and the last error.
#[derive(Debug, Clone, PartialEq)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `op` until it succeeds or the policy's attempts are used up,
/// sleeping `interval` between attempts (never after the last one).
///
/// `on_failure` sees the 1-based attempt number and the error of each
/// failed attempt.
pub async fn retry_fixed<T, E, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
    mut on_failure: impl FnMut(u32, &E),
) -> Result<T, Exhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                on_failure(attempt, &err);
                if attempt >= policy.attempts {
                    return Err(Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
            }
        }
        attempt += 1;
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0u32);
        let mut seen = Vec::new();
        let result = retry_fixed(
            RetryPolicy::fixed(5, Duration::ZERO),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(format!("refused {}", n))
                    } else {
                        Ok(n)
                    }
                }
            },
            |attempt, _err: &String| seen.push(attempt),
        )
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn gives_up_after_all_attempts() {
        let calls = Cell::new(0u32);
        let result: Result<(), _> = retry_fixed(
            RetryPolicy::fixed(4, Duration::from_millis(1)),
            || {
                calls.set(calls.get() + 1);
                async { Err("down") }
            },
            |_, _| {},
        )
        .await;
        assert_eq!(
            result,
            Err(Exhausted {
                attempts: 4,
                last: "down"
            })
        );
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_interval_between_attempts_only() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = retry_fixed(
            RetryPolicy::fixed(3, Duration::from_secs(5)),
            || async { Err(()) },
            |_, _| {},
        )
        .await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).attempts, 1);
    }
}
