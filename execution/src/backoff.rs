use rand::{rngs::OsRng, Rng, RngCore};
use std::{fmt, future::Future, time::Duration};

use crate::config::RetryPolicy;

pub(crate) fn jittered_backoff(rng: &mut impl RngCore, backoff: Duration) -> Duration {
    let backoff_ms = backoff.as_millis() as u64;
    if backoff_ms <= 1 {
        return backoff;
    }

    // "Equal jitter": delay is in [backoff/2, backoff].
    let half_ms = backoff_ms / 2;
    let jitter_ms = rng.gen_range(0..=half_ms);
    Duration::from_millis(half_ms.saturating_add(jitter_ms))
}

/// Run `op` until it succeeds or `policy.attempts` is exhausted, doubling the backoff.
pub(crate) async fn retry<T, E, F, Fut>(policy: &RetryPolicy, what: &'static str, op: F) -> Result<T, E>
where
    E: fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_if(policy, what, |_| true, op).await
}

/// [`retry`], giving up immediately on errors `retryable` rejects.
pub(crate) async fn retry_if<T, E, P, F, Fut>(
    policy: &RetryPolicy,
    what: &'static str,
    mut retryable: P,
    mut op: F,
) -> Result<T, E>
where
    E: fmt::Debug,
    P: FnMut(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = policy.base_backoff;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts.get() && retryable(&err) => {
                tracing::debug!(what, attempt, ?err, "store write failed, retrying");
                let delay = jittered_backoff(&mut OsRng, backoff);
                tokio::time::sleep(delay).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::{
        num::NonZeroUsize,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn test_jitter_stays_in_upper_half() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            let delay = jittered_backoff(&mut rng, Duration::from_millis(40));
            assert!(delay >= Duration::from_millis(20) && delay <= Duration::from_millis(40));
        }
        assert_eq!(
            jittered_backoff(&mut rng, Duration::from_millis(1)),
            Duration::from_millis(1)
        );
    }

    fn policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            attempts: NonZeroUsize::new(attempts).unwrap(),
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let value = retry(&policy(3), "flaky", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("not yet");
            }
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: anyhow::Result<()> = retry(&policy(2), "down", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("down")
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_if_stops_on_permanent_error() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), &str> = retry_if(
            &policy(5),
            "permanent",
            |err: &&str| *err == "transient",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("permanent")
            },
        )
        .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
