//! Exponential-backoff retry for upstream operations.
//!
//! Every scheduled task and fetcher goes through [`retry_exponential`]
//! instead of retrying ad hoc. Sleeps double per attempt and are capped
//! at four hours; an optional deadline bounds the total time spent, after
//! which the last error propagates to the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use openaedmap_config::RETRY_MAX_SLEEP;

/// Runs `attempt` until it succeeds or the deadline is exhausted.
///
/// The closure is called on each attempt to build a fresh future. With
/// `deadline = None` the operation retries forever; this is the mode the
/// long-running ingest loops use to stay alive across upstream outages.
///
/// # Errors
///
/// Returns the last attempt's error once waiting any longer would
/// exceed `deadline`.
pub async fn retry_exponential<T, E, F, Fut>(
    deadline: Option<Duration>,
    start: Duration,
    label: &str,
    mut attempt: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let began = Instant::now();
    let mut sleep = start;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if let Some(deadline) = deadline
                    && began.elapsed() + sleep > deadline
                {
                    return Err(error);
                }
                log::warn!("{label} failed, retrying in {sleep:?}: {error}");
                tokio::time::sleep(sleep).await;
                sleep = (sleep * 2).min(RETRY_MAX_SLEEP);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> =
            retry_exponential(Some(Duration::from_secs(60)), Duration::from_millis(1), "test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 { Err("not yet") } else { Ok(n) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn propagates_error_past_deadline() {
        let result: Result<(), &str> = retry_exponential(
            Some(Duration::from_millis(5)),
            Duration::from_millis(10),
            "test",
            || async { Err("always") },
        )
        .await;

        assert_eq!(result.unwrap_err(), "always");
    }
}
