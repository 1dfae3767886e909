//! The long-running task contract.

use std::future::Future;
use std::time::Duration;

use openaedmap_source::retry::retry_exponential;
use tokio::sync::watch;

use crate::IngestError;

/// Backoff start for scheduled task retries.
pub const TASK_RETRY_START: Duration = Duration::from_secs(4);

/// Runs `run` forever with `delay` between iterations.
///
/// Each iteration is wrapped in an unbounded exponential-backoff retry,
/// so an upstream outage stalls the task instead of killing it. The
/// `started` channel flips to `true` after the first successful pass,
/// or immediately when `already_started` says the database holds fresh
/// enough state to serve from.
pub async fn run_task_loop<F, Fut>(
    label: &'static str,
    delay: Duration,
    started: watch::Sender<bool>,
    already_started: bool,
    mut run: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), IngestError>>,
{
    if already_started {
        let _ = started.send(true);
    }

    loop {
        if let Err(error) = retry_exponential(None, TASK_RETRY_START, label, || run()).await {
            // Unreachable without a deadline; logged in case that changes.
            log::error!("{label} gave up: {error}");
        }
        let _ = started.send(true);
        tokio::time::sleep(delay).await;
    }
}

/// Waits until a task loop reports itself started.
pub async fn wait_started(receiver: &mut watch::Receiver<bool>) {
    while !*receiver.borrow() {
        if receiver.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_started_returns_once_flag_flips() {
        let (sender, mut receiver) = watch::channel(false);
        let waiter = tokio::spawn(async move {
            wait_started(&mut receiver).await;
            true
        });

        sender.send(true).unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_started_is_immediate_when_already_set() {
        let (sender, mut receiver) = watch::channel(true);
        wait_started(&mut receiver).await;
        drop(sender);
    }
}
