//! Auth pump — one-shot authentication deadline.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::connection::Command;

/// Submits [`Command::AuthDeadline`] once after the grace period,
/// unless cancelled first (by successful authentication or teardown).
/// Never reactivates.
pub(crate) async fn auth_pump(
    cmd_tx: mpsc::Sender<Command>,
    grace_period: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(grace_period) => {
            let _ = cmd_tx.send(Command::AuthDeadline).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn auth_pump_fires_once_after_grace() {

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(auth_pump(tx, Duration::from_secs(5), cancel));
        // Let the pump arm its sleep at t0.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        tokio::time::advance(Duration::from_secs(5)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(rx.try_recv(), Ok(Command::AuthDeadline)));
        handle.await.expect("no panic");
        // One-shot: the task is done, nothing further arrives.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn auth_pump_cancel_suppresses_deadline() {

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(auth_pump(tx, Duration::from_secs(5), cancel.clone()));

        cancel.cancel();
        handle.await.expect("no panic");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
