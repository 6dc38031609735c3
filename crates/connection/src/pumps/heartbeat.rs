//! Heartbeat pump — periodic liveness ticks.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::connection::Command;

/// Submits a heartbeat tick every `interval` until cancelled.
///
/// The first tick is skipped so the probe starts one full interval
/// after the pump starts. Ticks carry the heartbeat epoch so the actor
/// can drop ticks from a superseded pump after an interval change.
pub(crate) async fn heartbeat_pump(
    cmd_tx: mpsc::Sender<Command>,
    interval: Duration,
    epoch: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if cmd_tx.send(Command::HeartbeatTick { epoch }).await.is_err() {
                    break;
                }
            }
        }
    }
}
