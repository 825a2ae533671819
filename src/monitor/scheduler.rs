use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::time::MissedTickBehavior;

use crate::monitor::controller::Autoheal;

/// Run one cycle per tick until a message arrives on `cancel_rx` (or all
/// senders are dropped). A cycle always runs to completion before
/// cancellation is looked at again.
pub async fn run(autoheal: &mut Autoheal, interval: Duration, mut cancel_rx: Receiver<()>) {
    log::info!("Starting docker autoheal monitor, checking every {interval:?}");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately. Wait a full interval instead.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.recv() => {
                log::info!("Exiting");
                break;
            }
            _ = ticker.tick() => {
                autoheal.run_cycle().await;
            }
        }
    }
}
