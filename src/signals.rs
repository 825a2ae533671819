use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::mpsc::Sender;

/// What should we do when the user stops
/// this program?
///
/// The first SIGINT or SIGTERM asks the scheduler to stop after the cycle
/// in flight. Further signals are ignored; the scheduler is already on
/// its way out.
pub fn handle_shutdown(cancel_tx: Sender<()>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            log::info!("Received signal {signal}, shutting down");
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            if cancel_tx.blocking_send(()).is_err() {
                log::warn!("Scheduler already stopped");
            }
        }
    });

    Ok(())
}
