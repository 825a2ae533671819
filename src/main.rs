use std::process::ExitCode;
use std::sync::Arc;

use config::AutohealConfig;
use monitor::{
    backoff::BackoffTracker,
    clock::SystemClock,
    controller::Autoheal,
    docker::DockerRuntime,
    notifier::{Notifier, WebhookSink},
    scheduler,
};

mod cli;
mod config;
mod monitor;
mod signals;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AutohealConfig::try_init() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match DockerRuntime::connect(config.labels.clone()) {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Unable to initialize docker client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let notifier = config.webhook.as_ref().map(|webhook| {
        log::info!("Sending notifications to {}", webhook.url);
        Notifier::new(Box::new(WebhookSink::new(
            webhook.url.clone(),
            webhook.key.clone(),
        )))
    });

    let mut autoheal = Autoheal::new(
        Arc::new(runtime),
        Arc::new(SystemClock),
        config.action,
        BackoffTracker::new(config.initial_backoff, config.max_backoff),
    )
    .with_lock_file(config.lock_file.clone())
    .with_notifier(notifier);

    let (cancel_tx, cancel_rx) = tokio::sync::mpsc::channel(1);
    if let Err(e) = signals::handle_shutdown(cancel_tx) {
        log::error!("Unable to install signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
    scheduler::run(&mut autoheal, config.interval, cancel_rx).await;

    if !autoheal.tracker().is_empty() {
        log::warn!(
            "Exiting with {} container(s) still in backoff",
            autoheal.tracker().len()
        );
    }
    if autoheal.notifier().is_some_and(|n| n.is_alerting()) {
        log::warn!("Exiting while an alert is still open");
    }

    ExitCode::SUCCESS
}
