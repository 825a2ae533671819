use std::path::PathBuf;
use std::sync::Arc;

use crate::monitor::{
    backoff::{BackoffTracker, parse_stop_time},
    classify::{Classification, classify},
    clock::Clock,
    docker::{ContainerRuntime, ContainerSnapshot},
    notifier::{Notifier, NotifyOutcome},
    recovery::RecoveryAction,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// The lock file exists, nothing was looked at.
    Locked,
    /// The runtime could not list containers. No state was touched.
    Aborted,
    Completed {
        /// `name (status)` for every container a recovery was attempted on.
        attempted: Vec<String>,
        healthy: usize,
        /// Troubled containers left alone this cycle, either still in
        /// backoff or without a usable stop time.
        skipped: usize,
        /// Entries left in the backoff table after cleanup.
        tracked: usize,
        notification: Option<NotifyOutcome>,
    },
}

/// Owns all state that lives as long as the process: the backoff table
/// and the notifier flag. Cycles run one at a time through `&mut self`.
pub struct Autoheal {
    runtime: Arc<dyn ContainerRuntime>,
    clock: Arc<dyn Clock>,
    action: RecoveryAction,
    lock_file: Option<PathBuf>,
    tracker: BackoffTracker,
    notifier: Option<Notifier>,
}

impl Autoheal {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        clock: Arc<dyn Clock>,
        action: RecoveryAction,
        tracker: BackoffTracker,
    ) -> Self {
        Self {
            runtime,
            clock,
            action,
            lock_file: None,
            tracker,
            notifier: None,
        }
    }

    pub fn with_lock_file(mut self, lock_file: Option<PathBuf>) -> Self {
        self.lock_file = lock_file;
        self
    }

    pub fn with_notifier(mut self, notifier: Option<Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn tracker(&self) -> &BackoffTracker {
        &self.tracker
    }

    pub fn notifier(&self) -> Option<&Notifier> {
        self.notifier.as_ref()
    }

    fn is_locked(&self) -> bool {
        self.lock_file.as_ref().is_some_and(|path| path.exists())
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        if self.is_locked() {
            log::info!("Lock file exists, not checking health");
            return CycleReport::Locked;
        }

        let containers = match self.runtime.list().await {
            Ok(containers) => containers,
            Err(e) => {
                log::error!("Unable to list docker containers: {e}");
                return CycleReport::Aborted;
            }
        };

        let mut attempted = Vec::new();
        let mut healthy = Vec::new();
        let mut skipped = 0;

        for container in &containers {
            match classify(container) {
                Classification::Healthy => healthy.push(container.name.clone()),
                Classification::Ignored => {}
                Classification::NeedsRecovery => match self.recover(container).await {
                    Some(label) => attempted.push(label),
                    None => skipped += 1,
                },
            }
        }

        let now = self.clock.now();
        self.tracker
            .cleanup(healthy.iter().map(String::as_str), now);
        let tracked = self.tracker.len();

        let notification = match &mut self.notifier {
            Some(notifier) => Some(notifier.notify(&attempted, tracked).await),
            None => None,
        };

        let report = CycleReport::Completed {
            attempted,
            healthy: healthy.len(),
            skipped,
            tracked,
            notification,
        };
        log::debug!("Cycle finished: {report:?}");
        report
    }

    /// Attempt recovery of one troubled container if its backoff allows.
    /// Returns the alert label when an attempt was made.
    async fn recover(&mut self, container: &ContainerSnapshot) -> Option<String> {
        let name = container.name.as_str();

        if !self.tracker.contains(name) {
            let stopped_at = match self.runtime.finished_at(&container.id).await {
                Ok(raw) => raw,
                Err(e) => {
                    log::error!("Unable to inspect container {name}: {e}");
                    return None;
                }
            };
            match parse_stop_time(stopped_at.as_deref()) {
                Ok(stopped_at) => {
                    self.tracker.track(name, stopped_at);
                }
                Err(e) => {
                    log::error!("Unable to determine when container {name} stopped: {e}");
                    return None;
                }
            }
        }

        let now = self.clock.now();
        if !self.tracker.is_eligible(name, now) {
            if let Some(state) = self.tracker.get(name) {
                log::info!(
                    "Skipping recovery of {name} due to backoff of {:?}",
                    state.backoff
                );
            }
            return None;
        }

        if let Err(e) = self.action.apply(self.runtime.as_ref(), container).await {
            log::error!("Unable to recover container {name}: {e}");
        }
        // A failed attempt still consumes its backoff slot.
        self.tracker.record_attempt(name, self.clock.now());

        Some(format!("{name} ({})", container.status))
    }
}
