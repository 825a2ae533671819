use serde::Deserialize;

use crate::monitor::docker::{ContainerRuntime, ContainerSnapshot, RuntimeError};

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Unable to restart container: {0}")]
    Restart(#[from] RuntimeError),
    #[error("Unable to reboot host: {0}")]
    Reboot(#[from] nix::Error),
}

/// What to do with a container that needs recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Restart the container through the runtime.
    #[default]
    Restart,
    /// Reboot the whole host.
    Reboot,
    /// Only report the container.
    #[serde(alias = "output", alias = "log_only")]
    Log,
}

impl RecoveryAction {
    pub async fn apply(
        self,
        runtime: &dyn ContainerRuntime,
        container: &ContainerSnapshot,
    ) -> Result<(), RecoveryError> {
        match self {
            RecoveryAction::Restart => {
                log::warn!("Restarting container {}", container.name);
                runtime.restart(&container.id).await?;
            }
            RecoveryAction::Reboot => {
                log::warn!(
                    "Rebooting host because of container {} ({})",
                    container.name,
                    container.status
                );
                nix::unistd::sync();
                nix::sys::reboot::reboot(nix::sys::reboot::RebootMode::RB_AUTOBOOT)?;
            }
            RecoveryAction::Log => {
                log::warn!(
                    "Unhealthy container {} ({}) [{}]",
                    container.name,
                    container.status,
                    container.id
                );
            }
        }
        Ok(())
    }
}
