use crate::monitor::docker::ContainerSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Healthy,
    NeedsRecovery,
    /// Transitional states such as `restarting` or `created`. Neither
    /// acted on nor counted as healthy.
    Ignored,
}

/// Decide what to do with a container from its lifecycle state and
/// status string.
///
/// A running container without a health check never reports
/// `unhealthy` and is therefore healthy.
pub fn classify(container: &ContainerSnapshot) -> Classification {
    match container.state.as_str() {
        "running" if container.status.contains("unhealthy") => Classification::NeedsRecovery,
        "running" => Classification::Healthy,
        "exited" | "dead" => Classification::NeedsRecovery,
        _ => Classification::Ignored,
    }
}
