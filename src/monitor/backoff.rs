//! Per-container restart backoff.
//!
//! Every troubled container gets an entry keyed by its name. An entry
//! remembers when recovery was last attempted and how long to wait before
//! the next attempt. The wait doubles after each attempt, up to the
//! configured maximum, and is only ever reset by deleting the entry once
//! the container has stayed healthy for the initial backoff.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Runtime did not report a stop time")]
    MissingStopTime,
    #[error("Unable to parse stop time {raw:?}: {source}")]
    InvalidStopTime {
        raw: String,
        source: chrono::ParseError,
    },
}

/// Parse the RFC 3339 stop time reported by the runtime.
pub fn parse_stop_time(raw: Option<&str>) -> Result<DateTime<Utc>, TrackError> {
    let raw = raw.ok_or(TrackError::MissingStopTime)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| TrackError::InvalidStopTime {
            raw: raw.to_string(),
            source,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerState {
    pub backoff: Duration,
    pub last_attempt: DateTime<Utc>,
}

#[derive(Debug)]
pub struct BackoffTracker {
    initial_backoff: Duration,
    max_backoff: Duration,
    states: HashMap<String, ContainerState>,
}

/// Time between `since` and `now`. A `since` in the future counts as no
/// time at all.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

impl BackoffTracker {
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            states: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ContainerState> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Start tracking a container first seen in trouble. Does nothing if
    /// the container is already tracked.
    pub fn track(&mut self, name: &str, stopped_at: DateTime<Utc>) -> &ContainerState {
        self.states
            .entry(name.to_string())
            .or_insert(ContainerState {
                backoff: self.initial_backoff,
                last_attempt: stopped_at,
            })
    }

    /// Whether enough time has passed since the last attempt. Untracked
    /// containers are never eligible.
    pub fn is_eligible(&self, name: &str, now: DateTime<Utc>) -> bool {
        self.states
            .get(name)
            .is_some_and(|state| elapsed(state.last_attempt, now) >= state.backoff)
    }

    /// Record a recovery attempt, successful or not, and double the
    /// backoff for the next one.
    pub fn record_attempt(&mut self, name: &str, now: DateTime<Utc>) {
        if let Some(state) = self.states.get_mut(name) {
            state.backoff = state.backoff.saturating_mul(2).min(self.max_backoff);
            state.last_attempt = now;
        }
    }

    /// Forget containers that have been healthy for longer than the
    /// initial backoff. Returns how many entries were dropped.
    pub fn cleanup<'a>(
        &mut self,
        healthy: impl IntoIterator<Item = &'a str>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut removed = 0;
        for name in healthy {
            let expired = self
                .states
                .get(name)
                .is_some_and(|state| elapsed(state.last_attempt, now) > self.initial_backoff);
            if expired {
                log::info!("Container {name} is healthy again, forgetting its backoff");
                self.states.remove(name);
                removed += 1;
            }
        }
        removed
    }
}
