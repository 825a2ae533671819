pub mod backoff;
pub mod classify;
pub mod clock;
pub mod controller;
pub mod docker;
pub mod notifier;
pub mod recovery;
pub mod scheduler;
