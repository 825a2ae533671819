use std::{path::PathBuf, sync::OnceLock, time::Duration};

use clap::Parser;
use url::Url;

use crate::config::parse_duration;
use crate::monitor::recovery::RecoveryAction;

/// Restart unhealthy docker containers and report fleet health to a webhook.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Optional TOML config file. Flags given on the command line win.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// How often to check for docker container health (e.g. 10s, 1m).
    #[arg(long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// How long to initially wait before restarting an unhealthy container.
    #[arg(long, value_parser = parse_duration)]
    pub initial_backoff: Option<Duration>,

    /// Maximum time to wait before attempting a container restart.
    #[arg(long, value_parser = parse_duration)]
    pub max_backoff: Option<Duration>,

    /// Lock file that, while it exists, halts all recovery.
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// Send alert and all clear messages to this webhook.
    #[arg(long)]
    pub webhook_url: Option<Url>,

    /// JSON key name to put webhook messages under.
    #[arg(long)]
    pub webhook_key: Option<String>,

    /// What to do with a container that needs recovery.
    #[arg(long, value_enum)]
    pub action: Option<RecoveryAction>,

    /// Only monitor containers with this label (`key` or `key=value`).
    /// May be repeated.
    #[arg(long = "label")]
    pub labels: Vec<String>,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
