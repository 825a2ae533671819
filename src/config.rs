use std::{path::PathBuf, time::Duration};

use url::Url;

use crate::cli::Args;
use crate::monitor::recovery::RecoveryAction;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);
const DEFAULT_WEBHOOK_KEY: &str = "text";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid duration for {field}: {reason}")]
    Duration { field: &'static str, reason: String },
    #[error("Invalid webhook url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Invalid(String),
}

/// Parse durations like `300ms`, `10s`, `5m`, `1h`. A bare number is
/// taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit): (&str, fn(u64) -> Duration) = if let Some(n) = s.strip_suffix("ms") {
        (n, Duration::from_millis)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, |m| Duration::from_secs(m.saturating_mul(60)))
    } else if let Some(n) = s.strip_suffix('h') {
        (n, |h| Duration::from_secs(h.saturating_mul(3600)))
    } else {
        (s, Duration::from_secs)
    };
    digits
        .trim()
        .parse::<u64>()
        .map(unit)
        .map_err(|_| format!("'{s}' is not a duration (expected e.g. 500ms, 10s, 5m, 1h)"))
}

/// Everything that can be set in the optional config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutohealConfigFile {
    interval: Option<String>,
    initial_backoff: Option<String>,
    max_backoff: Option<String>,
    lock_file: Option<PathBuf>,
    webhook_url: Option<String>,
    webhook_key: Option<String>,
    action: Option<RecoveryAction>,
    #[serde(default)]
    labels: Vec<String>,
}

impl AutohealConfigFile {
    fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(val)?)
    }

    pub fn try_init(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::try_init_from_string(&contents)
    }

    fn duration(value: &Option<String>, field: &'static str) -> Result<Option<Duration>, ConfigError> {
        value
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|reason| ConfigError::Duration { field, reason })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: Url,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutohealConfig {
    pub interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub lock_file: Option<PathBuf>,
    pub webhook: Option<WebhookConfig>,
    pub action: RecoveryAction,
    pub labels: Vec<String>,
}

impl AutohealConfig {
    /// Resolve the configuration from the command line and, if given, the
    /// config file it points to.
    pub fn try_init() -> Result<Self, ConfigError> {
        let args = crate::cli::get_cli_args();
        let file = match &args.config {
            Some(path) => AutohealConfigFile::try_init(path)?,
            None => AutohealConfigFile::default(),
        };
        Self::from_parts(args, file)
    }

    fn from_parts(args: &Args, file: AutohealConfigFile) -> Result<Self, ConfigError> {
        let interval = match args.interval {
            Some(d) => d,
            None => AutohealConfigFile::duration(&file.interval, "interval")?
                .unwrap_or(DEFAULT_INTERVAL),
        };
        let initial_backoff = match args.initial_backoff {
            Some(d) => d,
            None => AutohealConfigFile::duration(&file.initial_backoff, "initial_backoff")?
                .unwrap_or(DEFAULT_INITIAL_BACKOFF),
        };
        let max_backoff = match args.max_backoff {
            Some(d) => d,
            None => AutohealConfigFile::duration(&file.max_backoff, "max_backoff")?
                .unwrap_or(DEFAULT_MAX_BACKOFF),
        };

        let lock_file = args
            .lock_file
            .clone()
            .or(file.lock_file)
            .filter(|p| !p.as_os_str().is_empty());

        let webhook_url = match &args.webhook_url {
            Some(url) => Some(url.clone()),
            None => file
                .webhook_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .map(Url::parse)
                .transpose()?,
        };
        let webhook = webhook_url.map(|url| WebhookConfig {
            url,
            key: args
                .webhook_key
                .clone()
                .or_else(|| file.webhook_key.clone())
                .unwrap_or_else(|| DEFAULT_WEBHOOK_KEY.to_string()),
        });

        let labels = if args.labels.is_empty() {
            file.labels
        } else {
            args.labels.clone()
        };

        let config = Self {
            interval,
            initial_backoff,
            max_backoff,
            lock_file,
            webhook,
            action: args.action.or(file.action).unwrap_or_default(),
            labels,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be greater than zero".into()));
        }
        if self.initial_backoff.is_zero() {
            return Err(ConfigError::Invalid(
                "initial backoff must be greater than zero".into(),
            ));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::Invalid(format!(
                "max backoff ({:?}) is smaller than initial backoff ({:?})",
                self.max_backoff, self.initial_backoff
            )));
        }
        if let Some(webhook) = &self.webhook {
            if webhook.key.is_empty() {
                return Err(ConfigError::Invalid("webhook key must not be empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(toml: &str) -> AutohealConfigFile {
        AutohealConfigFile::try_init_from_string(toml).expect("valid config file")
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 42 "), Ok(Duration::from_secs(42)));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ten seconds").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = AutohealConfig::from_parts(&Args::default(), AutohealConfigFile::default())
            .expect("defaults are valid");
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.initial_backoff, Duration::from_secs(10));
        assert_eq!(config.max_backoff, Duration::from_secs(300));
        assert_eq!(config.lock_file, None);
        assert_eq!(config.webhook, None);
        assert_eq!(config.action, RecoveryAction::Restart);
        assert!(config.labels.is_empty());
    }

    #[test]
    fn test_file_values() {
        let config = AutohealConfig::from_parts(
            &Args::default(),
            file(
                r#"
                interval = "30s"
                initial_backoff = "1m"
                max_backoff = "1h"
                lock_file = "/run/autoheal.lock"
                webhook_url = "https://hooks.slack.com/services/T/B/X"
                action = "log"
                labels = ["autoheal=true"]
                "#,
            ),
        )
        .unwrap();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.initial_backoff, Duration::from_secs(60));
        assert_eq!(config.max_backoff, Duration::from_secs(3600));
        assert_eq!(config.lock_file, Some(PathBuf::from("/run/autoheal.lock")));
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.url.host_str(), Some("hooks.slack.com"));
        assert_eq!(webhook.key, "text");
        assert_eq!(config.action, RecoveryAction::Log);
        assert_eq!(config.labels, vec!["autoheal=true"]);
    }

    #[test]
    fn test_flags_override_file() {
        let args = Args {
            interval: Some(Duration::from_secs(2)),
            webhook_key: Some("content".to_string()),
            lock_file: Some(PathBuf::new()),
            labels: vec!["team=web".to_string()],
            ..Default::default()
        };
        let config = AutohealConfig::from_parts(
            &args,
            file(
                r#"
                interval = "30s"
                lock_file = "/run/autoheal.lock"
                webhook_url = "http://localhost:8080/"
                webhook_key = "text"
                labels = ["autoheal=true"]
                "#,
            ),
        )
        .unwrap();
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.webhook.unwrap().key, "content");
        // An empty path on the command line disables the lock file.
        assert_eq!(config.lock_file, None);
        assert_eq!(config.labels, vec!["team=web"]);
    }

    #[test]
    fn test_invalid_values() {
        let err = AutohealConfig::from_parts(&Args::default(), file(r#"interval = "often""#));
        assert!(matches!(err, Err(ConfigError::Duration { field: "interval", .. })));

        let err = AutohealConfig::from_parts(&Args::default(), file(r#"interval = "0s""#));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));

        let err = AutohealConfig::from_parts(
            &Args::default(),
            file(
                r#"
                initial_backoff = "5m"
                max_backoff = "1m"
                "#,
            ),
        );
        assert!(matches!(err, Err(ConfigError::Invalid(_))));

        let err = AutohealConfig::from_parts(&Args::default(), file(r#"webhook_url = "nope""#));
        assert!(matches!(err, Err(ConfigError::Url(_))));

        assert!(AutohealConfigFile::try_init_from_string(r#"intervall = "5s""#).is_err());
    }
}
