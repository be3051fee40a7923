//! Daemon configuration
//!
//! Everything is read from the environment (a `.env` file is honoured). Absent
//! or unparsable values fall back to defaults with a warning.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::moderation::RetryPolicy;

pub const DEFAULT_QUEUE_KEY: &str = "moderation_queue";
pub const DEFAULT_DEAD_LETTER_KEY: &str = "moderation_dead_letter";

/// Settings for the worker loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// How long one blocking pop waits for a task
    pub pop_timeout: Duration,
    /// Pause after an empty pop or a queue error
    pub idle_sleep: Duration,
    /// Write failed and malformed tasks to the dead-letter queue
    pub dead_letter: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pop_timeout: Duration::from_secs(10),
            idle_sleep: Duration::from_secs(2),
            dead_letter: true,
        }
    }
}

/// Pacing for cross-chat work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationConfig {
    /// Minimum gap after each per-chat notification during propagation
    pub notify_delay: Duration,
    /// Gap between membership probes while building an info report
    pub info_probe_delay: Duration,
    /// Gap between announcement mention chunks
    pub announce_chunk_delay: Duration,
    /// Track sent to the origin chat before a ban or kick
    pub farewell_audio: Option<PathBuf>,
    pub farewell_delay: Duration,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            notify_delay: Duration::from_secs(1),
            info_probe_delay: Duration::from_millis(500),
            announce_chunk_delay: Duration::from_secs(4),
            farewell_audio: None,
            farewell_delay: Duration::from_secs(25),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WardenConfig {
    /// Redis connection string; the in-memory queue is used when absent
    pub redis_url: Option<String>,
    pub queue_key: String,
    pub dead_letter_key: String,
    /// Directory for store snapshots
    pub data_dir: PathBuf,
    /// One forbidden word per line
    pub forbidden_words: PathBuf,
    pub default_mute_minutes: u32,
    pub retry: RetryPolicy,
    pub worker: WorkerConfig,
    pub propagation: PropagationConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            dead_letter_key: DEFAULT_DEAD_LETTER_KEY.to_string(),
            data_dir: PathBuf::from("data"),
            forbidden_words: PathBuf::from("forbidden_words.txt"),
            default_mute_minutes: 60,
            retry: RetryPolicy::default(),
            worker: WorkerConfig::default(),
            propagation: PropagationConfig::default(),
        }
    }
}

impl WardenConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let retry = RetryPolicy::new(
            parse_or(&read, "WARDEN_RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts),
            secs_or(&read, "WARDEN_RETRY_MAX_WAIT_SECS", defaults.retry.max_total_wait),
        );

        let worker = WorkerConfig {
            pop_timeout: secs_or(&read, "WARDEN_POP_TIMEOUT_SECS", defaults.worker.pop_timeout),
            idle_sleep: millis_or(&read, "WARDEN_IDLE_SLEEP_MS", defaults.worker.idle_sleep),
            dead_letter: bool_or(&read, "WARDEN_DEAD_LETTER", defaults.worker.dead_letter),
        };

        let propagation = PropagationConfig {
            notify_delay: millis_or(
                &read,
                "WARDEN_PROPAGATION_DELAY_MS",
                defaults.propagation.notify_delay,
            ),
            info_probe_delay: millis_or(
                &read,
                "WARDEN_INFO_PROBE_DELAY_MS",
                defaults.propagation.info_probe_delay,
            ),
            announce_chunk_delay: millis_or(
                &read,
                "WARDEN_ANNOUNCE_CHUNK_DELAY_MS",
                defaults.propagation.announce_chunk_delay,
            ),
            farewell_audio: read("WARDEN_FAREWELL_AUDIO").map(PathBuf::from),
            farewell_delay: millis_or(
                &read,
                "WARDEN_FAREWELL_DELAY_MS",
                defaults.propagation.farewell_delay,
            ),
        };

        Self {
            redis_url: read("REDIS_URL"),
            queue_key: read("WARDEN_QUEUE_KEY").unwrap_or(defaults.queue_key),
            dead_letter_key: read("WARDEN_DEAD_LETTER_KEY").unwrap_or(defaults.dead_letter_key),
            data_dir: read("WARDEN_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            forbidden_words: read("WARDEN_FORBIDDEN_WORDS")
                .map_or(defaults.forbidden_words, PathBuf::from),
            default_mute_minutes: parse_or(
                &read,
                "WARDEN_DEFAULT_MUTE_MINUTES",
                defaults.default_mute_minutes,
            ),
            retry,
            worker,
            propagation,
        }
    }
}

fn parse_or<T: FromStr + Copy>(read: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match read(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
        None => default,
    }
}

fn bool_or(read: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match read(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        Some(value) if matches!(value.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(value) if matches!(value.as_str(), "0" | "false" | "no" | "off") => false,
        Some(value) => {
            warn!(key, value = %value, "Invalid boolean configuration value, using default");
            default
        }
        None => default,
    }
}

fn secs_or(read: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or(read, key, default.as_secs()))
}

fn millis_or(read: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(parse_or(read, key, default_ms))
}
