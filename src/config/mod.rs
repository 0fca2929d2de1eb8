use std::env;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub queue: QueueConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/boxoffice".to_string()),
            port: env_parsed("PORT", 3001),
            queue: QueueConfig::from_env(),
        }
    }
}

/// Knobs for the queue processor and its sweeper. All have production
/// defaults; tests shrink them to drive ticks quickly.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Processor tick period.
    pub tick_period: Duration,
    /// Max intents drained per event per tick.
    pub batch_size: i64,
    /// Age at which a WAITING intent expires.
    pub intent_expiry: Duration,
    /// Hard budget for one allocator attempt.
    pub per_intent_timeout: Duration,
    /// Retry budget for CONFLICT and transient failures.
    pub max_attempts: u32,
    /// Expiry sweeper period.
    pub sweeper_period: Duration,
    /// Per-intent processing estimate used for displayed wait times.
    pub wait_estimate_per_intent: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(2),
            batch_size: 5,
            intent_expiry: Duration::from_secs(30 * 60),
            per_intent_timeout: Duration::from_secs(30),
            max_attempts: 3,
            sweeper_period: Duration::from_secs(5 * 60),
            wait_estimate_per_intent: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_period: env_secs("QUEUE_TICK_PERIOD_SECS", defaults.tick_period),
            batch_size: env_parsed("QUEUE_BATCH_SIZE", defaults.batch_size),
            intent_expiry: env_secs("QUEUE_INTENT_EXPIRY_SECS", defaults.intent_expiry),
            per_intent_timeout: env_secs(
                "QUEUE_PER_INTENT_TIMEOUT_SECS",
                defaults.per_intent_timeout,
            ),
            max_attempts: env_parsed("QUEUE_MAX_ATTEMPTS", defaults.max_attempts),
            sweeper_period: env_secs("QUEUE_SWEEPER_PERIOD_SECS", defaults.sweeper_period),
            wait_estimate_per_intent: env_secs(
                "QUEUE_WAIT_ESTIMATE_SECS",
                defaults.wait_estimate_per_intent,
            ),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid value for {}: '{}', using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|raw| match raw.parse::<u64>() {
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(_) => {
                tracing::warn!("Invalid value for {}: '{}', using default", name, raw);
                None
            }
        })
        .unwrap_or(default)
}
