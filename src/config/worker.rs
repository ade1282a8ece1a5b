//! Worker process configuration

use serde::Deserialize;
use std::time::Duration;

use crate::adapters::queue::JobDispatcherConfig;

use super::error::ValidationError;

/// Application environment
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Job dispatcher and logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub environment: Environment,

    /// `tracing_subscriber::EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Delay before a freshly ingested notification is reconciled
    #[serde(default = "default_ingest_delay")]
    pub ingest_delay_secs: u64,

    /// First redelivery delay; doubles with every attempt
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Deliveries before a job is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Published jobs are kept this long before cleanup
    #[serde(default = "default_published_retention")]
    pub published_retention_hours: u32,
}

impl WorkerConfig {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn ingest_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ingest_delay_secs as i64)
    }

    pub fn dispatcher_config(&self) -> JobDispatcherConfig {
        JobDispatcherConfig::default()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_batch_size(self.batch_size)
            .with_retry_backoff(Duration::from_secs(self.retry_backoff_secs))
            .with_max_attempts(self.max_attempts)
            .with_retention_hours(self.published_retention_hours)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::InvalidTimeout("worker.poll_interval_ms"));
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        if self.ingest_delay_secs > 86_400 {
            return Err(ValidationError::InvalidTimeout("worker.ingest_delay_secs"));
        }
        if self.log_level.parse::<tracing_subscriber::EnvFilter>().is_err() {
            return Err(ValidationError::InvalidLogLevel(self.log_level.clone()));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            poll_interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
            ingest_delay_secs: default_ingest_delay(),
            retry_backoff_secs: default_retry_backoff(),
            max_attempts: default_max_attempts(),
            published_retention_hours: default_published_retention(),
        }
    }
}

fn default_log_level() -> String {
    "info,purchase_reconciler=debug,sqlx=warn".to_string()
}

fn default_poll_interval() -> u64 {
    500
}

fn default_batch_size() -> u32 {
    50
}

fn default_ingest_delay() -> u64 {
    10
}

fn default_retry_backoff() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    10
}

fn default_published_retention() -> u32 {
    72
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = WorkerConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dispatcher_config_uses_worker_settings() {
        let config = WorkerConfig {
            poll_interval_ms: 250,
            batch_size: 20,
            retry_backoff_secs: 5,
            max_attempts: 4,
            ..Default::default()
        };
        let dispatcher = config.dispatcher_config();
        assert_eq!(dispatcher.poll_interval, Duration::from_millis(250));
        assert_eq!(dispatcher.batch_size, 20);
        assert_eq!(dispatcher.retry_backoff, Duration::from_secs(5));
        assert_eq!(dispatcher.max_attempts, 4);
    }

    #[test]
    fn ingest_delay_converts_to_chrono() {
        let config = WorkerConfig {
            ingest_delay_secs: 45,
            ..Default::default()
        };
        assert_eq!(config.ingest_delay(), chrono::Duration::seconds(45));
    }

    #[test]
    fn rejects_empty_batches_and_zero_attempts() {
        let config = WorkerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidBatchSize)));

        let config = WorkerConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidMaxAttempts)));
    }

    #[test]
    fn rejects_unparseable_log_filter() {
        let config = WorkerConfig {
            log_level: "purchase_reconciler=loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidLogLevel(_))));
    }

    #[test]
    fn is_production() {
        let mut config = WorkerConfig::default();
        assert!(!config.is_production());
        config.environment = Environment::Production;
        assert!(config.is_production());
    }
}
