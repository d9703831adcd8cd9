use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rolling {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl FromStr for Rolling {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minutely" => Ok(Rolling::Minutely),
            "hourly" => Ok(Rolling::Hourly),
            "daily" => Ok(Rolling::Daily),
            "never" => Ok(Rolling::Never),
            other => anyhow::bail!("unknown log rolling {other:?}"),
        }
    }
}

impl From<Rolling> for Rotation {
    fn from(r: Rolling) -> Self {
        match r {
            Rolling::Minutely => Rotation::MINUTELY,
            Rolling::Hourly => Rotation::HOURLY,
            Rolling::Daily => Rotation::DAILY,
            Rolling::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggerConfig {
    pub level: String,
    pub file_dir: Option<String>,
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub rolling: Rolling,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_max_files() -> usize {
    2
}

impl LoggerConfig {
    /// Loads logging configuration from environment variables.
    /// Unset variables keep their defaults. Read: LOG_LEVEL, LOG_FILE_DIR,
    /// LOG_FILE_PREFIX, LOG_ROLLING (an unknown value falls back to daily).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or(defaults.level),
            file_dir: std::env::var("LOG_FILE_DIR").ok(),
            file_prefix: std::env::var("LOG_FILE_PREFIX").ok(),
            rolling: std::env::var("LOG_ROLLING")
                .ok()
                .and_then(|r| r.parse().ok())
                .unwrap_or_default(),
            max_files: defaults.max_files,
        }
    }

    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    pub fn max_level(&self) -> Level {
        Level::from_str(&self.level).unwrap_or(Level::INFO)
    }

    /// Installs the global subscriber. Returns the non-blocking writer guard
    /// when logging to files; keep it alive for as long as logs should flush.
    /// A subscriber that is already installed is left in place.
    pub fn init(&self) -> anyhow::Result<Option<WorkerGuard>> {
        let level = self.max_level();

        let Some(dir) = self.file_dir.as_deref() else {
            let _ = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_thread_names(true)
                .try_init();
            tracing::debug!("logging to stdout");
            return Ok(None);
        };

        let prefix = self.file_prefix.as_deref().unwrap_or("seqbridge");
        let appender = RollingFileAppender::builder()
            .rotation(self.rolling.into())
            .max_log_files(self.max_files)
            .filename_prefix(prefix)
            .build(dir)
            .with_context(|| format!("failed to create rolling appender in {dir}"))?;

        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(writer)
            .try_init();

        tracing::info!(dir, prefix, rolling = ?self.rolling, "logging to files");
        Ok(Some(guard))
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_dir: None,
            file_prefix: None,
            rolling: Rolling::Daily,
            max_files: default_max_files(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_parses_case_insensitively() {
        assert_eq!("HOURLY".parse::<Rolling>().expect("known"), Rolling::Hourly);
        assert!("weekly".parse::<Rolling>().is_err());
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(LoggerConfig::with_level("chatty").max_level(), Level::INFO);
        assert_eq!(LoggerConfig::with_level("debug").max_level(), Level::DEBUG);
    }

    #[test]
    fn from_env_reads_log_variables() {
        unsafe {
            std::env::set_var("LOG_LEVEL", "trace");
            std::env::set_var("LOG_FILE_PREFIX", "etl");
            std::env::set_var("LOG_ROLLING", "fortnightly");
            std::env::remove_var("LOG_FILE_DIR");
        }
        let cfg = LoggerConfig::from_env();
        unsafe {
            std::env::remove_var("LOG_LEVEL");
            std::env::remove_var("LOG_FILE_PREFIX");
            std::env::remove_var("LOG_ROLLING");
        }

        assert_eq!(cfg.max_level(), Level::TRACE);
        assert_eq!(cfg.file_prefix.as_deref(), Some("etl"));
        assert!(cfg.file_dir.is_none());
        assert_eq!(cfg.rolling, Rolling::Daily);
        assert_eq!(cfg.max_files, 2);
    }

    #[test]
    fn stdout_init_is_repeatable() {
        let cfg = LoggerConfig::with_level("warn");
        assert!(cfg.init().expect("init").is_none());
        assert!(cfg.init().expect("second init").is_none());
    }
}
