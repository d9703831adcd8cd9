use anyhow::Context;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::thread;

/// Settings for a [`Bridge`](crate::bridge::Bridge).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Prefix for producer thread names. Defaults to `fan-in`.
    pub thread_name: Option<String>,
}

/// Settings for a [`WorkerPool`](crate::pool::WorkerPool).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    pub workers: usize,
    /// Distribution queue bound. Defaults to `workers`.
    pub queue_capacity: Option<usize>,
    /// Results queue bound. Defaults to `workers`; `0` makes every result a
    /// rendezvous with the consumer.
    pub results_capacity: Option<usize>,
    /// Prefix for reader/worker thread names. Defaults to `pool`.
    pub thread_name: Option<String>,
}

impl PoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            queue_capacity: None,
            results_capacity: None,
            thread_name: None,
        }
    }

    /// Loads pool settings from environment variables, falling back to the
    /// defaults for anything unset: SEQ_WORKERS, SEQ_QUEUE_CAPACITY,
    /// SEQ_RESULTS_CAPACITY, SEQ_THREAD_NAME.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(workers) = env_usize("SEQ_WORKERS")? {
            cfg.workers = workers;
        }
        cfg.queue_capacity = env_usize("SEQ_QUEUE_CAPACITY")?.or(cfg.queue_capacity);
        cfg.results_capacity = env_usize("SEQ_RESULTS_CAPACITY")?.or(cfg.results_capacity);
        cfg.thread_name = std::env::var("SEQ_THREAD_NAME").ok().or(cfg.thread_name);
        Ok(cfg)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let workers = thread::available_parallelism().map_or(1, |n| n.get());
        Self::with_workers(workers)
    }
}

fn env_usize(key: &str) -> anyhow::Result<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(None),
    }
}

/// Reads a config section from a file, letting `SEQ__`-prefixed environment
/// variables override individual keys (e.g. `SEQ__WORKERS=8`).
pub fn load_cfg<T: for<'a> Deserialize<'a>>(path: impl AsRef<str>) -> anyhow::Result<T> {
    let cfg = Config::builder()
        .add_source(File::from(PathBuf::from(path.as_ref())))
        .add_source(Environment::with_prefix("SEQ").prefix_separator("__"))
        .build()
        .with_context(|| format!("failed to read config from {}", path.as_ref()))?;

    cfg.try_deserialize()
        .with_context(|| format!("failed to deserialize config from {}", path.as_ref()))
}
