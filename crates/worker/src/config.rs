use std::path::PathBuf;
use std::time::Duration;

use helmsman_pipeline::PipelineConfig;

/// Daemon configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub pipeline: PipelineConfig,
    /// How often the scheduler looks for due periodic tasks.
    pub scheduler_tick: Duration,
    /// Age after which an unfinished history entry is considered stale.
    pub history_stale_after: Duration,
    pub reaper_interval: Duration,
    /// JSON file with projects, templates, periodic tasks and hooks to
    /// create at startup.
    pub seed_file: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default |
    /// |------------------------|---------|
    /// | `SCHEDULER_TICK_SECS`  | `60`    |
    /// | `HISTORY_STALE_SECS`   | `86400` |
    /// | `REAPER_INTERVAL_SECS` | `300`   |
    /// | `SEED_FILE`            | unset   |
    ///
    /// Pipeline settings come from [`PipelineConfig::from_env`].
    pub fn from_env() -> Self {
        Self {
            pipeline: PipelineConfig::from_env(),
            scheduler_tick: secs_or("SCHEDULER_TICK_SECS", 60),
            history_stale_after: secs_or("HISTORY_STALE_SECS", 86_400),
            reaper_interval: secs_or("REAPER_INTERVAL_SECS", 300),
            seed_file: std::env::var("SEED_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

fn secs_or(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}
