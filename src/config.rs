//! TOML configuration for the local cluster binary.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.
//!
//! ```toml
//! [cluster]
//! total_particles = 30
//! tasks = 3
//!
//! [dispatch]
//! workers = 8
//! timeout_ms = 0          # 0 = wait indefinitely
//!
//! [planner]
//! resampling_threshold = 0.5
//!
//! [sim]
//! cycles = 100
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::engine::LowVariancePlannerConfig;
use crate::particles::{MAX_CELLS, Partition, PartitionError, grid_cells};
use crate::sim::{JitterMatcherConfig, LocalClusterConfig, ScanSourceConfig};

/// Paths tried, in order, when no config file is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["vibhaga-slam.toml", "/etc/vibhaga-slam.toml"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid cluster layout: {0}")]
    Partition(#[from] PartitionError),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub matcher: MatcherSection,
    #[serde(default)]
    pub planner: PlannerSection,
    #[serde(default)]
    pub sim: SimSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    pub total_particles: u32,
    pub tasks: u32,
    pub sensor_id: String,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            total_particles: 30,
            tasks: 3,
            sensor_id: "laser".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Worker threads per task
    pub workers: usize,
    /// Dispatch deadline in ms (0 = none)
    pub timeout_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            workers: 8,
            timeout_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherSection {
    pub spread_xy: f32,
    pub spread_theta: f32,
    pub min_travel: f32,
    pub map_size: f32,
    pub map_resolution: f32,
    /// Base seed; task `i` uses `seed + i` (0 = OS entropy)
    pub seed: u64,
}

impl Default for MatcherSection {
    fn default() -> Self {
        let d = JitterMatcherConfig::default();
        Self {
            spread_xy: d.spread_xy,
            spread_theta: d.spread_theta,
            min_travel: d.min_travel,
            map_size: d.map_size,
            map_resolution: d.map_resolution,
            seed: d.seed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    /// Resample when Neff drops below this fraction of the population
    pub resampling_threshold: f64,
    pub seed: u64,
}

impl Default for PlannerSection {
    fn default() -> Self {
        let d = LowVariancePlannerConfig::default();
        Self {
            resampling_threshold: d.resampling_threshold,
            seed: d.seed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimSection {
    /// Scans to run (0 = until interrupted)
    pub cycles: u64,
    pub scan_interval_ms: u64,
    pub ready_timeout_ms: u64,
    pub beams: usize,
    pub room_half_extent: f32,
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            cycles: 100,
            scan_interval_ms: 100,
            ready_timeout_ms: 5000,
            beams: 90,
            room_half_extent: 4.0,
        }
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(contents: &str, path: &str) -> Result<Self, ConfigError> {
        basic_toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Read and parse one file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml(&contents, &display)
    }

    /// Check values that would fail later at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Partition::new(self.cluster.total_particles, self.cluster.tasks)?;
        if self.dispatch.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch.workers",
                reason: "must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.planner.resampling_threshold) {
            return Err(ConfigError::Invalid {
                field: "planner.resampling_threshold",
                reason: format!("{} not in [0, 1]", self.planner.resampling_threshold),
            });
        }
        if self.matcher.map_resolution <= 0.0 || self.matcher.map_size <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "matcher.map_resolution",
                reason: "map size and resolution must be positive".into(),
            });
        }
        let cells = grid_cells(
            self.matcher.map_size,
            self.matcher.map_size,
            self.matcher.map_resolution,
        );
        if cells > MAX_CELLS {
            return Err(ConfigError::Invalid {
                field: "matcher.map_resolution",
                reason: format!("{cells} cells exceeds the limit of {MAX_CELLS}"),
            });
        }
        if self.sim.ready_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sim.ready_timeout_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn cluster_config(&self) -> LocalClusterConfig {
        LocalClusterConfig {
            total_particles: self.cluster.total_particles,
            tasks: self.cluster.tasks,
            sensor_id: self.cluster.sensor_id.clone(),
            dispatch_workers: self.dispatch.workers,
            dispatch_timeout: (self.dispatch.timeout_ms > 0)
                .then(|| Duration::from_millis(self.dispatch.timeout_ms)),
            ready_timeout: Duration::from_millis(self.sim.ready_timeout_ms),
        }
    }

    /// Matcher config for one task.
    pub fn matcher_config(&self, task_id: u32) -> JitterMatcherConfig {
        JitterMatcherConfig {
            spread_xy: self.matcher.spread_xy,
            spread_theta: self.matcher.spread_theta,
            min_travel: self.matcher.min_travel,
            map_size: self.matcher.map_size,
            map_resolution: self.matcher.map_resolution,
            seed: match self.matcher.seed {
                0 => 0,
                seed => seed + u64::from(task_id),
            },
        }
    }

    pub fn planner_config(&self) -> LowVariancePlannerConfig {
        LowVariancePlannerConfig {
            resampling_threshold: self.planner.resampling_threshold,
            seed: self.planner.seed,
        }
    }

    pub fn scan_source_config(&self) -> ScanSourceConfig {
        ScanSourceConfig {
            room_half_extent: self.sim.room_half_extent,
            beams: self.sim.beams,
            interval_us: self.sim.scan_interval_ms * 1000,
            ..Default::default()
        }
    }
}

/// Load the configuration.
///
/// An explicit path that cannot be read or parsed logs a warning and falls
/// back to the defaults. Without a path the [`DEFAULT_CONFIG_PATHS`] are
/// tried in order.
pub fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(path) => match Config::from_file(path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                log::warn!("{}", e);
                Config::default()
            }
        },
        None => {
            for candidate in DEFAULT_CONFIG_PATHS {
                if let Ok(contents) = fs::read_to_string(candidate)
                    && let Ok(cfg) = Config::from_toml(&contents, candidate)
                {
                    log::info!("Loaded config from {}", candidate);
                    return cfg;
                }
            }
            Config::default()
        }
    }
}
