use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

fn default_address() -> String {
    "127.0.0.1:9877".into()
}
const fn default_time_horizon() -> f64 {
    1.0
}
const fn default_num_partitions() -> usize {
    2
}
const fn default_time_step() -> f64 {
    0.01
}
const fn default_max_iterations() -> usize {
    10
}
const fn default_min_rel_cost() -> f64 {
    1e-4
}
const fn default_line_search_min_step() -> f64 {
    0.05
}
const fn default_line_search_contraction() -> f64 {
    0.5
}
const fn default_true() -> bool {
    true
}
fn default_publisher_thread_name() -> String {
    "horizon-publisher".into()
}
fn default_num_threads() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

// ---------------------------------------------------------------------------
// MpcSettings
// ---------------------------------------------------------------------------

/// Receding-horizon settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcSettings {
    /// Length of the optimization horizon in seconds (default: 1.0).
    #[serde(default = "default_time_horizon")]
    pub time_horizon: f64,

    /// Number of time partitions the horizon is split into (default: 2).
    #[serde(default = "default_num_partitions")]
    pub num_partitions: usize,

    /// Log per-solve details at debug level.
    #[serde(default)]
    pub debug_print: bool,
}

impl Default for MpcSettings {
    fn default() -> Self {
        Self {
            time_horizon: default_time_horizon(),
            num_partitions: default_num_partitions(),
            debug_print: false,
        }
    }
}

impl MpcSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_horizon <= 0.0 || !self.time_horizon.is_finite() {
            return Err(ConfigError::invalid("mpc.time_horizon", format!(
                "{} (must be > 0)",
                self.time_horizon
            )));
        }
        if self.num_partitions == 0 {
            return Err(ConfigError::invalid("mpc.num_partitions", "must be at least 1"));
        }
        Ok(())
    }

    /// Duration of one partition.
    pub fn partition_length(&self) -> f64 {
        self.time_horizon / self.num_partitions as f64
    }
}

// ---------------------------------------------------------------------------
// DdpSettings
// ---------------------------------------------------------------------------

/// Settings of the reference DDP solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdpSettings {
    /// Discretization time step in seconds (default: 0.01).
    #[serde(default = "default_time_step")]
    pub time_step: f64,

    /// Maximum number of Gauss-Newton iterations per solve (default: 10).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Relative cost change below which the solve is converged (default: 1e-4).
    #[serde(default = "default_min_rel_cost")]
    pub min_rel_cost: f64,

    /// Smallest line-search step before giving up on descent (default: 0.05).
    #[serde(default = "default_line_search_min_step")]
    pub line_search_min_step: f64,

    /// Step contraction factor of the backtracking line search (default: 0.5).
    #[serde(default = "default_line_search_contraction")]
    pub line_search_contraction: f64,

    /// Compute QP preconditioning row sums every iteration (default: true).
    #[serde(default = "default_true")]
    pub compute_scaling: bool,
}

impl Default for DdpSettings {
    fn default() -> Self {
        Self {
            time_step: default_time_step(),
            max_iterations: default_max_iterations(),
            min_rel_cost: default_min_rel_cost(),
            line_search_min_step: default_line_search_min_step(),
            line_search_contraction: default_line_search_contraction(),
            compute_scaling: true,
        }
    }
}

impl DdpSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_step <= 0.0 || !self.time_step.is_finite() {
            return Err(ConfigError::invalid("ddp.time_step", format!(
                "{} (must be > 0)",
                self.time_step
            )));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("ddp.max_iterations", "must be at least 1"));
        }
        if !(self.line_search_contraction > 0.0 && self.line_search_contraction < 1.0) {
            return Err(ConfigError::invalid(
                "ddp.line_search_contraction",
                "must be in (0, 1)",
            ));
        }
        if !(self.line_search_min_step > 0.0 && self.line_search_min_step <= 1.0) {
            return Err(ConfigError::invalid(
                "ddp.line_search_min_step",
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Settings of the observation → solve → publish pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Publish the feedback policy; otherwise the open-loop input trajectory.
    #[serde(default = "default_true")]
    pub use_feedback_policy: bool,

    /// Name of the publishing thread.
    #[serde(default = "default_publisher_thread_name")]
    pub publisher_thread_name: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            use_feedback_policy: true,
            publisher_thread_name: default_publisher_thread_name(),
        }
    }
}

// ---------------------------------------------------------------------------
// ParallelSettings
// ---------------------------------------------------------------------------

/// Worker pool used by the preconditioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelSettings {
    /// Worker threads (default: available parallelism).
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

/// Top-level configuration of an MPC node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the node listens on.
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub mpc: MpcSettings,

    #[serde(default)]
    pub ddp: DdpSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub parallel: ParallelSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            mpc: MpcSettings::default(),
            ddp: DdpSettings::default(),
            pipeline: PipelineSettings::default(),
            parallel: ParallelSettings::default(),
        }
    }
}

impl NodeConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mpc.validate()?;
        self.ddp.validate()?;
        if self.ddp.time_step > self.mpc.partition_length() {
            return Err(ConfigError::invalid(
                "ddp.time_step",
                "must not exceed the partition length",
            ));
        }
        if self.parallel.num_threads == 0 {
            return Err(ConfigError::invalid("parallel.num_threads", "must be at least 1"));
        }
        Ok(())
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
