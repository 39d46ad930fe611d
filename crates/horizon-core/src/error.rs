use thiserror::Error;

/// Top-level error type for horizon-core.
#[derive(Debug, Error)]
pub enum HorizonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Structure error: {0}")]
    Structure(#[from] StructureError),

    #[error("Solve error: {0}")]
    Solve(#[from] SolveError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Problem-structure errors.
///
/// Raised at the call boundary, never recovered by truncating or padding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("Invalid stage count: {0} (at least 1 stage is required)")]
    InvalidStageCount(usize),

    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid trajectory: {0}")]
    InvalidTrajectory(String),
}

impl StructureError {
    pub const fn mismatch(what: &'static str, expected: usize, got: usize) -> Self {
        Self::DimensionMismatch {
            what,
            expected,
            got,
        }
    }
}

/// Errors raised while running a trajectory optimization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("Input Hessian is not positive definite at stage {stage}")]
    NotPositiveDefinite { stage: usize },

    #[error("Solver diverged at iteration {iteration}: cost is not finite")]
    Diverged { iteration: usize },

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Problem structure: {0}")]
    Structure(#[from] StructureError),

    #[error("Solve failed: {0}")]
    Failed(String),
}
