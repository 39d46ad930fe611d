// horizon-core: Problem sizes, trajectories, control laws, config and errors for horizon MPC.

pub mod approximation;
pub mod config;
pub mod control;
pub mod error;
pub mod interpolation;
pub mod size;
pub mod types;

pub use approximation::{LinearApproximation, ModelData, QuadraticApproximation};
pub use config::{DdpSettings, MpcSettings, NodeConfig, ParallelSettings, PipelineSettings};
pub use control::ControlLaw;
pub use error::{ConfigError, HorizonError, SolveError, StructureError};
pub use size::StagedProblemSize;
pub use types::{CommandData, ModeSchedule, Observation, PrimalSolution, TargetTrajectories};
