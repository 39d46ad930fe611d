//! Stage-indexed problem dimensions.

use serde::{Deserialize, Serialize};

use crate::error::StructureError;

/// Dimensions of a variable-size, stage-indexed optimal control problem.
///
/// Stage 0 holds the fixed initial state and stage `N` is terminal, so there
/// are `N + 1` state dimensions, `N` input dimensions (one per transition) and
/// `N + 1` inequality constraint counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProblemSize")]
pub struct StagedProblemSize {
    num_stages: usize,
    num_states: Vec<usize>,
    num_inputs: Vec<usize>,
    num_ineq_constraints: Vec<usize>,
}

/// Unchecked wire form; deserialization goes through [`StagedProblemSize::new`].
#[derive(Deserialize)]
struct RawProblemSize {
    num_stages: usize,
    num_states: Vec<usize>,
    num_inputs: Vec<usize>,
    num_ineq_constraints: Vec<usize>,
}

impl TryFrom<RawProblemSize> for StagedProblemSize {
    type Error = StructureError;

    fn try_from(raw: RawProblemSize) -> Result<Self, Self::Error> {
        Self::new(
            raw.num_stages,
            raw.num_states,
            raw.num_inputs,
            raw.num_ineq_constraints,
        )
    }
}

impl StagedProblemSize {
    /// Build a problem size, checking every per-stage array against `num_stages`.
    pub fn new(
        num_stages: usize,
        num_states: Vec<usize>,
        num_inputs: Vec<usize>,
        num_ineq_constraints: Vec<usize>,
    ) -> Result<Self, StructureError> {
        if num_states.len() != num_stages + 1 {
            return Err(StructureError::mismatch(
                "num_states",
                num_stages + 1,
                num_states.len(),
            ));
        }
        if num_inputs.len() != num_stages {
            return Err(StructureError::mismatch(
                "num_inputs",
                num_stages,
                num_inputs.len(),
            ));
        }
        if num_ineq_constraints.len() != num_stages + 1 {
            return Err(StructureError::mismatch(
                "num_ineq_constraints",
                num_stages + 1,
                num_ineq_constraints.len(),
            ));
        }
        Ok(Self {
            num_stages,
            num_states,
            num_inputs,
            num_ineq_constraints,
        })
    }

    /// Problem with the same state and input dimension at every stage and no
    /// inequality constraints.
    pub fn uniform(num_stages: usize, state_dim: usize, input_dim: usize) -> Self {
        Self {
            num_stages,
            num_states: vec![state_dim; num_stages + 1],
            num_inputs: vec![input_dim; num_stages],
            num_ineq_constraints: vec![0; num_stages + 1],
        }
    }

    pub const fn num_stages(&self) -> usize {
        self.num_stages
    }

    pub fn num_states(&self) -> &[usize] {
        &self.num_states
    }

    pub fn num_inputs(&self) -> &[usize] {
        &self.num_inputs
    }

    pub fn num_ineq_constraints(&self) -> &[usize] {
        &self.num_ineq_constraints
    }

    /// Every state except the fixed stage-0 state, plus every input.
    pub fn num_decision_variables(&self) -> usize {
        self.num_dynamics_constraints() + self.num_inputs.iter().sum::<usize>()
    }

    /// One dynamics row per state component after stage 0.
    pub fn num_dynamics_constraints(&self) -> usize {
        self.num_states.iter().skip(1).sum()
    }

    pub fn num_inequality_constraints(&self) -> usize {
        self.num_ineq_constraints.iter().sum()
    }

    /// Fails with [`StructureError::InvalidStageCount`] when there is no
    /// dynamics transition to operate on.
    pub const fn require_transitions(&self) -> Result<(), StructureError> {
        if self.num_stages < 1 {
            return Err(StructureError::InvalidStageCount(self.num_stages));
        }
        Ok(())
    }
}
