use horizon_core::{ControlLaw, StructureError};
use nalgebra::{DMatrix, DVector};

/// Affine feedback `u = bias + gain·x` sampled on one time partition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearController {
    pub times: Vec<f64>,
    pub biases: Vec<DVector<f64>>,
    pub gains: Vec<DMatrix<f64>>,
}

impl LinearController {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.biases.clear();
        self.gains.clear();
    }

    /// Join consecutive partitions into one control law.
    pub fn concatenate<'a>(
        partitions: impl IntoIterator<Item = &'a Self>,
    ) -> Result<ControlLaw, StructureError> {
        let mut times = Vec::new();
        let mut biases = Vec::new();
        let mut gains = Vec::new();
        for controller in partitions {
            times.extend_from_slice(&controller.times);
            biases.extend(controller.biases.iter().cloned());
            gains.extend(controller.gains.iter().cloned());
        }
        ControlLaw::linear(times, biases, gains)
    }
}
