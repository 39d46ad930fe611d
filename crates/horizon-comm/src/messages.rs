//! JSON-serialisable messages exchanged with an MPC node.
//!
//! Vectors travel as plain `Vec<f64>` and trajectories as `Vec<Vec<f64>>`
//! (one inner vector per time sample).
//!
//! A client sends [`Request`]s. The node answers resets with
//! [`Response::ResetAck`] and failures with [`Response::Error`]; policies are
//! pushed asynchronously as [`Response::Policy`] whenever a solve completes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Measured system state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationMessage {
    pub time: f64,
    pub state: Vec<f64>,
    #[serde(default)]
    pub input: Vec<f64>,
    /// Execution-status tag (active subsystem).
    #[serde(default)]
    pub mode: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTrajectoriesMessage {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub inputs: Vec<Vec<f64>>,
}

/// `mode_sequence[i + 1]` is active after `event_times[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeScheduleMessage {
    pub event_times: Vec<f64>,
    pub mode_sequence: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerType {
    Feedforward,
    Linear,
}

/// Flattened control law.
///
/// One `data` row per entry of `time_array`:
/// - `Feedforward`: the input `u` (`input_dim` values),
/// - `Linear`: the bias `uff` followed by the gain `K` in column-major
///   order (`input_dim + input_dim * state_dim` values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerMessage {
    pub controller_type: ControllerType,
    pub state_dim: usize,
    pub input_dim: usize,
    pub time_array: Vec<f64>,
    pub data: Vec<Vec<f64>>,
}

/// A solved policy together with the command data that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMessage {
    /// False when the same policy has already been emitted.
    pub controller_is_updated: bool,
    pub init_observation: ObservationMessage,
    pub target: TargetTrajectoriesMessage,
    pub mode_schedule: ModeScheduleMessage,
    pub time_trajectory: Vec<f64>,
    pub state_trajectory: Vec<Vec<f64>>,
    pub input_trajectory: Vec<Vec<f64>>,
    pub controller: ControllerMessage,
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A message from the control client to the MPC node.
///
/// # Example
///
/// ```
/// use horizon_comm::Request;
///
/// let json = r#"{"type":"observation","observation":{"time":0.0,"state":[1.0,0.0]}}"#;
/// let req: Request = serde_json::from_str(json).unwrap();
/// assert!(matches!(req, Request::Observation { .. }));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Trigger a solve from this state.
    Observation { observation: ObservationMessage },
    /// Replace the tracked target from the next solve on.
    TargetTrajectories { target: TargetTrajectoriesMessage },
    /// Replace the mode schedule from the next solve on.
    ModeSchedule { mode_schedule: ModeScheduleMessage },
    /// Reset the solver and adopt `target`.
    Reset { target: TargetTrajectoriesMessage },
    /// Shut the node's pipeline down and disconnect.
    Close,
}

/// A message from the MPC node to the control client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// The reset was recorded and is applied on the next observation.
    ResetAck,
    /// A newly published policy.
    Policy { policy: Box<PolicyMessage> },
    /// A request could not be served.
    Error { message: String },
}

impl Response {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn policy(policy: PolicyMessage) -> Self {
        Self::Policy {
            policy: Box::new(policy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tags_are_snake_case() {
        let json = serde_json::to_string(&Request::TargetTrajectories {
            target: TargetTrajectoriesMessage {
                times: vec![0.0],
                states: vec![vec![0.0, 0.0]],
                inputs: vec![vec![0.0]],
            },
        })
        .unwrap();
        assert!(json.contains(r#""type":"target_trajectories""#));
    }

    #[test]
    fn observation_defaults_input_and_mode() {
        let obs: ObservationMessage = serde_json::from_str(r#"{"time":1.5,"state":[0.0]}"#).unwrap();
        assert!(obs.input.is_empty());
        assert_eq!(obs.mode, 0);
    }

    #[test]
    fn close_and_reset_ack_have_no_fields() {
        assert_eq!(serde_json::to_string(&Request::Close).unwrap(), r#"{"type":"close"}"#);
        assert_eq!(
            serde_json::to_string(&Response::ResetAck).unwrap(),
            r#"{"type":"reset_ack"}"#
        );
    }

    #[test]
    fn controller_type_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&ControllerType::Feedforward).unwrap(),
            r#""feedforward""#
        );
    }

    #[test]
    fn error_response_carries_message() {
        let json = serde_json::to_string(&Response::error("solve failed")).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("solve failed"));
    }
}
