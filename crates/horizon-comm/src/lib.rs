//! Communication layer of a horizon MPC node.
//!
//! - [`messages`]: serialisable observation, target, mode-schedule and policy
//!   messages, plus the [`Request`]/[`Response`] envelopes
//! - [`convert`]: conversions between messages and `horizon-core` types,
//!   including reconstruction of a callable control law from a policy
//! - [`framing`]: length-prefixed JSON wire format (4-byte LE `u32` + payload)
//! - [`publisher`]: the [`PolicyPublisher`] transport trait with a framed
//!   stream and an in-process channel implementation

pub mod convert;
pub mod error;
pub mod framing;
pub mod messages;
pub mod publisher;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::TransportError;
pub use framing::{MAX_MESSAGE_SIZE, encode_frame, read_message, write_message};
pub use messages::{
    ControllerMessage, ControllerType, ModeScheduleMessage, ObservationMessage, PolicyMessage,
    Request, Response, TargetTrajectoriesMessage,
};
pub use publisher::{ChannelPublisher, FramedPublisher, PolicyPublisher};
