//! Policy transports.

use std::io::Write;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::error::TransportError;
use crate::framing::encode_frame;
use crate::messages::{PolicyMessage, Response};

/// Sink for solved policies.
///
/// Called from the pipeline's publisher thread, one policy at a time.
pub trait PolicyPublisher: Send {
    fn publish(&mut self, policy: PolicyMessage) -> Result<(), TransportError>;
}

impl<P: PolicyPublisher + ?Sized> PolicyPublisher for Box<P> {
    fn publish(&mut self, policy: PolicyMessage) -> Result<(), TransportError> {
        (**self).publish(policy)
    }
}

// ---------------------------------------------------------------------------
// FramedPublisher
// ---------------------------------------------------------------------------

/// Writes each policy as a framed [`Response::Policy`].
///
/// The writer is shared so that a connection handler can interleave its own
/// responses on the same stream without tearing frames.
pub struct FramedPublisher<W> {
    writer: Arc<Mutex<W>>,
}

impl<W: Write + Send> FramedPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self::from_shared(Arc::new(Mutex::new(writer)))
    }

    pub const fn from_shared(writer: Arc<Mutex<W>>) -> Self {
        Self { writer }
    }

    /// Handle to the underlying writer.
    pub fn writer(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.writer)
    }
}

impl<W: Write + Send> PolicyPublisher for FramedPublisher<W> {
    fn publish(&mut self, policy: PolicyMessage) -> Result<(), TransportError> {
        trace!(updated = policy.controller_is_updated, "writing policy frame");
        // Encode before locking; the lock only covers the write.
        let frame = encode_frame(&Response::policy(policy))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ChannelPublisher
// ---------------------------------------------------------------------------

/// Forwards policies to an in-process receiver.
#[derive(Clone, Debug)]
pub struct ChannelPublisher {
    sender: Sender<PolicyMessage>,
}

impl ChannelPublisher {
    pub fn channel() -> (Self, Receiver<PolicyMessage>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl PolicyPublisher for ChannelPublisher {
    fn publish(&mut self, policy: PolicyMessage) -> Result<(), TransportError> {
        self.sender
            .send(policy)
            .map_err(|_| TransportError::Disconnected)
    }
}
