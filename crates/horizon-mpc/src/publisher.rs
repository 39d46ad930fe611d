//! The dedicated policy publishing thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use horizon_comm::{PolicyMessage, PolicyPublisher};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::shared::Shared;

/// Owns the publishing thread; dropping it shuts the thread down and joins.
#[derive(Debug)]
pub(crate) struct PublisherThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PublisherThread {
    pub(crate) fn spawn(
        name: &str,
        shared: Arc<Shared>,
        publisher: Box<dyn PolicyPublisher>,
    ) -> Result<Self, PipelineError> {
        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || publish_loop(&loop_shared, publisher))
            .map_err(PipelineError::Spawn)?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub(crate) fn join(&mut self) {
        self.shared.terminate();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Policy publisher thread panicked");
            }
        }
    }
}

impl Drop for PublisherThread {
    fn drop(&mut self) {
        self.join();
    }
}

/// Emit the current policy each time new data is committed, until shutdown.
///
/// The policy lock is held only to clone the `Arc`; serialization and I/O
/// happen outside it.
fn publish_loop(shared: &Shared, mut publisher: Box<dyn PolicyPublisher>) {
    info!("Policy publisher started");
    let mut last_emitted = 0;
    while shared.wait_for_data() {
        let Some(policy) = shared.current() else {
            continue;
        };
        let controller_is_updated = policy.sequence != last_emitted;
        last_emitted = policy.sequence;
        let message = PolicyMessage::new(&policy.solution, &policy.command, controller_is_updated);
        match publisher.publish(message) {
            Ok(()) => debug!(
                sequence = policy.sequence,
                time = policy.command.observation.time,
                "Policy published"
            ),
            Err(e) => warn!(sequence = policy.sequence, "Failed to publish policy: {e}"),
        }
    }
    info!("Policy publisher stopped");
}
