//! TCP server exposing a policy pipeline to a remote control loop.
//!
//! [`MpcNode`] listens on a TCP port and serves one client at a time. The
//! client streams [`Request`]s; solved policies are pushed back on the same
//! connection as [`Response::Policy`] frames by the pipeline's publisher
//! thread, interleaved with the node's own acknowledgements.

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};

use horizon_comm::{
    FramedPublisher, ModeScheduleMessage, ObservationMessage, Request, Response,
    TargetTrajectoriesMessage, TransportError, read_message, write_message,
};
use horizon_core::{ModeSchedule, Observation, PipelineSettings, TargetTrajectories};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::hooks::PipelineHooks;
use crate::pipeline::PolicyPipeline;
use crate::shared::PipelineHandle;
use crate::solver::MpcSolver;

/// TCP server driving an [`MpcSolver`] through a [`PolicyPipeline`].
pub struct MpcNode {
    listener: TcpListener,
    settings: PipelineSettings,
}

impl MpcNode {
    /// Bind to the given address (e.g. `"127.0.0.1:9877"`).
    pub fn bind(addr: &str, settings: PipelineSettings) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, settings })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one client and serve it until it sends
    /// [`Close`](Request::Close) or disconnects.
    ///
    /// A fresh pipeline is launched for the connection and shut down when it
    /// ends.
    pub fn serve_one<S: MpcSolver>(&self, solver: &mut S) -> Result<(), PipelineError> {
        self.serve_one_with_hooks(solver, crate::hooks::NoHooks)
    }

    pub fn serve_one_with_hooks<S: MpcSolver>(
        &self,
        solver: &mut S,
        hooks: impl PipelineHooks,
    ) -> Result<(), PipelineError> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Io)?;
        info!(%peer, "Client connected");
        let result = self.handle_connection(stream, solver, hooks);
        info!(%peer, "Client disconnected");
        result
    }

    fn handle_connection<S: MpcSolver>(
        &self,
        stream: TcpStream,
        solver: &mut S,
        hooks: impl PipelineHooks,
    ) -> Result<(), PipelineError> {
        let mut reader = stream.try_clone().map_err(TransportError::Io)?;
        let writer = Arc::new(Mutex::new(stream));

        let mut pipeline =
            PolicyPipeline::new(solver, self.settings.clone()).with_hooks(hooks);
        pipeline.launch(FramedPublisher::from_shared(Arc::clone(&writer)))?;
        let handle = pipeline.handle();

        loop {
            let request: Option<Request> = read_message(&mut reader)?;
            let Some(request) = request else {
                break; // Client disconnected
            };
            let response = match request {
                Request::Close => break,
                Request::Observation { observation } => {
                    on_observation(&mut pipeline, &observation)
                }
                other => dispatch(&handle, other),
            };
            if let Some(response) = response {
                send(&writer, &response)?;
            }
        }

        pipeline.shutdown();
        Ok(())
    }
}

fn on_observation<S: MpcSolver>(
    pipeline: &mut PolicyPipeline<'_, S>,
    message: &ObservationMessage,
) -> Option<Response> {
    let observation = match Observation::try_from(message) {
        Ok(observation) => observation,
        Err(e) => return Some(Response::error(format!("malformed observation: {e}"))),
    };
    // Successful solves are answered by the publisher thread.
    pipeline
        .on_observation(&observation)
        .err()
        .map(|e| Response::error(e.to_string()))
}

fn dispatch(handle: &PipelineHandle, request: Request) -> Option<Response> {
    let result = match request {
        Request::TargetTrajectories { target } => {
            decode_target(&target).and_then(|target| handle.update_target(target))
        }
        Request::ModeSchedule { mode_schedule } => decode_mode_schedule(&mode_schedule)
            .and_then(|schedule| handle.update_mode_schedule(schedule)),
        Request::Reset { target } => {
            return Some(
                match decode_target(&target).and_then(|target| handle.request_reset(target)) {
                    Ok(()) => Response::ResetAck,
                    Err(e) => Response::error(e.to_string()),
                },
            );
        }
        Request::Observation { .. } | Request::Close => return None,
    };
    result.err().map(|e| {
        warn!("Request rejected: {e}");
        Response::error(e.to_string())
    })
}

fn decode_target(message: &TargetTrajectoriesMessage) -> Result<TargetTrajectories, PipelineError> {
    TargetTrajectories::try_from(message).map_err(|e| TransportError::Malformed(e).into())
}

fn decode_mode_schedule(message: &ModeScheduleMessage) -> Result<ModeSchedule, PipelineError> {
    ModeSchedule::try_from(message).map_err(|e| TransportError::Malformed(e).into())
}

fn send<W: Write>(writer: &Mutex<W>, response: &Response) -> Result<(), TransportError> {
    let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
    write_message(&mut *writer, response)
}
