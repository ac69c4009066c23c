//! Request/response correlation.
//!
//! SLCP frames carry no request id. A response is matched to its request by
//! shape: the command byte and, optionally, a parameter prefix. Every pending
//! request registers an [`Expectation`] and an [`ErrorMatcher`]; each decoded
//! frame is offered to the pending requests in registration order and settles
//! the first one it matches.
//!
//! Two requests waiting on the same shape are ambiguous: the first frame of
//! that shape settles whichever registered first. Callers that care must
//! serialize same-shape requests.
//!
//! There is no timeout. A request whose response never arrives stays pending
//! until the connection closes.

use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{L8Error, Result};
use crate::protocol::{slcp, Frame};

/// Response shape that completes a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Generic `OK` frame echoing the sent command byte.
    Acknowledge,
    /// A specific command, optionally with a parameter prefix.
    Response {
        command: u8,
        parameters: Option<Bytes>,
    },
}

/// Response shape that fails a request with [`L8Error::Device`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorMatcher {
    /// Errors are not recognised; only the expectation can settle.
    Never,
    /// Generic `ERR` frame carrying the sent command byte.
    Generic,
    /// A custom error frame.
    Frame {
        command: u8,
        parameters: Option<Bytes>,
    },
}

fn shape_matches(frame: &Frame, command: u8, parameters: &Option<Bytes>) -> bool {
    frame.command() == command
        && parameters
            .as_ref()
            .map_or(true, |p| frame.parameters().starts_with(p))
}

impl Expectation {
    fn matches(&self, sent: u8, frame: &Frame) -> bool {
        match self {
            Expectation::Acknowledge => frame.is_ok_for(sent),
            Expectation::Response {
                command,
                parameters,
            } => shape_matches(frame, *command, parameters),
        }
    }
}

impl ErrorMatcher {
    fn matches(&self, sent: u8, frame: &Frame) -> bool {
        match self {
            ErrorMatcher::Never => false,
            ErrorMatcher::Generic => frame.is_error_for(sent),
            ErrorMatcher::Frame {
                command,
                parameters,
            } => shape_matches(frame, *command, parameters),
        }
    }
}

/// Handle to one registered request.
#[derive(Debug)]
pub struct PendingResponse {
    id: u64,
    rx: oneshot::Receiver<Result<Frame>>,
}

impl PendingResponse {
    /// Registration id, used to cancel.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the matching frame.
    pub async fn wait(self) -> Result<Frame> {
        self.rx.await.unwrap_or(Err(L8Error::ConnectionClosed))
    }
}

struct Pending {
    id: u64,
    sent: u8,
    expectation: Expectation,
    errors: ErrorMatcher,
    settle: oneshot::Sender<Result<Frame>>,
}

#[derive(Debug, Clone)]
enum Shutdown {
    Closed,
    Desynchronized(String),
    Transport(std::io::ErrorKind, String),
}

impl Shutdown {
    fn to_error(&self) -> L8Error {
        match self {
            Shutdown::Closed => L8Error::ConnectionClosed,
            Shutdown::Desynchronized(reason) => L8Error::Protocol(reason.clone()),
            Shutdown::Transport(kind, message) => {
                L8Error::Io(std::io::Error::new(*kind, message.clone()))
            }
        }
    }
}

#[derive(Default)]
struct Inner {
    pending: Vec<Pending>,
    next_id: u64,
    shutdown: Option<Shutdown>,
}

impl Inner {
    /// Drop requests whose caller stopped waiting; they no longer claim frames.
    fn prune_abandoned(&mut self) {
        self.pending.retain(|p| !p.settle.is_closed());
    }
}

/// Registry of requests awaiting a response on one connection.
#[derive(Default)]
pub struct Correlator {
    inner: Mutex<Inner>,
}

impl Correlator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a request for `sent` awaiting `expectation`.
    ///
    /// Fails immediately if the connection has already shut down.
    pub fn register(
        &self,
        sent: u8,
        expectation: Expectation,
        errors: ErrorMatcher,
    ) -> Result<PendingResponse> {
        let mut inner = self.lock();
        if let Some(shutdown) = &inner.shutdown {
            return Err(shutdown.to_error());
        }
        inner.prune_abandoned();

        let id = inner.next_id;
        inner.next_id += 1;

        let (settle, rx) = oneshot::channel();
        inner.pending.push(Pending {
            id,
            sent,
            expectation,
            errors,
            settle,
        });
        Ok(PendingResponse { id, rx })
    }

    /// Fail if the connection has shut down.
    pub fn check_open(&self) -> Result<()> {
        match &self.lock().shutdown {
            Some(shutdown) => Err(shutdown.to_error()),
            None => Ok(()),
        }
    }

    /// Remove a request without settling it.
    pub fn cancel(&self, id: u64) {
        self.lock().pending.retain(|p| p.id != id);
    }

    /// Offer a frame to the pending requests.
    ///
    /// Returns `true` if the frame settled a request, `false` if it is
    /// unsolicited.
    pub fn dispatch(&self, frame: &Frame) -> bool {
        let mut inner = self.lock();
        inner.prune_abandoned();

        let position = inner.pending.iter().position(|p| {
            p.errors.matches(p.sent, frame) || p.expectation.matches(p.sent, frame)
        });

        let Some(index) = position else {
            return false;
        };

        let pending = inner.pending.remove(index);
        let result = if pending.errors.matches(pending.sent, frame) {
            tracing::debug!(
                "Device rejected {} ({:#04x})",
                slcp::name(pending.sent),
                pending.sent
            );
            Err(L8Error::Device {
                command: pending.sent,
            })
        } else {
            Ok(frame.clone())
        };
        let _ = pending.settle.send(result);
        true
    }

    /// Fail every pending request and refuse new ones.
    pub fn close(&self) {
        self.shutdown(Shutdown::Closed);
    }

    /// Fail every pending request with a protocol error and refuse new ones.
    pub fn desynchronize(&self, reason: impl Into<String>) {
        self.shutdown(Shutdown::Desynchronized(reason.into()));
    }

    /// Fail every pending request with the transport's error and refuse new ones.
    pub fn fail(&self, error: &std::io::Error) {
        self.shutdown(Shutdown::Transport(error.kind(), error.to_string()));
    }

    fn shutdown(&self, shutdown: Shutdown) {
        let mut inner = self.lock();
        for pending in inner.pending.drain(..) {
            let _ = pending.settle.send(Err(shutdown.to_error()));
        }
        inner.shutdown.get_or_insert(shutdown);
    }

    /// Number of requests still waiting.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}
