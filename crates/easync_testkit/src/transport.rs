//! Scripted transport.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use easync_engine::{RecordedRequest, Response, Session, SyncError, SyncResult, Transport};
use parking_lot::Mutex;

use crate::fixtures::describe;

enum Step {
    Respond(Response),
    Fail(SyncError),
    StopThenRespond(Session, Response),
}

/// A transport that plays back a script and records every request.
///
/// Unlike [`easync_engine::MockTransport`], a step can also act on the
/// session, which lets tests stop a session while a pass is in flight.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Creates an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers the next request with a 200 and `body`.
    pub fn respond(self, body: impl Into<Bytes>) -> Self {
        self.steps.lock().push_back(Step::Respond(Response::ok(body)));
        self
    }

    /// Answers the next request with an empty 200.
    pub fn respond_empty(self) -> Self {
        self.steps.lock().push_back(Step::Respond(Response::empty()));
        self
    }

    /// Answers the next request with an empty response of `status`.
    pub fn respond_status(self, status: u16) -> Self {
        self.steps
            .lock()
            .push_back(Step::Respond(Response::with_status(status)));
        self
    }

    /// Fails the next request.
    pub fn fail(self, error: SyncError) -> Self {
        self.steps.lock().push_back(Step::Fail(error));
        self
    }

    /// Stops `session`, then answers the next request with `body`.
    pub fn stop_then_respond(self, session: &Session, body: impl Into<Bytes>) -> Self {
        self.steps
            .lock()
            .push_back(Step::StopThenRespond(session.clone(), Response::ok(body)));
        self
    }

    /// Requests sent so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Flattened body of request `index`. See [`describe`].
    pub fn request_lines(&self, index: usize) -> Vec<String> {
        self.requests
            .lock()
            .get(index)
            .map(|request| describe(&request.body))
            .unwrap_or_default()
    }

    /// Steps not yet played.
    pub fn remaining(&self) -> usize {
        self.steps.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, command: &str, body: Bytes, timeout: Duration) -> SyncResult<Response> {
        self.requests.lock().push(RecordedRequest {
            command: command.to_string(),
            body,
            timeout,
        });
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::StopThenRespond(session, response)) => {
                session.stop();
                Ok(response)
            }
            None => Err(SyncError::transport_fatal("script exhausted")),
        }
    }
}
