//! Transport layer abstraction.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};

/// HTTP OK.
pub const HTTP_OK: u16 = 200;
/// HTTP Unauthorized.
pub const HTTP_UNAUTHORIZED: u16 = 401;
/// HTTP Forbidden, sent when the device must be provisioned.
pub const HTTP_FORBIDDEN: u16 = 403;
/// Exchange-specific "retry after provisioning".
pub const HTTP_NEED_PROVISIONING: u16 = 449;

/// A command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status.
    pub status: u16,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// A 200 response with a body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: HTTP_OK,
            body: body.into(),
        }
    }

    /// A 200 response with no body.
    pub fn empty() -> Self {
        Self::ok(Bytes::new())
    }

    /// An empty response with another status.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            body: Bytes::new(),
        }
    }

    /// Returns true if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Maps non-200 statuses to errors.
    pub fn check_status(&self) -> SyncResult<()> {
        match self.status {
            HTTP_OK => Ok(()),
            HTTP_UNAUTHORIZED => Err(SyncError::Authentication(format!(
                "server returned {}",
                self.status
            ))),
            HTTP_FORBIDDEN | HTTP_NEED_PROVISIONING => Err(SyncError::NeedsProvisioning {
                status: self.status,
            }),
            status => Err(SyncError::transport_retryable(format!(
                "server returned HTTP {}",
                status
            ))),
        }
    }
}

/// Sends encoded commands to the server.
///
/// Implementations own connection handling, authentication headers and
/// timeouts. The engine calls [`Transport::send`] once per pass.
pub trait Transport: Send + Sync {
    /// Posts `body` as `command` and waits at most `timeout` for the reply.
    fn send(&self, command: &str, body: Bytes, timeout: Duration) -> SyncResult<Response>;
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Command name.
    pub command: String,
    /// Encoded body.
    pub body: Bytes,
    /// Timeout passed by the engine.
    pub timeout: Duration,
}

/// A mock transport for testing.
///
/// Responses are returned in the order they were queued. Once the queue is
/// empty every call fails with a non-retryable transport error.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<SyncResult<Response>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// Creates a mock transport with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: Response) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues an error.
    pub fn push_error(&self, error: SyncError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Requests sent so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

impl Transport for MockTransport {
    fn send(&self, command: &str, body: Bytes, timeout: Duration) -> SyncResult<Response> {
        self.requests.lock().push(RecordedRequest {
            command: command.to_string(),
            body,
            timeout,
        });
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::transport_fatal("no response queued")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_transport_replays_in_order() {
        let transport = MockTransport::new();
        transport.push_response(Response::ok(vec![1u8, 2]));
        transport.push_response(Response::empty());

        let first = transport
            .send("Sync", Bytes::from_static(b"a"), Duration::from_secs(1))
            .unwrap();
        assert_eq!(first.body.as_ref(), &[1, 2]);
        assert!(transport
            .send("Sync", Bytes::new(), Duration::from_secs(1))
            .unwrap()
            .is_empty());
        assert!(transport
            .send("Sync", Bytes::new(), Duration::from_secs(1))
            .is_err());

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].command, "Sync");
        assert_eq!(requests[0].body.as_ref(), b"a");
    }

    #[test]
    fn status_mapping() {
        assert!(Response::empty().check_status().is_ok());
        assert!(matches!(
            Response::with_status(401).check_status(),
            Err(SyncError::Authentication(_))
        ));
        assert!(matches!(
            Response::with_status(449).check_status(),
            Err(SyncError::NeedsProvisioning { status: 449 })
        ));
        let err = Response::with_status(503).check_status().unwrap_err();
        assert!(err.is_retryable());
    }
}
