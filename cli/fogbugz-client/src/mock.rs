//! A transport that can be seeded with canned responses.
//!
//! Used by the client's own tests and available to consumers that want to
//! exercise code built on [crate::FogbugzClient] without a FogBugz instance.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::command::ApiRequest;
use crate::transport::{TransportError, TransportTrait};

type MockField<T> = Arc<Mutex<T>>;

#[derive(Debug)]
pub enum MockResponse {
    /// A response body, returned as if the HTTP request succeeded.
    Body(String),
    /// A transport failure.
    Error(TransportError),
}

/// Returns queued responses in order and records every request it receives.
///
/// Clones share their queues, so a test can keep a handle after moving the
/// transport into a client.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    responses: MockField<VecDeque<MockResponse>>,
    requests: MockField<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a response body into the list of mock responses
    pub fn push_body(&self, body: impl Into<String>) {
        self.responses
            .lock()
            .expect("couldn't acquire mock lock")
            .push_back(MockResponse::Body(body.into()));
    }

    /// Push a transport failure into the list of mock responses
    pub fn push_error(&self, err: impl Into<TransportError>) {
        self.responses
            .lock()
            .expect("couldn't acquire mock lock")
            .push_back(MockResponse::Error(err.into()));
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .expect("couldn't acquire mock lock")
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("couldn't acquire mock lock").len()
    }

    /// Number of queued responses that have not been consumed.
    pub fn pending(&self) -> usize {
        self.responses
            .lock()
            .expect("couldn't acquire mock lock")
            .len()
    }
}

impl TransportTrait for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<String, TransportError> {
        debug!(cmd = request.cmd(), "mock transport received request");
        self.requests
            .lock()
            .expect("couldn't acquire mock lock")
            .push(request);

        let mock_resp = self
            .responses
            .lock()
            .expect("couldn't acquire mock lock")
            .pop_front();
        match mock_resp {
            Some(MockResponse::Body(body)) => Ok(body),
            Some(MockResponse::Error(err)) => Err(err),
            None => panic!("mock transport has no response queued"),
        }
    }
}
