//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Respond(TransportResponse),
    Fail(TransportError),
    /// Never completes; exercises the caller's timeout.
    Hang,
}

impl Step {
    pub(crate) fn status(status: u16) -> Self {
        Step::Respond(TransportResponse::new(status, Value::Null))
    }

    pub(crate) fn json(status: u16, body: Value) -> Self {
        Step::Respond(TransportResponse::new(status, body))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub request: TransportRequest,
    pub at: Instant,
}

/// Plays back steps in order, then repeats `repeat` (if any) forever.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    repeat: Option<Step>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        }
    }

    pub(crate) fn always(step: Step) -> Self {
        Self {
            repeat: Some(step),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            request,
            at: Instant::now(),
        });
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone());
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(TransportError::Network("script exhausted".to_string())),
        }
    }
}
