//! Scripted in-memory `Transport` for exercising the batch engine.
//!
//! Each `perform` finishes one attached handle, in submission order unless
//! `completion_order` says otherwise, so tests can see the engine wait,
//! reorder and tear down without any network.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use rest_client_core::{HandleSettings, Payload, PreparedRequest, RawMetadata, Step, StepStatus, Transport, TransportError};
use serde_json::json;

#[derive(Debug, Default, Clone)]
pub struct Script {
    pub fail_controller: bool,
    /// Handle id whose creation fails.
    pub fail_handle_at: Option<usize>,
    /// Step number (1-based) that reports a controller failure.
    pub fail_step_at: Option<usize>,
    /// Number of leading steps answering `Retry`.
    pub retry_steps: usize,
    /// Attach positions in the order they finish.
    pub completion_order: Option<Vec<usize>>,
    pub status_codes: HashMap<usize, u16>,
    /// Handle id whose metadata lacks `http_code`.
    pub malformed_at: Option<usize>,
    /// Handle id whose transfer never produced a response.
    pub transfer_failure_at: Option<usize>,
}

#[derive(Debug, Default, Clone)]
pub struct Log {
    pub controllers_created: usize,
    pub controllers_closed: usize,
    pub handles_created: usize,
    pub configured: Vec<PreparedRequest>,
    pub settings: Vec<HandleSettings>,
    pub attached: Vec<usize>,
    pub detached: Vec<usize>,
    pub closed: Vec<usize>,
    pub steps: usize,
    pub waits: usize,
    /// Finish sequence number per handle id.
    pub finished: HashMap<usize, usize>,
}

impl Log {
    pub fn all_released(&self) -> bool {
        let mut closed = self.closed.clone();
        closed.sort_unstable();
        closed == (0..self.handles_created).collect::<Vec<_>>() && self.controllers_closed == self.controllers_created
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Script,
    log: RefCell<Log>,
}

#[derive(Debug)]
pub struct FakeHandle {
    id: usize,
    request: Option<PreparedRequest>,
}

#[derive(Debug)]
pub struct FakeController {
    attached: Vec<usize>,
    done: usize,
}

impl ScriptedTransport {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            log: RefCell::default(),
        }
    }

    pub fn log(&self) -> Log {
        self.log.borrow().clone()
    }
}

fn payload_text(payload: &Payload) -> String {
    match payload {
        Payload::Text(text) => text.clone(),
        Payload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Payload::Form(fields) => fields.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&"),
        Payload::Json(value) => value.to_string(),
    }
}

impl Transport for ScriptedTransport {
    type Handle = FakeHandle;
    type Controller = FakeController;

    fn create_controller(&self) -> Result<FakeController, TransportError> {
        if self.script.fail_controller {
            return Err(TransportError::new("multi handle failed to initialize"));
        }
        self.log.borrow_mut().controllers_created += 1;
        Ok(FakeController {
            attached: Vec::new(),
            done: 0,
        })
    }

    fn create_handle(&self, settings: &HandleSettings) -> Result<FakeHandle, TransportError> {
        let mut log = self.log.borrow_mut();
        let id = log.handles_created;
        if self.script.fail_handle_at == Some(id) {
            return Err(TransportError::new("handle failed to initialize"));
        }
        log.handles_created += 1;
        log.settings.push(settings.clone());
        Ok(FakeHandle { id, request: None })
    }

    fn configure(&self, handle: &mut FakeHandle, request: PreparedRequest) {
        self.log.borrow_mut().configured.push(request.clone());
        handle.request = Some(request);
    }

    fn attach(&self, controller: &mut FakeController, handle: &mut FakeHandle) -> Result<(), TransportError> {
        controller.attached.push(handle.id);
        self.log.borrow_mut().attached.push(handle.id);
        Ok(())
    }

    fn detach(&self, _controller: &mut FakeController, handle: &mut FakeHandle) {
        self.log.borrow_mut().detached.push(handle.id);
    }

    fn perform(&self, controller: &mut FakeController) -> Step {
        let mut log = self.log.borrow_mut();
        log.steps += 1;
        let active = controller.attached.len() - controller.done;

        if log.steps <= self.script.retry_steps {
            return Step {
                status: StepStatus::Retry,
                active,
            };
        }
        if self.script.fail_step_at == Some(log.steps) {
            return Step {
                status: StepStatus::Failed("internal error".to_string()),
                active,
            };
        }
        if active > 0 {
            let position = match &self.script.completion_order {
                Some(order) => order[controller.done],
                None => controller.done,
            };
            let id = controller.attached[position];
            let sequence = log.finished.len();
            log.finished.insert(id, sequence);
            controller.done += 1;
        }
        Step {
            status: StepStatus::Ok,
            active: controller.attached.len() - controller.done,
        }
    }

    fn wait(&self, _controller: &mut FakeController, _timeout: Duration) {
        self.log.borrow_mut().waits += 1;
    }

    fn take_body(&self, handle: &mut FakeHandle) -> Vec<u8> {
        let url = handle.request.as_ref().map(|r| r.url.as_str()).unwrap_or_default();
        format!("body of {url}").into_bytes()
    }

    fn metadata(&self, handle: &FakeHandle) -> RawMetadata {
        let request = handle.request.as_ref();
        let url = request.map(|r| r.url.clone()).unwrap_or_default();
        let method = request.map(|r| r.method.as_str()).unwrap_or_default();
        let payload = request.and_then(|r| r.payload.as_ref()).map(payload_text);
        let finished = self.log.borrow().finished.get(&handle.id).copied();
        let status = self.script.status_codes.get(&handle.id).copied().unwrap_or(200);

        let mut metadata = RawMetadata::new();
        metadata.insert("url".to_string(), json!(url));
        metadata.insert("content_type".to_string(), json!("application/json"));
        if self.script.malformed_at != Some(handle.id) {
            metadata.insert("http_code".to_string(), json!(status));
        }
        metadata.insert("request_header".to_string(), json!(format!("{method} {url}")));
        metadata.insert("finished".to_string(), json!(finished));
        metadata.insert("payload".to_string(), json!(payload));
        metadata
    }

    fn failure(&self, handle: &FakeHandle) -> Option<String> {
        (self.script.transfer_failure_at == Some(handle.id)).then(|| "connection refused".to_string())
    }

    fn close_handle(&self, handle: FakeHandle) {
        self.log.borrow_mut().closed.push(handle.id);
    }

    fn close_controller(&self, _controller: FakeController) {
        self.log.borrow_mut().controllers_closed += 1;
    }
}
