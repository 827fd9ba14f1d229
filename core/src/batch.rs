//! Parallel batch engine.
//!
//! # Design
//! A batch call walks `Validating → HandlesAcquired → Configuring →
//! Executing → Draining → Completed`, or drops to `Failed` from any step.
//! Input is checked before the transport is touched at all. Once the
//! controller exists, every transport resource lives in a `Session` whose
//! `Drop` detaches and closes each handle once and then closes the
//! controller, so teardown runs on success, on error and on unwind.
//!
//! Failure is all-or-nothing: one failed transfer or one malformed result
//! discards the whole batch. HTTP error statuses are results, not failures.

use std::fmt;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::RequestConfig;
use crate::error::RestError;
use crate::http::{HandleSettings, HttpMethod, Payload, PreparedRequest};
use crate::response::{ResponseAggregate, ResponseResult};
use crate::transport::{StepStatus, Transport};
use crate::url::build_url;

/// Upper bound on a single `Transport::wait` call inside the drive loop.
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    Validating,
    HandlesAcquired,
    Configuring,
    Executing,
    Draining,
    Completed,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Validating => "validating",
            BatchState::HandlesAcquired => "handles_acquired",
            BatchState::Configuring => "configuring",
            BatchState::Executing => "executing",
            BatchState::Draining => "draining",
            BatchState::Completed => "completed",
            BatchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs batches against one config and one transport.
///
/// Borrows both for the duration of a call; a client creates one per call.
pub struct BatchCoordinator<'a, T: Transport> {
    transport: &'a T,
    config: &'a RequestConfig,
}

impl<'a, T: Transport> BatchCoordinator<'a, T> {
    pub fn new(transport: &'a T, config: &'a RequestConfig) -> Self {
        Self { transport, config }
    }

    /// Execute one request per action, all with the same verb.
    ///
    /// `payloads` must match `actions` one-to-one for POST and PUT and is
    /// ignored otherwise. At most `max_handles` actions are accepted.
    pub fn execute<S: AsRef<str>>(
        &self,
        method: HttpMethod,
        actions: &[S],
        payloads: &[Payload],
        max_handles: usize,
    ) -> Result<ResponseAggregate, RestError> {
        trace!(state = %BatchState::Validating, %method, size = actions.len());
        validate_batch(method, actions, payloads, max_handles)?;

        let requests = actions
            .iter()
            .enumerate()
            .map(|(i, action)| PreparedRequest {
                method,
                url: build_url(self.config, action.as_ref()),
                payload: if method.requires_payload() {
                    payloads.get(i).cloned()
                } else {
                    None
                },
            })
            .collect();

        self.run(method, requests)
    }

    /// Execute a single request through the same machinery. The action may
    /// be empty, addressing the base path itself.
    pub fn execute_one(
        &self,
        method: HttpMethod,
        action: &str,
        payload: Option<Payload>,
    ) -> Result<ResponseResult, RestError> {
        trace!(state = %BatchState::Validating, %method, size = 1);
        let payload = if method.requires_payload() {
            match payload {
                Some(payload) if !payload.is_empty() => Some(payload),
                _ => {
                    return Err(RestError::InvalidArgument(
                        "an empty value was passed for payload parameter".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        let request = PreparedRequest {
            method,
            url: build_url(self.config, action),
            payload,
        };
        let aggregate = self.run(method, vec![request])?;
        aggregate
            .into_iter()
            .next()
            .ok_or_else(|| RestError::BatchExecution("transport returned no result".to_string()))
    }

    fn run(&self, method: HttpMethod, requests: Vec<PreparedRequest>) -> Result<ResponseAggregate, RestError> {
        let size = requests.len();
        let settings = self.config.handle_settings();

        let mut session = match Session::open(self.transport, &settings, size) {
            Ok(session) => session,
            Err(err) => {
                warn!(%method, size, error = %err, "batch failed before execution");
                return Err(err);
            }
        };

        let result = session.run(requests);
        session.advance(if result.is_ok() {
            BatchState::Completed
        } else {
            BatchState::Failed
        });
        drop(session);

        match &result {
            Ok(_) => debug!(%method, size, "batch completed"),
            Err(err) => warn!(%method, size, error = %err, "batch failed; all handles released"),
        }
        result
    }
}

/// Checks every precondition of a batch before any resource is acquired.
fn validate_batch<S: AsRef<str>>(
    method: HttpMethod,
    actions: &[S],
    payloads: &[Payload],
    max_handles: usize,
) -> Result<(), RestError> {
    if actions.is_empty() {
        return Err(RestError::InvalidArgument(
            "an empty list was passed for actions parameter".to_string(),
        ));
    }
    if actions.len() > max_handles {
        return Err(RestError::CapacityExceeded {
            requested: actions.len(),
            max: max_handles,
        });
    }
    if let Some(index) = actions.iter().position(|a| a.as_ref().is_empty()) {
        return Err(RestError::InvalidArgument(format!("action at index {index} is empty")));
    }

    if method.requires_payload() {
        if payloads.len() != actions.len() {
            return Err(RestError::LengthMismatch {
                actions: actions.len(),
                payloads: payloads.len(),
            });
        }
        if let Some(index) = payloads.iter().position(Payload::is_empty) {
            return Err(RestError::InvalidArgument(format!("payload at index {index} is empty")));
        }
    }
    Ok(())
}

struct Slot<H> {
    handle: H,
    attached: bool,
}

/// Transport resources owned by one batch call.
struct Session<'t, T: Transport> {
    transport: &'t T,
    controller: Option<T::Controller>,
    handles: Vec<Slot<T::Handle>>,
    state: BatchState,
}

impl<'t, T: Transport> Session<'t, T> {
    /// Controller first, then `count` handles. A failure part way drops the
    /// session, which releases whatever was already created.
    fn open(transport: &'t T, settings: &HandleSettings, count: usize) -> Result<Self, RestError> {
        let controller = transport.create_controller().map_err(RestError::TransportInit)?;
        let mut session = Session {
            transport,
            controller: Some(controller),
            handles: Vec::with_capacity(count),
            state: BatchState::Validating,
        };
        for _ in 0..count {
            let handle = transport.create_handle(settings).map_err(RestError::TransportInit)?;
            session.handles.push(Slot {
                handle,
                attached: false,
            });
        }
        session.advance(BatchState::HandlesAcquired);
        Ok(session)
    }

    fn advance(&mut self, next: BatchState) {
        trace!(from = %self.state, to = %next, "batch state");
        self.state = next;
    }

    fn run(&mut self, requests: Vec<PreparedRequest>) -> Result<ResponseAggregate, RestError> {
        self.advance(BatchState::Configuring);
        self.configure(requests)?;
        self.advance(BatchState::Executing);
        self.drive()?;
        self.advance(BatchState::Draining);
        self.drain()
    }

    fn configure(&mut self, requests: Vec<PreparedRequest>) -> Result<(), RestError> {
        let transport = self.transport;
        let controller = self.controller.as_mut().ok_or_else(released)?;
        for (slot, request) in self.handles.iter_mut().zip(requests) {
            trace!(method = %request.method, url = %request.url, "configuring handle");
            transport.configure(&mut slot.handle, request);
            transport
                .attach(controller, &mut slot.handle)
                .map_err(RestError::TransportInit)?;
            slot.attached = true;
        }
        Ok(())
    }

    /// Step until nothing is active, blocking in `wait` between steps.
    fn drive(&mut self) -> Result<(), RestError> {
        let transport = self.transport;
        let controller = self.controller.as_mut().ok_or_else(released)?;
        loop {
            let step = transport.perform(controller);
            match step.status {
                StepStatus::Retry => continue,
                StepStatus::Failed(reason) => {
                    return Err(RestError::BatchExecution(format!(
                        "controller reported failure with {} handles active: {reason}",
                        step.active
                    )))
                }
                StepStatus::Ok if step.active == 0 => return Ok(()),
                StepStatus::Ok => {
                    trace!(active = step.active, "waiting on transport");
                    transport.wait(controller, WAIT_TIMEOUT);
                }
            }
        }
    }

    fn drain(&mut self) -> Result<ResponseAggregate, RestError> {
        let transport = self.transport;
        let mut responses = Vec::with_capacity(self.handles.len());
        for (index, slot) in self.handles.iter_mut().enumerate() {
            if let Some(reason) = transport.failure(&slot.handle) {
                return Err(RestError::BatchExecution(format!("request {index} failed: {reason}")));
            }
            let body = transport.take_body(&mut slot.handle);
            let metadata = transport.metadata(&slot.handle);
            let response = ResponseResult::from_transfer(body, metadata).map_err(RestError::MalformedResponse)?;
            responses.push(response);
        }
        Ok(ResponseAggregate::new(responses))
    }

    fn release(&mut self) {
        let transport = self.transport;
        let mut controller = self.controller.take();
        for mut slot in self.handles.drain(..) {
            if slot.attached {
                if let Some(controller) = controller.as_mut() {
                    transport.detach(controller, &mut slot.handle);
                }
            }
            transport.close_handle(slot.handle);
        }
        if let Some(controller) = controller {
            transport.close_controller(controller);
        }
    }
}

impl<T: Transport> Drop for Session<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

fn released() -> RestError {
    RestError::BatchExecution("transport controller already released".to_string())
}
