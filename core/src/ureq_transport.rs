//! `Transport` implementation on top of `ureq`.
//!
//! # Design
//! `ureq` is blocking, so concurrency comes from threads: each attached
//! handle becomes a job, the first `perform` starts one worker per job, and
//! workers signal completion over a channel that `wait` blocks on. The
//! worker writes its transfer into a slot shared with the handle, which is
//! where `take_body`/`metadata` read from once the batch is quiescent.
//! Closing the controller joins every worker, so no transfer outlives its
//! batch; each join is bounded by the handle timeout.
//!
//! Per-request HTTP statuses never count as errors
//! (`http_status_as_error(false)`), matching the batch semantics that 4xx/5xx
//! are ordinary results.

use std::borrow::Cow;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tracing::{debug, trace};
use ureq::http::{Response, Uri};
use ureq::tls::TlsConfig;
use ureq::{Agent, Body, RequestBuilder, ResponseExt};

use crate::error::TransportError;
use crate::http::{HandleSettings, HttpMethod, Payload, PreparedRequest};
use crate::transport::{RawMetadata, Step, StepStatus, Transport, CONTENT_TYPE, HTTP_CODE, REQUEST_HEADER, URL};

/// Timeouts above this many seconds (about a century) are treated as no
/// timeout; ureq adds the timeout to an `Instant`, which overflows otherwise.
const MAX_TIMEOUT_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Production transport. Stateless; every batch gets fresh agents.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }
}

enum Transfer {
    Done { body: Vec<u8>, metadata: RawMetadata },
    Failed(String),
}

type TransferSlot = Arc<Mutex<Option<Transfer>>>;

pub struct UreqHandle {
    agent: Agent,
    headers: Vec<(String, String)>,
    request: Option<PreparedRequest>,
    slot: TransferSlot,
}

type Work = Box<dyn FnOnce() -> Transfer + Send>;

struct Job {
    work: Work,
    slot: TransferSlot,
}

pub struct UreqController {
    queued: Vec<Job>,
    workers: Vec<JoinHandle<()>>,
    completed: usize,
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl UreqController {
    fn active(&self) -> usize {
        self.queued.len() + self.workers.len().saturating_sub(self.completed)
    }

    fn start_queued(&mut self) -> Result<(), String> {
        for job in self.queued.drain(..) {
            let sender = self.sender.clone();
            let name = format!("rest-batch-{}", self.workers.len());
            let worker = thread::Builder::new()
                .name(name)
                .spawn(move || {
                    let transfer = (job.work)();
                    *job.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(transfer);
                    let _ = sender.send(());
                })
                .map_err(|e| format!("failed to start worker thread: {e}"))?;
            self.workers.push(worker);
        }
        Ok(())
    }
}

impl Transport for UreqTransport {
    type Handle = UreqHandle;
    type Controller = UreqController;

    fn create_controller(&self) -> Result<UreqController, TransportError> {
        let (sender, receiver) = mpsc::channel();
        Ok(UreqController {
            queued: Vec::new(),
            workers: Vec::new(),
            completed: 0,
            sender,
            receiver,
        })
    }

    fn create_handle(&self, settings: &HandleSettings) -> Result<UreqHandle, TransportError> {
        let timeout = agent_timeout(settings.timeout_secs);
        let max_redirects = match (settings.follow_redirects, settings.max_redirects) {
            (false, _) => 0,
            (true, 0) => u32::MAX,
            (true, n) => n,
        };
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .max_redirects(max_redirects)
            .max_redirects_will_error(false)
            .tls_config(TlsConfig::builder().disable_verification(!settings.verify_tls).build())
            .build()
            .new_agent();

        let mut headers = settings.headers.clone();
        if let Some((user, password)) = &settings.basic_auth {
            let token = STANDARD.encode(format!("{user}:{password}"));
            headers.push(("Authorization".to_string(), format!("Basic {token}")));
        }

        Ok(UreqHandle {
            agent,
            headers,
            request: None,
            slot: Arc::new(Mutex::new(None)),
        })
    }

    fn configure(&self, handle: &mut UreqHandle, request: PreparedRequest) {
        handle.request = Some(request);
    }

    fn attach(&self, controller: &mut UreqController, handle: &mut UreqHandle) -> Result<(), TransportError> {
        let request = handle
            .request
            .clone()
            .ok_or_else(|| TransportError::new("handle attached before it was configured"))?;
        let agent = handle.agent.clone();
        let headers = handle.headers.clone();
        controller.queued.push(Job {
            work: Box::new(move || execute(&agent, &headers, &request)),
            slot: Arc::clone(&handle.slot),
        });
        Ok(())
    }

    fn detach(&self, _controller: &mut UreqController, handle: &mut UreqHandle) {
        handle.request = None;
    }

    fn perform(&self, controller: &mut UreqController) -> Step {
        if !controller.queued.is_empty() {
            let starting = controller.queued.len();
            if let Err(reason) = controller.start_queued() {
                return Step {
                    status: StepStatus::Failed(reason),
                    active: controller.active(),
                };
            }
            debug!(workers = starting, "started transfers");
        }

        // Count finished threads before draining: a thread that finished
        // normally has already sent its signal.
        let finished = controller.workers.iter().filter(|w| w.is_finished()).count();
        while controller.receiver.try_recv().is_ok() {
            controller.completed += 1;
        }
        if finished > controller.completed {
            return Step {
                status: StepStatus::Failed("transfer worker panicked".to_string()),
                active: controller.active(),
            };
        }

        Step {
            status: StepStatus::Ok,
            active: controller.active(),
        }
    }

    fn wait(&self, controller: &mut UreqController, timeout: Duration) {
        match controller.receiver.recv_timeout(timeout) {
            Ok(()) => controller.completed += 1,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
        }
    }

    fn take_body(&self, handle: &mut UreqHandle) -> Vec<u8> {
        let mut slot = handle.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(Transfer::Done { body, .. }) => std::mem::take(body),
            _ => Vec::new(),
        }
    }

    fn metadata(&self, handle: &UreqHandle) -> RawMetadata {
        let slot = handle.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(Transfer::Done { metadata, .. }) => metadata.clone(),
            _ => RawMetadata::new(),
        }
    }

    fn failure(&self, handle: &UreqHandle) -> Option<String> {
        let slot = handle.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(Transfer::Failed(reason)) => Some(reason.clone()),
            Some(Transfer::Done { .. }) => None,
            None => Some("transfer did not complete".to_string()),
        }
    }

    fn close_handle(&self, handle: UreqHandle) {
        drop(handle);
    }

    fn close_controller(&self, controller: UreqController) {
        let UreqController { workers, .. } = controller;
        trace!(workers = workers.len(), "closing controller");
        for worker in workers {
            // A panicked worker already surfaced as a failed step.
            let _ = worker.join();
        }
    }
}

fn agent_timeout(secs: u64) -> Option<Duration> {
    match secs {
        0 => None,
        secs if secs > MAX_TIMEOUT_SECS => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

fn execute(agent: &Agent, headers: &[(String, String)], request: &PreparedRequest) -> Transfer {
    let started = Instant::now();
    let request_header = request_header_trace(request, headers);

    let mut response = match send(agent, headers, request) {
        Ok(response) => response,
        Err(reason) => return Transfer::Failed(reason),
    };

    let http_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let final_url = response.get_uri().to_string();

    let body = if request.method == HttpMethod::Head {
        Vec::new()
    } else {
        match response.body_mut().with_config().limit(u64::MAX).read_to_vec() {
            Ok(body) => body,
            Err(e) => return Transfer::Failed(format!("failed to read response body: {e}")),
        }
    };

    let mut metadata = RawMetadata::new();
    metadata.insert(URL.to_string(), json!(final_url));
    metadata.insert(CONTENT_TYPE.to_string(), json!(content_type));
    metadata.insert(HTTP_CODE.to_string(), json!(http_code));
    metadata.insert("method".to_string(), json!(request.method.as_str()));
    metadata.insert("size_download".to_string(), json!(body.len()));
    metadata.insert("total_time".to_string(), json!(started.elapsed().as_secs_f64()));
    metadata.insert(REQUEST_HEADER.to_string(), json!(request_header));

    Transfer::Done { body, metadata }
}

fn send(agent: &Agent, headers: &[(String, String)], request: &PreparedRequest) -> Result<Response<Body>, String> {
    let url = request.url.as_str();
    let result = match request.method {
        HttpMethod::Get => with_headers(agent.get(url), headers).call(),
        HttpMethod::Delete => with_headers(agent.delete(url), headers).call(),
        HttpMethod::Head => with_headers(agent.head(url), headers).call(),
        HttpMethod::Post => return send_payload(with_headers(agent.post(url), headers), request.payload.as_ref()),
        HttpMethod::Put => return send_payload(with_headers(agent.put(url), headers), request.payload.as_ref()),
    };
    result.map_err(|e| e.to_string())
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_payload(builder: RequestBuilder<ureq::typestate::WithBody>, payload: Option<&Payload>) -> Result<Response<Body>, String> {
    let result = match payload {
        None => builder.send_empty(),
        Some(Payload::Text(text)) => builder.send(text.as_bytes()),
        Some(Payload::Bytes(bytes)) => builder.send(bytes.as_slice()),
        Some(Payload::Form(fields)) => builder.send_form(fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        Some(Payload::Json(value)) => {
            let bytes = serde_json::to_vec(value).map_err(|e| format!("failed to serialize payload: {e}"))?;
            builder.content_type("application/json").send(bytes.as_slice())
        }
    };
    result.map_err(|e| e.to_string())
}

/// Request line and caller-supplied headers of the initial request,
/// reconstructed before sending. Headers ureq adds on its own (`User-Agent`,
/// `Accept-Encoding`, `Content-Length`) are not part of it, and credentials
/// in `Authorization` are redacted.
fn request_header_trace(request: &PreparedRequest, headers: &[(String, String)]) -> String {
    let uri: Option<Uri> = request.url.parse().ok();
    let target = uri
        .as_ref()
        .and_then(|u| u.path_and_query())
        .map(|p| p.as_str())
        .unwrap_or("/");
    let host = uri.as_ref().and_then(|u| u.authority()).map(|a| a.as_str()).unwrap_or_default();

    let mut trace = format!("{} {target} HTTP/1.1\r\nHost: {host}\r\n", request.method);
    for (name, value) in headers {
        trace.push_str(&format!("{name}: {}\r\n", trace_value(name, value)));
    }
    match request.payload {
        Some(Payload::Form(_)) => trace.push_str("Content-Type: application/x-www-form-urlencoded\r\n"),
        Some(Payload::Json(_)) => trace.push_str("Content-Type: application/json\r\n"),
        _ => {}
    }
    trace.push_str("\r\n");
    trace
}

fn trace_value<'a>(name: &str, value: &'a str) -> Cow<'a, str> {
    if !name.eq_ignore_ascii_case("authorization") {
        return Cow::Borrowed(value);
    }
    match value.split_once(' ') {
        Some((scheme, _)) => Cow::Owned(format!("{scheme} <redacted>")),
        None => Cow::Borrowed("<redacted>"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn settings() -> HandleSettings {
        HandleSettings {
            timeout_secs: 30,
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            basic_auth: Some(("user".to_string(), "pass".to_string())),
            verify_tls: true,
            follow_redirects: false,
            max_redirects: 0,
        }
    }

    #[test]
    fn trace_lists_request_line_and_headers() {
        let request = PreparedRequest {
            method: HttpMethod::Get,
            url: "http://api.example.com/svc/a?x=1".to_string(),
            payload: None,
        };
        let trace = request_header_trace(&request, &[("Accept".to_string(), "text/plain".to_string())]);
        assert_eq!(trace, "GET /svc/a?x=1 HTTP/1.1\r\nHost: api.example.com\r\nAccept: text/plain\r\n\r\n");
    }

    #[test]
    fn trace_names_form_content_type() {
        let request = PreparedRequest {
            method: HttpMethod::Post,
            url: "http://api.example.com:8080/items".to_string(),
            payload: Some(Payload::Form(vec![("a".to_string(), "1".to_string())])),
        };
        let trace = request_header_trace(&request, &[]);
        assert!(trace.starts_with("POST /items HTTP/1.1\r\nHost: api.example.com:8080\r\n"));
        assert!(trace.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
    }

    #[test]
    fn basic_auth_becomes_header() {
        let handle = UreqTransport.create_handle(&settings()).unwrap();
        assert_eq!(
            handle.headers,
            vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), "Basic dXNlcjpwYXNz".to_string()),
            ]
        );
    }

    #[test]
    fn attach_requires_configured_handle() {
        let transport = UreqTransport::new();
        let mut controller = transport.create_controller().unwrap();
        let mut handle = transport.create_handle(&settings()).unwrap();
        assert!(transport.attach(&mut controller, &mut handle).is_err());

        transport.configure(
            &mut handle,
            PreparedRequest {
                method: HttpMethod::Get,
                url: "http://127.0.0.1:1/".to_string(),
                payload: None,
            },
        );
        transport.attach(&mut controller, &mut handle).unwrap();
        assert_eq!(controller.active(), 1);
    }

    #[test]
    fn unfinished_handle_reports_failure() {
        let handle = UreqTransport.create_handle(&settings()).unwrap();
        assert!(UreqTransport.failure(&handle).is_some());
        assert!(UreqTransport.metadata(&handle).is_empty());
    }

    #[test]
    fn trace_redacts_authorization() {
        let request = PreparedRequest {
            method: HttpMethod::Get,
            url: "http://api.example.com/protected".to_string(),
            payload: None,
        };
        let handle = UreqTransport.create_handle(&settings()).unwrap();
        let trace = request_header_trace(&request, &handle.headers);
        assert!(trace.contains("Authorization: Basic <redacted>\r\n"));
        assert!(!trace.contains("dXNlcjpwYXNz"));
        assert!(trace.contains("Accept: application/json\r\n"));
        assert!(!trace.contains("User-Agent"));

        let trace = request_header_trace(&request, &[("authorization".to_string(), "token".to_string())]);
        assert!(trace.contains("authorization: <redacted>\r\n"));
    }

    #[test]
    fn oversized_timeout_means_no_timeout() {
        assert_eq!(agent_timeout(0), None);
        assert_eq!(agent_timeout(30), Some(Duration::from_secs(30)));
        assert_eq!(agent_timeout(MAX_TIMEOUT_SECS), Some(Duration::from_secs(MAX_TIMEOUT_SECS)));
        assert_eq!(agent_timeout(MAX_TIMEOUT_SECS + 1), None);
        assert_eq!(agent_timeout(u64::MAX), None);
        assert!(UreqTransport
            .create_handle(&HandleSettings {
                timeout_secs: u64::MAX,
                ..settings()
            })
            .is_ok());
    }

    fn queue(controller: &mut UreqController, work: impl FnOnce() -> Transfer + Send + 'static) -> TransferSlot {
        let slot: TransferSlot = Arc::new(Mutex::new(None));
        controller.queued.push(Job {
            work: Box::new(work),
            slot: Arc::clone(&slot),
        });
        slot
    }

    fn done(tag: String) -> Transfer {
        Transfer::Done {
            body: tag.into_bytes(),
            metadata: RawMetadata::new(),
        }
    }

    /// Steps until nothing is active or a step fails; returns the last step.
    fn drive(transport: &UreqTransport, controller: &mut UreqController, poll: Duration) -> Step {
        for _ in 0..500 {
            let step = transport.perform(controller);
            if step.status != StepStatus::Ok || step.active == 0 {
                return step;
            }
            transport.wait(controller, poll);
        }
        panic!("controller never settled");
    }

    #[test]
    fn completions_consumed_by_wait_settle_to_zero() {
        let transport = UreqTransport::new();
        let mut controller = transport.create_controller().unwrap();
        let slots: Vec<_> = (0..3u64)
            .map(|i| {
                queue(&mut controller, move || {
                    thread::sleep(Duration::from_millis(30 * i));
                    done(format!("job {i}"))
                })
            })
            .collect();
        assert_eq!(controller.active(), 3);

        let step = drive(&transport, &mut controller, Duration::from_millis(250));
        assert_eq!(step.status, StepStatus::Ok);
        assert_eq!(step.active, 0);
        assert_eq!(controller.completed, 3);
        assert_eq!(controller.workers.len(), 3);
        for (i, slot) in slots.iter().enumerate() {
            match slot.lock().unwrap().as_ref() {
                Some(Transfer::Done { body, .. }) => assert_eq!(body, format!("job {i}").as_bytes()),
                _ => panic!("job {i} did not complete"),
            }
        }
        transport.close_controller(controller);
    }

    #[test]
    fn failed_transfer_is_reported_on_its_handle() {
        let transport = UreqTransport::new();
        let mut controller = transport.create_controller().unwrap();
        let handle = transport.create_handle(&settings()).unwrap();
        controller.queued.push(Job {
            work: Box::new(|| Transfer::Failed("connection refused".to_string())),
            slot: Arc::clone(&handle.slot),
        });

        let step = drive(&transport, &mut controller, Duration::from_millis(50));
        assert_eq!(step.status, StepStatus::Ok);
        assert_eq!(step.active, 0);
        assert_eq!(transport.failure(&handle).as_deref(), Some("connection refused"));
        assert!(transport.metadata(&handle).is_empty());
        transport.close_controller(controller);
    }

    #[test]
    fn panicked_worker_fails_step_and_close_joins_siblings() {
        let transport = UreqTransport::new();
        let mut controller = transport.create_controller().unwrap();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let slow = queue(&mut controller, move || {
            thread::sleep(Duration::from_millis(400));
            flag.store(true, Ordering::SeqCst);
            done("slow".to_string())
        });
        queue(&mut controller, || panic!("transfer blew up"));

        let step = drive(&transport, &mut controller, Duration::from_millis(10));
        assert_eq!(step.status, StepStatus::Failed("transfer worker panicked".to_string()));
        assert!(step.active > 0);
        assert!(!finished.load(Ordering::SeqCst));

        transport.close_controller(controller);
        assert!(finished.load(Ordering::SeqCst));
        assert!(slow.lock().unwrap().is_some());
    }
}
