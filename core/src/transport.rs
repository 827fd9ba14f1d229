//! The transport seam.
//!
//! # Design
//! The batch engine never speaks HTTP itself. It drives a `Transport`
//! modelled on a multiplexing handle API: a controller plus one handle per
//! request, advanced by repeated non-blocking `perform` steps. The
//! production implementation is `UreqTransport`; tests inject scripted fakes.
//!
//! `close_handle` and `close_controller` take their resource by value, so
//! the type system rules out closing anything twice.

use std::time::Duration;

use crate::error::TransportError;
use crate::http::{HandleSettings, PreparedRequest};

/// Raw per-transfer metadata. Must hold at least the keys below.
pub type RawMetadata = serde_json::Map<String, serde_json::Value>;

pub const HTTP_CODE: &str = "http_code";
pub const CONTENT_TYPE: &str = "content_type";
pub const URL: &str = "url";
pub const REQUEST_HEADER: &str = "request_header";

/// Outcome of one `perform` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Progress is possible right away; call `perform` again.
    Retry,
    Ok,
    /// The controller itself failed. Individual HTTP error codes are not this.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub status: StepStatus,
    /// Handles that have not finished yet.
    pub active: usize,
}

pub trait Transport {
    type Handle;
    type Controller;

    fn create_controller(&self) -> Result<Self::Controller, TransportError>;

    fn create_handle(&self, settings: &HandleSettings) -> Result<Self::Handle, TransportError>;

    /// Load the URL, verb and payload the handle will send.
    fn configure(&self, handle: &mut Self::Handle, request: PreparedRequest);

    fn attach(&self, controller: &mut Self::Controller, handle: &mut Self::Handle) -> Result<(), TransportError>;

    fn detach(&self, controller: &mut Self::Controller, handle: &mut Self::Handle);

    /// One non-blocking progress step over every attached handle.
    fn perform(&self, controller: &mut Self::Controller) -> Step;

    /// Block until some handle makes progress or `timeout` elapses.
    fn wait(&self, controller: &mut Self::Controller, timeout: Duration);

    fn take_body(&self, handle: &mut Self::Handle) -> Vec<u8>;

    fn metadata(&self, handle: &Self::Handle) -> RawMetadata;

    /// Set when the transfer never produced an HTTP response.
    fn failure(&self, handle: &Self::Handle) -> Option<String>;

    fn close_handle(&self, handle: Self::Handle);

    fn close_controller(&self, controller: Self::Controller);
}
