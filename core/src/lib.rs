//! Fluent REST client with a parallel batch engine.
//!
//! # Overview
//! `RestClient` issues one request per call; `RestMultiClient` fans a batch
//! of same-verb requests out concurrently and returns the results in
//! submission order. Both build URLs from a shared `RequestConfig` and talk
//! to the network only through the `Transport` trait.
//!
//! # Design
//! - `RequestConfig` holds host, base path, SSL, auth, headers, timeout and
//!   redirect policy behind validating setters.
//! - `BatchCoordinator` owns the controller and handles of one call and
//!   releases them on every exit path.
//! - Any batch-level failure discards the whole batch; per-request HTTP
//!   error statuses are ordinary results.
//! - `UreqTransport` is the production transport; tests inject fakes.

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod response;
pub mod transport;
pub mod url;
pub mod ureq_transport;

pub use batch::BatchCoordinator;
pub use client::{RestClient, RestMultiClient};
pub use config::{ClientSettings, RequestConfig, Scheme};
pub use error::{MetadataError, RestError, TransportError};
pub use http::{HandleSettings, HttpMethod, Payload, PreparedRequest};
pub use response::{ResponseAggregate, ResponseResult};
pub use transport::{RawMetadata, Step, StepStatus, Transport};
pub use ureq_transport::UreqTransport;
