//! Fluent REST clients.
//!
//! # Design
//! `RestClient` and `RestMultiClient` are thin shells around the same two
//! parts: a `RequestConfig` and a `Transport`. Every verb builds a
//! `BatchCoordinator` over borrowed copies of both, so the single-request
//! path runs through the same validation and teardown as a batch of one.
//! Verbs take `&mut self`: a client instance cannot run two calls at once.

use crate::batch::BatchCoordinator;
use crate::config::RequestConfig;
use crate::error::RestError;
use crate::http::{HttpMethod, Payload};
use crate::response::{ResponseAggregate, ResponseResult};
use crate::transport::Transport;
use crate::ureq_transport::UreqTransport;

/// Client issuing one request per call.
#[derive(Debug, Clone)]
pub struct RestClient<T: Transport = UreqTransport> {
    config: RequestConfig,
    transport: T,
}

impl RestClient<UreqTransport> {
    pub fn new(config: RequestConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> RestClient<T> {
    pub fn with_transport(config: RequestConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RequestConfig {
        &mut self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn get(&mut self, action: &str) -> Result<ResponseResult, RestError> {
        self.call(HttpMethod::Get, action, None)
    }

    pub fn post(&mut self, action: &str, payload: impl Into<Payload>) -> Result<ResponseResult, RestError> {
        self.call(HttpMethod::Post, action, Some(payload.into()))
    }

    pub fn put(&mut self, action: &str, payload: impl Into<Payload>) -> Result<ResponseResult, RestError> {
        self.call(HttpMethod::Put, action, Some(payload.into()))
    }

    pub fn delete(&mut self, action: &str) -> Result<ResponseResult, RestError> {
        self.call(HttpMethod::Delete, action, None)
    }

    pub fn head(&mut self, action: &str) -> Result<ResponseResult, RestError> {
        self.call(HttpMethod::Head, action, None)
    }

    fn call(&mut self, method: HttpMethod, action: &str, payload: Option<Payload>) -> Result<ResponseResult, RestError> {
        BatchCoordinator::new(&self.transport, &self.config).execute_one(method, action, payload)
    }
}

/// Client issuing a batch of same-verb requests concurrently per call.
#[derive(Debug, Clone)]
pub struct RestMultiClient<T: Transport = UreqTransport> {
    config: RequestConfig,
    transport: T,
}

impl RestMultiClient<UreqTransport> {
    pub fn new(config: RequestConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> RestMultiClient<T> {
    pub fn with_transport(config: RequestConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RequestConfig {
        &mut self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn max_handles(&self) -> usize {
        self.config.max_handles()
    }

    pub fn set_max_handles(&mut self, max_handles: usize) -> Result<&mut Self, RestError> {
        self.config.set_max_handles(max_handles)?;
        Ok(self)
    }

    pub fn get<S: AsRef<str>>(&mut self, actions: &[S]) -> Result<ResponseAggregate, RestError> {
        self.call(HttpMethod::Get, actions, &[])
    }

    pub fn post<S: AsRef<str>>(&mut self, actions: &[S], payloads: &[Payload]) -> Result<ResponseAggregate, RestError> {
        self.call(HttpMethod::Post, actions, payloads)
    }

    pub fn put<S: AsRef<str>>(&mut self, actions: &[S], payloads: &[Payload]) -> Result<ResponseAggregate, RestError> {
        self.call(HttpMethod::Put, actions, payloads)
    }

    pub fn delete<S: AsRef<str>>(&mut self, actions: &[S]) -> Result<ResponseAggregate, RestError> {
        self.call(HttpMethod::Delete, actions, &[])
    }

    pub fn head<S: AsRef<str>>(&mut self, actions: &[S]) -> Result<ResponseAggregate, RestError> {
        self.call(HttpMethod::Head, actions, &[])
    }

    fn call<S: AsRef<str>>(
        &mut self,
        method: HttpMethod,
        actions: &[S],
        payloads: &[Payload],
    ) -> Result<ResponseAggregate, RestError> {
        let max_handles = self.config.max_handles();
        BatchCoordinator::new(&self.transport, &self.config).execute(method, actions, payloads, max_handles)
    }
}
