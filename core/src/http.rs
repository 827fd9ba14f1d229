//! HTTP request types handed to a `Transport`.
//!
//! # Design
//! These types describe a request as plain data. The core resolves the URL,
//! verb and payload for every batch item and hands the result to the
//! transport; the transport owns everything on the wire. All fields use owned
//! types so a transport can move them onto a worker thread.

use std::fmt;

use serde::{Deserialize, Serialize};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    /// POST and PUT must carry a payload; every other verb ignores one.
    pub fn requires_payload(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for POST/PUT.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Sent as-is with no content type of its own.
    Text(String),
    Bytes(Vec<u8>),
    /// Sent `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// Serialized and sent as `application/json`.
    Json(serde_json::Value),
}

impl Payload {
    /// Mirrors the "non-empty data" rule of the verbs that need a body.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(text) => text.is_empty(),
            Payload::Bytes(bytes) => bytes.is_empty(),
            Payload::Form(fields) => fields.is_empty(),
            Payload::Json(value) => match value {
                serde_json::Value::Null => true,
                serde_json::Value::Object(map) => map.is_empty(),
                serde_json::Value::Array(items) => items.is_empty(),
                serde_json::Value::String(s) => s.is_empty(),
                _ => false,
            },
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// One resolved request, ready to be loaded into a transport handle.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub payload: Option<Payload>,
}

/// Settings every handle of a call inherits from `RequestConfig`.
#[derive(Clone, PartialEq, Eq)]
pub struct HandleSettings {
    pub timeout_secs: u64,
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<(String, String)>,
    /// False only when SSL is in use together with SSL test mode.
    pub verify_tls: bool,
    pub follow_redirects: bool,
    /// 0 means unlimited when `follow_redirects` is set.
    pub max_redirects: u32,
}

impl fmt::Debug for HandleSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleSettings")
            .field("timeout_secs", &self.timeout_secs)
            .field("headers", &self.headers)
            .field("basic_auth", &self.basic_auth.as_ref().map(|(user, _)| (user, "<redacted>")))
            .field("verify_tls", &self.verify_tls)
            .field("follow_redirects", &self.follow_redirects)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}
