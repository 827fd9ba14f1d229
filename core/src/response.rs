//! Per-request results and the ordered batch aggregate.

use crate::error::MetadataError;
use crate::transport::{RawMetadata, CONTENT_TYPE, HTTP_CODE, REQUEST_HEADER, URL};

/// Outcome of one completed transfer.
///
/// Only built from metadata that carries every required field, so the
/// accessors never fail.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseResult {
    body: Vec<u8>,
    http_code: u16,
    content_type: String,
    request_url: String,
    request_header: String,
    metadata: RawMetadata,
}

impl ResponseResult {
    pub fn from_transfer(body: Vec<u8>, metadata: RawMetadata) -> Result<Self, MetadataError> {
        if metadata.is_empty() {
            return Err(MetadataError::Empty);
        }
        let http_code = metadata
            .get(HTTP_CODE)
            .and_then(|v| v.as_u64())
            .and_then(|code| u16::try_from(code).ok())
            .ok_or(MetadataError::InvalidField {
                key: HTTP_CODE,
                expected: "integer",
            })?;
        let content_type = string_field(&metadata, CONTENT_TYPE)?;
        let request_url = string_field(&metadata, URL)?;
        let request_header = string_field(&metadata, REQUEST_HEADER)?;

        Ok(Self {
            body,
            http_code,
            content_type,
            request_url,
            request_header,
            metadata,
        })
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn http_code(&self) -> u16 {
        self.http_code
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// URL of the last request made, after any redirects.
    pub fn request_url(&self) -> &str {
        &self.request_url
    }

    /// Request header block as it was sent.
    pub fn request_header(&self) -> &str {
        &self.request_header
    }

    pub fn metadata(&self) -> &RawMetadata {
        &self.metadata
    }
}

fn string_field(metadata: &RawMetadata, key: &'static str) -> Result<String, MetadataError> {
    metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(MetadataError::InvalidField {
            key,
            expected: "string",
        })
}

/// Results of one batch, in the order the requests were submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseAggregate {
    responses: Vec<ResponseResult>,
}

impl ResponseAggregate {
    pub(crate) fn new(responses: Vec<ResponseResult>) -> Self {
        Self { responses }
    }

    pub fn get(&self, index: usize) -> Option<&ResponseResult> {
        self.responses.get(index)
    }

    pub fn all(&self) -> &[ResponseResult] {
        &self.responses
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResponseResult> {
        self.responses.iter()
    }

    pub fn bodies(&self) -> Vec<&[u8]> {
        self.responses.iter().map(ResponseResult::body).collect()
    }

    pub fn http_codes(&self) -> Vec<u16> {
        self.responses.iter().map(ResponseResult::http_code).collect()
    }

    pub fn request_urls(&self) -> Vec<&str> {
        self.responses.iter().map(ResponseResult::request_url).collect()
    }

    pub fn request_headers(&self) -> Vec<&str> {
        self.responses.iter().map(ResponseResult::request_header).collect()
    }

    pub fn metadata_all(&self) -> Vec<&RawMetadata> {
        self.responses.iter().map(ResponseResult::metadata).collect()
    }

    pub fn into_vec(self) -> Vec<ResponseResult> {
        self.responses
    }
}

impl IntoIterator for ResponseAggregate {
    type Item = ResponseResult;
    type IntoIter = std::vec::IntoIter<ResponseResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.responses.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResponseAggregate {
    type Item = &'a ResponseResult;
    type IntoIter = std::slice::Iter<'a, ResponseResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.responses.iter()
    }
}
