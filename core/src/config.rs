//! Client configuration.
//!
//! # Design
//! `RequestConfig` is owned by a client and changed only through its
//! setters. Setters validate their input and return `&mut Self`, so calls
//! chain with `?`. While a request runs the client lends the config out
//! immutably, so nothing can change under an in-flight batch.
//!
//! `ClientSettings` is the same configuration as a plain serde document, for
//! loading from JSON. Converting it runs every value through the setters.

use serde::Deserialize;

use crate::error::RestError;
use crate::http::HandleSettings;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_HANDLES: usize = 10;

/// URL scheme used when building request URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Username/password pair for HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    scheme: Scheme,
    host: String,
    base_path: String,
    ssl_test_mode: bool,
    auth: Option<BasicAuth>,
    headers: Vec<(String, String)>,
    timeout_secs: u64,
    follow_redirects: bool,
    max_redirects: u32,
    max_handles: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Http,
            host: String::new(),
            base_path: "/".to_string(),
            ssl_test_mode: false,
            auth: None,
            headers: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            follow_redirects: false,
            max_redirects: 0,
            max_handles: DEFAULT_MAX_HANDLES,
        }
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the remote host.
    ///
    /// A leading `http://` or `https://` (any case) is removed; `https://`
    /// also switches the scheme to https. A trailing `/` is removed. Hosts
    /// ending in `:443` or `:8443` switch the scheme to https as well. This
    /// is a convenience heuristic, not SSL detection.
    pub fn set_host(&mut self, host: &str) -> Result<&mut Self, RestError> {
        if host.is_empty() {
            return Err(RestError::InvalidArgument("host name not provided".to_string()));
        }

        let mut host = host;
        if let Some(rest) = strip_prefix_ignore_case(host, "https://") {
            self.scheme = Scheme::Https;
            host = rest;
        } else if let Some(rest) = strip_prefix_ignore_case(host, "http://") {
            host = rest;
        }
        let host = host.trim_end_matches('/');

        if host.ends_with(":443") || host.ends_with(":8443") {
            self.scheme = Scheme::Https;
        }

        self.host = host.to_string();
        Ok(self)
    }

    /// Set the path prefix shared by every action. Always stored with a
    /// single leading and trailing `/`.
    pub fn set_base_path(&mut self, base_path: &str) -> Result<&mut Self, RestError> {
        if base_path.is_empty() {
            return Err(RestError::InvalidArgument("base path not provided".to_string()));
        }
        let trimmed = base_path.trim_start_matches('/').trim_end_matches('/');
        self.base_path = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}/")
        };
        Ok(self)
    }

    pub fn set_use_ssl(&mut self, use_ssl: bool) -> &mut Self {
        self.scheme = if use_ssl { Scheme::Https } else { Scheme::Http };
        self
    }

    /// Skip certificate verification when SSL is in use. Meant for test
    /// hosts with self-signed certificates.
    pub fn set_ssl_test_mode(&mut self, enabled: bool) -> &mut Self {
        self.ssl_test_mode = enabled;
        self
    }

    pub fn set_basic_auth(&mut self, username: &str, password: &str) -> Result<&mut Self, RestError> {
        if username.is_empty() {
            return Err(RestError::InvalidArgument(
                "user name not provided when trying to set basic authentication credentials".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(RestError::InvalidArgument(
                "password not provided when trying to set basic authentication credentials".to_string(),
            ));
        }
        self.auth = Some(BasicAuth {
            username: username.to_string(),
            password: password.to_string(),
        });
        Ok(self)
    }

    /// Replace the request headers. Order and key case are kept as given.
    pub fn set_headers<K, V>(&mut self, headers: impl IntoIterator<Item = (K, V)>) -> Result<&mut Self, RestError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let headers: Vec<(String, String)> = headers.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        if headers.is_empty() {
            return Err(RestError::InvalidArgument("empty header list passed".to_string()));
        }
        self.headers = headers;
        Ok(self)
    }

    pub fn set_timeout(&mut self, seconds: u64) -> &mut Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn set_follow_redirects(&mut self, follow: bool) -> &mut Self {
        self.follow_redirects = follow;
        self
    }

    /// Set the redirect limit (0 = unlimited). Always enables following.
    pub fn set_max_redirects(&mut self, redirects: u32) -> &mut Self {
        self.max_redirects = redirects;
        self.follow_redirects = true;
        self
    }

    /// Cap on the number of requests in one batch.
    pub fn set_max_handles(&mut self, max_handles: usize) -> Result<&mut Self, RestError> {
        if max_handles == 0 {
            return Err(RestError::InvalidArgument("max_handles must be greater than zero".to_string()));
        }
        self.max_handles = max_handles;
        Ok(self)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn use_ssl(&self) -> bool {
        self.scheme == Scheme::Https
    }

    pub fn ssl_test_mode(&self) -> bool {
        self.ssl_test_mode
    }

    pub fn basic_auth(&self) -> Option<&BasicAuth> {
        self.auth.as_ref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    pub fn max_handles(&self) -> usize {
        self.max_handles
    }

    /// Settings copied onto every transport handle.
    pub fn handle_settings(&self) -> HandleSettings {
        HandleSettings {
            timeout_secs: self.timeout_secs,
            headers: self.headers.clone(),
            basic_auth: self.auth.as_ref().map(|a| (a.username.clone(), a.password.clone())),
            verify_tls: !(self.use_ssl() && self.ssl_test_mode),
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

/// Serde form of `RequestConfig`. Omitted fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    pub host: String,
    pub base_path: Option<String>,
    pub use_ssl: Option<bool>,
    pub ssl_test_mode: bool,
    pub basic_auth: Option<BasicAuthSettings>,
    pub headers: Vec<(String, String)>,
    pub timeout_secs: Option<u64>,
    pub follow_redirects: bool,
    pub max_redirects: Option<u32>,
    pub max_handles: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuthSettings {
    pub username: String,
    pub password: String,
}

impl ClientSettings {
    pub fn from_json(raw: &str) -> Result<Self, RestError> {
        serde_json::from_str(raw).map_err(|e| RestError::InvalidArgument(format!("invalid client settings: {e}")))
    }
}

impl TryFrom<ClientSettings> for RequestConfig {
    type Error = RestError;

    fn try_from(settings: ClientSettings) -> Result<Self, Self::Error> {
        let mut config = RequestConfig::new();
        // An explicit use_ssl goes first so host-derived https still wins.
        if let Some(use_ssl) = settings.use_ssl {
            config.set_use_ssl(use_ssl);
        }
        config.set_host(&settings.host)?;
        if let Some(base_path) = &settings.base_path {
            config.set_base_path(base_path)?;
        }
        config.set_ssl_test_mode(settings.ssl_test_mode);
        if let Some(auth) = &settings.basic_auth {
            config.set_basic_auth(&auth.username, &auth.password)?;
        }
        if !settings.headers.is_empty() {
            config.set_headers(settings.headers)?;
        }
        if let Some(timeout) = settings.timeout_secs {
            config.set_timeout(timeout);
        }
        config.set_follow_redirects(settings.follow_redirects);
        if let Some(max_redirects) = settings.max_redirects {
            config.set_max_redirects(max_redirects);
        }
        if let Some(max_handles) = settings.max_handles {
            config.set_max_handles(max_handles)?;
        }
        Ok(config)
    }
}
