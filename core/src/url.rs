//! Request URL construction.

use crate::config::RequestConfig;

/// `scheme://host` + base path + action.
///
/// The action is inserted verbatim; percent-encoding is up to the caller.
pub fn build_url(config: &RequestConfig, action: &str) -> String {
    format!(
        "{}://{}{}{}",
        config.scheme().as_str(),
        config.host(),
        config.base_path(),
        action
    )
}
