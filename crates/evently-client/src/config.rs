//! Client configuration.

use std::time::Duration;

/// Configuration for [`EventsClient`](crate::EventsClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API (e.g. <http://localhost:3000>)
    pub base_url: String,

    /// Request timeout applied to every call
    pub timeout: Duration,

    /// User agent string (set to None to disable the User-Agent header)
    pub user_agent: Option<String>,

    /// Quiet period before a filter keystroke becomes the settled filter
    pub debounce: Duration,

    /// Rows per page the list view starts with
    pub page_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: Some(format!("evently-client/{}", env!("CARGO_PKG_VERSION"))),
            debounce: Duration::from_millis(1000),
            page_size: 6,
        }
    }
}
