//! Network reachability probes for option constraints.

use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

/// Answers whether a URL can be reached from this machine.
pub trait NetworkProbe: Send + Sync {
    fn reachable(&self, url: &str) -> bool;
}

/// HTTP `HEAD` probe.
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Probe with a 5-second timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("rigup/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProbe for HttpProbe {
    fn reachable(&self, url: &str) -> bool {
        match self.client.head(url).send() {
            // Any HTTP answer means the host is reachable; 4xx on HEAD is common.
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Cache key for a URL: its host (and port), or the URL itself when it
/// does not parse.
pub fn host_key(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}
