use std::time::Duration;

use super::{FetchFailure, ResourceFetcher};

/// User-Agent sent with every remote request.
pub const DEFAULT_USER_AGENT: &str = concat!("stickerkit/", env!("CARGO_PKG_VERSION"));

/// Default HTTP transport.
///
/// Fetches `http(s)://` URLs with a global per-request timeout and reads `file://` URLs (used for
/// local mirrors and tests) from disk.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
    user_agent: String,
    proxy: Option<String>,
    max_size: usize,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            proxy: None,
            max_size: 32 * 1024 * 1024,
        }
    }
}

impl HttpFetcher {
    /// Create a fetcher with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Route requests through a proxy URL.
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Set the maximum response size in bytes.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let mut builder = ureq::Agent::config_builder().timeout_global(Some(self.timeout));
        if let Some(p) = &self.proxy {
            let proxy = ureq::Proxy::new(p)
                .map_err(|e| FetchFailure::permanent(format!("invalid proxy '{p}': {e}")))?;
            builder = builder.proxy(Some(proxy));
        }
        let agent: ureq::Agent = builder.build().into();

        let mut response = agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(classify)?;

        let bytes = response
            .body_mut()
            .with_config()
            .limit(self.max_size as u64)
            .read_to_vec()
            .map_err(classify)?;
        if bytes.is_empty() {
            return Err(FetchFailure::transient("empty response body"));
        }
        Ok(bytes)
    }

    fn fetch_file(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchFailure::permanent(format!("{path}: {e}")),
            _ => FetchFailure::transient(format!("{path}: {e}")),
        })
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url)
        } else {
            self.fetch_file(url)
        }
    }
}

fn classify(err: ureq::Error) -> FetchFailure {
    match err {
        ureq::Error::StatusCode(code) if code == 429 || code >= 500 => {
            FetchFailure::transient(format!("http status {code}"))
        }
        ureq::Error::StatusCode(code) => FetchFailure::permanent(format!("http status {code}")),
        other => FetchFailure::transient(other.to_string()),
    }
}
