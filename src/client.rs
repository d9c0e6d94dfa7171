// src/client.rs

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::core::models::{ScanJob, ScanResultPayload, SeverityCounts, ToolCatalog, Vulnerability};
use crate::core::poll::FetchError;

pub const DEFAULT_USER_AGENT: &str = concat!("palisade-rs-client/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors surfaced by [`ScanApiClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("backend returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Boxed future returned by [`ScanApiClient::status_fetcher`].
pub type StatusFuture =
    Pin<Box<dyn Future<Output = std::result::Result<ScanJob, FetchError>> + Send>>;

/// Thin typed client over the scanning backend's HTTP API.
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct ScanApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ScanApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Self::with_http_client(base_url, http)
    }

    /// Build a client around a preconfigured `reqwest::Client`, for callers
    /// that need their own TLS or proxy setup.
    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        // Url::join drops the last path segment unless the base ends in a
        // slash, which would silently rewrite every endpoint.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Current state of a scan job.
    pub async fn scan_status(&self, scan_id: &str) -> Result<ScanJob> {
        self.get_json(&format!("scans/{scan_id}/status")).await
    }

    /// The raw result tree for one scan target.
    pub async fn scan_result(&self, result_id: &str) -> Result<ScanResultPayload> {
        self.get_json(&format!("results/{result_id}")).await
    }

    /// Vulnerabilities recorded against a project.
    pub async fn project_vulnerabilities(&self, project_id: &str) -> Result<Vec<Vulnerability>> {
        self.get_json(&format!("projects/{project_id}/vulnerabilities"))
            .await
    }

    /// Per-severity tallies as computed by the backend.
    pub async fn vulnerability_stats(&self, project_id: &str) -> Result<SeverityCounts> {
        self.get_json(&format!("projects/{project_id}/vulnerabilities/stats"))
            .await
    }

    /// The tool catalog, in the backend's category order.
    pub async fn available_tools(&self) -> Result<ToolCatalog> {
        self.get_json("tools").await
    }

    /// Ask the backend to stop a running scan. The job moves to its final
    /// state asynchronously; keep polling to observe it.
    pub async fn stop_scan(&self, scan_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("scans/{scan_id}/stop"))?;
        debug!(url = %url, "POST request.");
        self.execute_no_content(self.http.post(url)).await
    }

    /// Flip the read marker on one result entry.
    pub async fn set_entry_read(
        &self,
        result_id: &str,
        entry_id: &str,
        is_read: bool,
    ) -> Result<()> {
        let url = self.endpoint(&format!("results/{result_id}/entries/{entry_id}/read"))?;
        debug!(url = %url, is_read, "PUT request.");
        let request = self
            .http
            .put(url)
            .json(&serde_json::json!({ "is_read": is_read }));
        self.execute_no_content(request).await
    }

    /// Build a fetch closure for [`crate::core::poll::PollingController::start`],
    /// bound to one scan. Takes the client by value; clone first if the
    /// client is still needed elsewhere.
    pub fn status_fetcher(self, scan_id: String) -> impl FnMut() -> StatusFuture + Send + 'static {
        move || {
            let client = self.clone();
            let scan_id = scan_id.clone();
            Box::pin(async move { client.scan_status(&scan_id).await.map_err(FetchError::new) })
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    async fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(url = %url, "GET request.");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status,
                message: error_message(&body),
            });
        }
        serde_json::from_str(&body).map_err(ClientError::from)
    }

    async fn execute_no_content(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status,
            message: error_message(&body),
        })
    }
}

/// Pull a readable message out of an error response body. The backend wraps
/// errors as JSON objects with an `error` or `message` field; anything else
/// is passed through truncated.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "detail"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    let mut message: String = trimmed.chars().take(160).collect();
    if trimmed.chars().count() > 160 {
        message.push_str("...");
    }
    message
}

/// Trailing-edge debouncer for bursty triggers such as search input.
///
/// Each call schedules its action after the configured delay and supersedes
/// whatever was pending, so only the last call in a burst runs.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    epoch: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn call<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let epoch = Arc::clone(&self.epoch);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if epoch.load(Ordering::Acquire) == ticket {
                action().await;
            }
        });
    }

    /// Drop the pending action, if any, without scheduling a new one.
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}
