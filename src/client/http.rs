//! HTTP client for the local processing service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use url::Url;

use super::protocol::{
    classify_response, Outcome, ProcessRequest, REASON_CONNECTION_RESET, REASON_SERVICE_REJECTED,
    REASON_TIMEOUT, REASON_UNREACHABLE,
};
use super::ProcessingClient;
use crate::error::{DdasError, Result};
use crate::pending::PendingEntry;

/// Connection settings for the processing service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service root, e.g. `http://localhost:5001`
    pub base_url: String,
    /// Budget for `GET /health`
    pub health_timeout: Duration,
    /// Budget for `POST /process` (the service hashes and uploads the file)
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            health_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Talks to the processing service over `GET /health` and `POST /process`.
#[derive(Clone)]
pub struct HttpProcessingClient {
    http_client: reqwest::Client,
    base_url: Url,
    health_timeout: Duration,
    request_timeout: Duration,
}

impl HttpProcessingClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            DdasError::Internal(format!("Invalid service URL '{}': {}", config.base_url, e))
        })?;

        // Url::join replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| DdasError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            health_timeout: config.health_timeout,
            request_timeout: config.request_timeout,
        })
    }

    /// Resolved service root.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DdasError::Internal(format!("Invalid endpoint '{}': {}", path, e)))
    }
}

#[async_trait]
impl ProcessingClient for HttpProcessingClient {
    async fn probe(&self) -> bool {
        let url = match self.endpoint("health") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("{}", e);
                return false;
            }
        };

        match self
            .http_client
            .get(url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                tracing::warn!("Processing service health returned {}", response.status());
                false
            }
            Err(e) => {
                tracing::debug!("Processing service unreachable: {}", e);
                false
            }
        }
    }

    async fn dispatch(&self, entry: &PendingEntry) -> Outcome {
        if !self.probe().await {
            return Outcome::transient(REASON_UNREACHABLE, None);
        }

        let url = match self.endpoint("process") {
            Ok(url) => url,
            Err(e) => return Outcome::terminal(REASON_SERVICE_REJECTED, Some(e.to_string())),
        };

        let request = ProcessRequest {
            path: entry.filepath.clone(),
            auth_token: entry.credential.clone(),
        };

        tracing::info!("Dispatching {} ({})", entry.filename, entry.id);

        let response = match self
            .http_client
            .post(url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_transport_error(&e),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return classify_transport_error(&e),
        };

        let outcome = classify_response(status, &body);
        tracing::debug!("Dispatch of {} -> HTTP {} -> {:?}", entry.id, status, outcome);
        outcome
    }
}

/// Map a transport-level failure to an outcome.
fn classify_transport_error(err: &reqwest::Error) -> Outcome {
    let detail = Some(err.to_string());
    if err.is_timeout() {
        Outcome::transient(REASON_TIMEOUT, detail)
    } else if err.is_connect() {
        Outcome::transient(REASON_UNREACHABLE, detail)
    } else if err.is_request() || err.is_body() {
        // Connection dropped mid-exchange
        Outcome::transient(REASON_CONNECTION_RESET, detail)
    } else {
        Outcome::terminal(REASON_SERVICE_REJECTED, detail)
    }
}
