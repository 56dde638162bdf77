//! HTTP adapter for an external session bridge.
//!
//! The bridge owns the authenticated messaging sessions; this adapter only
//! speaks its small REST surface:
//!
//! - `POST   {endpoint}/sessions/{id}` starts (or reattaches to) a session
//! - `GET    {endpoint}/sessions/{id}/status` → `{"ready": bool}`
//! - `GET    {endpoint}/sessions/{id}/registered/{number}` → `{"registered": bool}`
//! - `GET    {endpoint}/sessions/{id}/profile/{number}` → arbitrary JSON
//! - `DELETE {endpoint}/sessions/{id}` releases the session

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Transport, TransportError, TransportFactory, TransportFuture, TransportResult};
use crate::config::TransportConfig;
use crate::{AppError, Result};

#[derive(Debug, Deserialize)]
struct ReadyBody {
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct RegisteredBody {
    registered: bool,
}

/// Transport backed by the session bridge REST API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    session_id: String,
    ready_poll: Duration,
}

impl HttpTransport {
    /// Build an adapter for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &TransportConfig, session_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| AppError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            session_id: session_id.to_owned(),
            ready_poll: config.ready_poll(),
        })
    }

    fn session_url(&self) -> String {
        format!("{}/sessions/{}", self.endpoint, self.session_id)
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/{tail}", self.session_url())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> TransportResult<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_request_error)?;
        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| TransportError::Network(format!("invalid response body: {err}")))
    }

    async fn wait_ready(&self) -> TransportResult<()> {
        let response = self
            .client
            .post(self.session_url())
            .send()
            .await
            .map_err(map_request_error)?;
        ensure_success(response).await?;

        loop {
            match self.get_json::<ReadyBody>(self.url("status")).await {
                Ok(ReadyBody { ready: true }) => return Ok(()),
                Ok(ReadyBody { ready: false }) => {
                    debug!(session_id = %self.session_id, "session not ready yet");
                }
                Err(err @ TransportError::Auth(_)) => return Err(err),
                Err(err) => {
                    debug!(session_id = %self.session_id, %err, "readiness probe failed");
                }
            }
            tokio::time::sleep(self.ready_poll).await;
        }
    }
}

impl Transport for HttpTransport {
    fn await_ready(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.wait_ready())
    }

    fn check_registration<'a>(&'a self, normalized_id: &'a str) -> TransportFuture<'a, bool> {
        Box::pin(async move {
            let body: RegisteredBody = self
                .get_json(self.url(&format!("registered/{normalized_id}")))
                .await?;
            Ok(body.registered)
        })
    }

    fn profile_metadata<'a>(
        &'a self,
        normalized_id: &'a str,
    ) -> TransportFuture<'a, Option<serde_json::Value>> {
        Box::pin(async move {
            let value: serde_json::Value = self
                .get_json(self.url(&format!("profile/{normalized_id}")))
                .await?;
            Ok(Some(value))
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(err) = self.client.delete(self.session_url()).send().await {
                warn!(session_id = %self.session_id, %err, "failed to release bridge session");
            }
        })
    }
}

/// Builds one [`HttpTransport`] per session.
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    config: TransportConfig,
}

impl HttpTransportFactory {
    /// Create a factory sharing `config` across sessions.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(&self, session_id: &str) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(HttpTransport::new(&self.config, session_id)?))
    }
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Map non-success statuses onto the transport error taxonomy.
async fn ensure_success(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        body.trim().to_owned()
    };

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited {
            retry_after,
            detail,
        },
        s if s.is_server_error() => TransportError::Network(format!("{status}: {detail}")),
        _ => TransportError::Rejected(detail),
    })
}
