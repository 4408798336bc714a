use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientSource;
use crate::error::{ConfigError, TransportError};

/// Media type of `_bulk` request bodies.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Who is responsible for the HTTP client's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOwnership {
    /// Built by the transport; auth and custom headers live in the client
    /// defaults and the client is released on close.
    Owned,
    /// Supplied from outside and possibly used concurrently by others;
    /// headers go on each request and the client is never released here.
    Shared,
}

/// Status and body of a completed bulk request.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// POSTs NDJSON bodies to a `_bulk` endpoint.
pub struct BulkTransport {
    client: Mutex<Option<Client>>,
    ownership: ClientOwnership,
    endpoint: Url,
    /// Per-request headers; empty in owned mode.
    request_headers: HeaderMap,
    timeout: Duration,
}

impl BulkTransport {
    pub(crate) fn new(
        endpoint: Url,
        headers: HeaderMap,
        timeout: Duration,
        source: ClientSource,
    ) -> Result<Self, ConfigError> {
        let (client, ownership, request_headers) = match source {
            ClientSource::Owned => {
                let client = Client::builder()
                    .default_headers(headers)
                    .connect_timeout(timeout)
                    .timeout(timeout)
                    .build()
                    .map_err(ConfigError::ClientBuild)?;
                (client, ClientOwnership::Owned, HeaderMap::new())
            }
            ClientSource::Shared(client) => (client, ClientOwnership::Shared, headers),
        };

        Ok(BulkTransport {
            client: Mutex::new(Some(client)),
            ownership,
            endpoint,
            request_headers,
            timeout,
        })
    }

    pub fn ownership(&self) -> ClientOwnership {
        self.ownership
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send `body` and read the full response.
    ///
    /// Fails with [`TransportError::Timeout`] once the configured timeout
    /// elapses and with [`TransportError::Cancelled`] as soon as `cancel`
    /// fires. Failures are logged before being returned.
    pub async fn send(
        &self,
        body: String,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        let result = self.exchange(body, cancel).await;
        if let Err(e) = &result {
            warn!(endpoint = %self.endpoint, error = %e, "bulk request did not complete");
        }
        result
    }

    async fn exchange(
        &self,
        body: String,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        let client = self.client()?;

        let mut request = client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE))
            .body(body);
        if self.ownership == ClientOwnership::Shared {
            request = request.headers(self.request_headers.clone()).timeout(self.timeout);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(RawResponse { status, body })
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, exchange) => outcome,
        };

        match outcome {
            Ok(Ok(response)) => {
                debug!(status = response.status, bytes = response.body.len(), "bulk response received");
                Ok(response)
            }
            Ok(Err(e)) if e.is_timeout() => Err(TransportError::Timeout),
            Ok(Err(e)) => Err(TransportError::Request(e)),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Clone the client handle without holding the lock across I/O.
    fn client(&self) -> Result<Client, TransportError> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TransportError::Closed)
    }

    /// Release the client if this transport owns it. Returns `true` when
    /// a client was released by this call.
    pub fn close(&self) -> bool {
        match self.ownership {
            ClientOwnership::Owned => self
                .client
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .is_some(),
            ClientOwnership::Shared => false,
        }
    }
}
