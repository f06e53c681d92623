//! Fetching world snapshots from the simulation server.

use crate::config::{AuthToken, Config, ConfigError};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{header::AUTHORIZATION, Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use world_api::{parse_world, ParseError, WorldSnapshot};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("server answered {status} for {url}")]
    Status { url: Url, status: StatusCode },
    #[error("no complete response from {url} within {limit:?}")]
    Timeout { url: Url, limit: Duration },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl FetchError {
    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Parse(e) => e.kind(),
        }
    }
}

/// Anything that can produce one world snapshot per call.
///
/// The returned future owns everything it needs so the poller can move it
/// onto its own task.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'static, Result<WorldSnapshot, FetchError>>;
}

/// Single-shot HTTP fetcher for `GET /api/v1/world`. Never retries.
#[derive(Clone, Debug)]
pub struct HttpSnapshotFetcher {
    client: Client,
    url: Url,
    token: Option<AuthToken>,
    timeout: Option<Duration>,
}

impl HttpSnapshotFetcher {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
            token: None,
            timeout: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut fetcher = Self::new(config.world_url()?);
        fetcher.token = config.auth_token.clone();
        fetcher.timeout = config.fetch_timeout();
        Ok(fetcher)
    }

    pub fn with_token(mut self, token: AuthToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Bounds each request; `None` waits for as long as the server takes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn fetch_snapshot(&self) -> Result<WorldSnapshot, FetchError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.request())
                .await
                .map_err(|_| FetchError::Timeout {
                    url: self.url.clone(),
                    limit,
                })?,
            None => self.request().await,
        }
    }

    async fn request(&self) -> Result<WorldSnapshot, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: self.url.clone(),
            source,
        };

        let mut request = self.client.get(self.url.clone());
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token.expose());
        }

        tracing::debug!(url = %self.url, "Requesting world state");
        let response = request.send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        tracing::trace!(bytes = body.len(), "World state received");

        Ok(parse_world(&body)?)
    }
}

impl SnapshotSource for HttpSnapshotFetcher {
    fn fetch(&self) -> BoxFuture<'static, Result<WorldSnapshot, FetchError>> {
        let fetcher = self.clone();
        async move { fetcher.fetch_snapshot().await }.boxed()
    }
}
