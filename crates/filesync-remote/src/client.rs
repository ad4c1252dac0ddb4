//! Remote block service client
//!
//! Provides [`HttpRemoteStore`], the `reqwest`-based implementation of the
//! `IRemoteStore` port. Every method sends exactly one request and maps the
//! outcome to a [`RemoteError`] the scheduler can classify.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use filesync_core::domain::SpaceId;
//! use filesync_core::ports::IRemoteStore;
//! use filesync_remote::HttpRemoteStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let remote = HttpRemoteStore::with_base_url("https://files.example.com/v1")?
//!     .with_api_token("token");
//! let space = SpaceId::new("space1")?;
//! let existing = remote.exists_remotely(&space, &[]).await?;
//! assert!(existing.is_empty());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use anyhow::Context;
use base64::Engine;
use filesync_core::config::RemoteConfig;
use filesync_core::domain::{Block, Cid, FileId, SpaceId};
use filesync_core::ports::{IRemoteStore, RemoteError};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rate_limit::retry_after_from_headers;

/// Longest response body excerpt carried in an error message
const ERROR_BODY_LIMIT: usize = 256;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    cids: &'a [Cid],
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    existing: Vec<Cid>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    blocks: Vec<WireBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct WireBlock<'a> {
    cid: &'a Cid,
    links: &'a [Cid],
    /// Standard base64
    data: String,
}

impl<'a> From<&'a Block> for WireBlock<'a> {
    fn from(block: &'a Block) -> Self {
        Self {
            cid: block.cid(),
            links: block.links(),
            data: base64::engine::general_purpose::STANDARD.encode(block.data()),
        }
    }
}

// ============================================================================
// Error classification
// ============================================================================

/// Maps a transport-level failure (no HTTP status) to a [`RemoteError`]
fn classify_transport(err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(err.to_string())
    }
}

/// Maps a failure while reading a success body to a [`RemoteError`]
///
/// Only a body that arrived and failed to parse is a protocol violation; a
/// body cut short by a timeout or reset is a transport failure.
fn classify_body(err: &reqwest::Error) -> RemoteError {
    if err.is_decode() && !err.is_timeout() {
        RemoteError::InvalidResponse(err.to_string())
    } else {
        classify_transport(err)
    }
}

/// Maps a non-success HTTP response to a [`RemoteError`]
async fn classify_response(response: Response) -> RemoteError {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return RemoteError::Throttled {
            retry_after: retry_after_from_headers(response.headers()),
        };
    }

    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        let mut end = body.len().min(ERROR_BODY_LIMIT);
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}: {}", status, &body[..end])
    };

    match status {
        StatusCode::REQUEST_TIMEOUT => RemoteError::Timeout,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(detail),
        StatusCode::NOT_FOUND | StatusCode::GONE => RemoteError::NotFound(detail),
        s if s.is_server_error() => RemoteError::Unavailable(detail),
        s if s.is_client_error() => RemoteError::Rejected(detail),
        _ => RemoteError::InvalidResponse(detail),
    }
}

// ============================================================================
// HttpRemoteStore
// ============================================================================

/// HTTP client for the remote block service
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpRemoteStore {
    /// Creates a client from the `remote` configuration section
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let mut store = Self::with_client(client, &config.base_url)?;
        store.api_token = config.api_token.clone();
        Ok(store)
    }

    /// Creates an unauthenticated client for `base_url` with default settings
    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    fn with_client(client: Client, base_url: &str) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL '{}'", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Base URL '{}' cannot carry a path", base_url);
        }
        Ok(Self {
            client,
            base_url,
            api_token: None,
        })
    }

    /// Sets the bearer token sent with every request
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Returns the base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL `{base}/{segments...}`, percent-encoding each segment
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Creates a request builder with the Authorization header, if configured
    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.url(segments));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends `builder` and returns the response if its status is a success
    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder.send().await.map_err(|e| classify_transport(&e))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(classify_response(response).await)
        }
    }
}

#[async_trait::async_trait]
impl IRemoteStore for HttpRemoteStore {
    async fn exists_remotely(
        &self,
        space: &SpaceId,
        cids: &[Cid],
    ) -> Result<HashSet<Cid>, RemoteError> {
        if cids.is_empty() {
            return Ok(HashSet::new());
        }

        let builder = self
            .request(Method::POST, &["spaces", space.as_str(), "blocks", "check"])
            .json(&CheckRequest { cids });
        let response = self.send(builder).await?;

        let body: CheckResponse = response.json().await.map_err(|e| classify_body(&e))?;

        let requested: HashSet<&Cid> = cids.iter().collect();
        if let Some(stray) = body.existing.iter().find(|c| !requested.contains(c)) {
            warn!(space = %space, cid = %stray, "Remote reported an address that was not asked for");
            return Err(RemoteError::InvalidResponse(format!(
                "unrequested address {} in existence check",
                stray
            )));
        }

        debug!(
            space = %space,
            requested = cids.len(),
            existing = body.existing.len(),
            "Checked remote block existence"
        );
        Ok(body.existing.into_iter().collect())
    }

    async fn push_blocks(
        &self,
        space: &SpaceId,
        file: &FileId,
        blocks: Vec<Block>,
    ) -> Result<(), RemoteError> {
        if blocks.is_empty() {
            return Ok(());
        }

        let payload = PushRequest {
            blocks: blocks.iter().map(WireBlock::from).collect(),
        };
        let builder = self
            .request(
                Method::POST,
                &["spaces", space.as_str(), "files", file.as_str(), "blocks"],
            )
            .json(&payload);
        self.send(builder).await?;

        debug!(space = %space, file = %file, count = blocks.len(), "Pushed blocks");
        Ok(())
    }

    async fn delete_file(&self, space: &SpaceId, file: &FileId) -> Result<(), RemoteError> {
        let builder = self.request(
            Method::DELETE,
            &["spaces", space.as_str(), "files", file.as_str()],
        );

        match self.send(builder).await {
            Ok(_) => {
                debug!(space = %space, file = %file, "Deleted remote file");
                Ok(())
            }
            Err(RemoteError::NotFound(_)) => {
                debug!(space = %space, file = %file, "Remote file already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
