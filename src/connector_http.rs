//! HTTP(S) adapter: one URL, one stream.
//!
//! Enumeration issues a `HEAD` to learn size, type, and the change hash
//! without downloading; servers that reject `HEAD` are tolerated and the
//! metadata is filled in when the stream is opened. The body is streamed,
//! never buffered whole.
//!
//! The change hash is the `ETag`, else `Last-Modified`. Servers sending
//! neither give streams with no hash.
//!
//! # Credentials
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `bearer_token` | Sent as `Authorization: Bearer …` |
//! | `username` / `password` | HTTP basic auth |

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tokio_util::io::{StreamReader, SyncIoBridge};

use stream_harness_core::models::{HashStatus, RawStreamHandle};
use stream_harness_core::prompt::ConfigSection;

use crate::config::{HttpConfig, SourceConfig};
use crate::error::{HarnessError, Result};
use crate::stream::OpenStream;
use crate::traits::{SourceAdapter, UriClaim};

pub struct HttpAdapter {
    client: reqwest::Client,
    /// Whole-request limit for metadata requests.
    timeout: Duration,
}

impl HttpAdapter {
    /// Build the shared client. `timeout_secs` bounds connecting, every
    /// metadata request, and each read of a streamed body; a body that
    /// keeps flowing may take as long as it needs.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| HarnessError::config("[http]", e.to_string()))?;
        Ok(Self { client, timeout })
    }

    fn request(&self, method: reqwest::Method, config: &SourceConfig, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        if let Some(token) = config.get_str(ConfigSection::Credentials, "bearer_token") {
            return builder.bearer_auth(token);
        }
        match config.get_str(ConfigSection::Credentials, "username") {
            Some(user) => builder.basic_auth(
                user,
                config.get_str(ConfigSection::Credentials, "password"),
            ),
            None => builder,
        }
    }
}

fn url_of(config: &SourceConfig) -> Result<&str> {
    config
        .get_str(ConfigSection::Connection, "url")
        .ok_or_else(|| HarnessError::ConfigurationIncomplete {
            uri: config.display_uri().to_string(),
            parameter: "url".to_string(),
        })
}

/// Last non-empty path segment of `url`, or its host.
pub fn file_name_of(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return url.to_string();
    };
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .or_else(|| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| "index".to_string())
}

/// Map a non-success status to the error taxonomy.
pub(crate) fn check_status(uri: &str, status: StatusCode) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(HarnessError::auth(uri, format!("HTTP {}", status)))
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(HarnessError::not_found(uri)),
        s => Err(HarnessError::connection(uri, format!("HTTP {}", s))),
    }
}

struct ResponseMeta {
    size: Option<u64>,
    mime: Option<String>,
    hash: Option<String>,
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn response_meta(headers: &HeaderMap) -> ResponseMeta {
    ResponseMeta {
        size: header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()),
        mime: header_str(headers, CONTENT_TYPE).map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        }),
        hash: header_str(headers, ETAG).or_else(|| header_str(headers, LAST_MODIFIED)),
    }
}

#[async_trait]
impl SourceAdapter for HttpAdapter {
    fn source_type(&self) -> &str {
        "http"
    }

    fn description(&self) -> &str {
        "A single file served over HTTP or HTTPS"
    }

    fn supports_uri(&self, uri: &str) -> Option<UriClaim> {
        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Some(UriClaim::default().connection("url", uri))
        } else {
            None
        }
    }

    async fn enumerate(&self, config: &SourceConfig) -> Result<Vec<RawStreamHandle>> {
        let url = url_of(config)?;
        let handle = RawStreamHandle::new(url, file_name_of(url)).in_set(config.display_uri());

        let resp = self
            .request(reqwest::Method::HEAD, config, url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| HarnessError::connection(url, e))?;
        if matches!(
            resp.status(),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            tracing::debug!(uri = %url, "HEAD not supported, metadata deferred to open");
            return Ok(vec![handle]);
        }
        check_status(url, resp.status())?;

        let meta = response_meta(resp.headers());
        Ok(vec![handle
            .with_size(meta.size)
            .with_reported_mime(meta.mime)
            .with_hash(meta.hash, HashStatus::Exact)])
    }

    async fn open(&self, config: &SourceConfig, handle: &RawStreamHandle) -> Result<OpenStream> {
        tracing::debug!(uri = %handle.uri, "opening HTTP stream");
        let resp = self
            .request(reqwest::Method::GET, config, &handle.uri)
            .send()
            .await
            .map_err(|e| HarnessError::connection(&handle.uri, e))?;
        check_status(&handle.uri, resp.status())?;

        let meta = response_meta(resp.headers());
        let body = StreamReader::new(Box::pin(
            resp.bytes_stream().map_err(std::io::Error::other),
        ));
        Ok(OpenStream::new(Box::new(SyncIoBridge::new(body)))
            .with_size(meta.size)
            .with_reported_mime(meta.mime)
            .with_hash(meta.hash))
    }
}
