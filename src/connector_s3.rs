//! Amazon S3 adapter.
//!
//! Claims `s3://bucket/prefix` URIs. Every object under the prefix is one
//! stream of a single stream set. Requests go straight to the S3 REST API
//! with AWS Signature V4 authentication; objects are streamed, never
//! downloaded whole.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for AWS signing, with
//! no C library dependencies like `aws-lc-sys`.
//!
//! # Configuration
//!
//! ```toml
//! [s3]
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO, path-style requests
//!
//! [sources.exports]
//! type = "s3"
//! uris = ["s3://acme-exports/daily/"]
//! connection = { region = "eu-west-1" }      # per-source override
//! ```
//!
//! # Credentials
//!
//! Taken from the source's `credentials` section (`access_key_id`,
//! `secret_access_key`, optional `session_token`), else from
//! `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
//! When neither has them they are asked for through the prompt callback.
//!
//! # Pagination
//!
//! Large prefixes (1000+ objects) are handled via the `ListObjectsV2`
//! continuation token mechanism.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use hmac::{Hmac, Mac};
use reqwest::header::{CONTENT_TYPE, ETAG};
use sha2::{Digest, Sha256};
use tokio_util::io::{StreamReader, SyncIoBridge};

use stream_harness_core::models::{HashStatus, RawStreamHandle};
use stream_harness_core::prompt::{ConfigSection, Parameter, ParameterKind};

use crate::config::{S3Config, SourceConfig};
use crate::connector_http::check_status;
use crate::error::{HarnessError, Result};
use crate::stream::OpenStream;
use crate::traits::{SourceAdapter, UriClaim};

type HmacSha256 = Hmac<Sha256>;

// ═══════════════════════════════════════════════════════════════════════
// SourceAdapter implementation
// ═══════════════════════════════════════════════════════════════════════

pub struct S3Adapter {
    defaults: S3Config,
    client: reqwest::Client,
}

impl S3Adapter {
    pub fn new(defaults: S3Config) -> Self {
        Self {
            defaults,
            client: reqwest::Client::new(),
        }
    }

    fn location(&self, config: &SourceConfig) -> Result<Location> {
        let bucket = config
            .get_str(ConfigSection::Connection, "bucket")
            .ok_or_else(|| HarnessError::ConfigurationIncomplete {
                uri: config.display_uri().to_string(),
                parameter: "bucket".to_string(),
            })?;
        Ok(Location {
            bucket: bucket.to_string(),
            prefix: config
                .get_str(ConfigSection::Source, "prefix")
                .unwrap_or_default()
                .to_string(),
            region: config
                .get_str(ConfigSection::Connection, "region")
                .unwrap_or(&self.defaults.region)
                .to_string(),
            endpoint_url: config
                .get_str(ConfigSection::Connection, "endpoint_url")
                .map(str::to_string)
                .or_else(|| self.defaults.endpoint_url.clone()),
        })
    }

    /// Send a signed GET for `key` (or the bucket root when `key` is empty).
    async fn get(
        &self,
        location: &Location,
        creds: &AwsCredentials,
        key: &str,
        query: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let (scheme, host, base_path) = location.endpoint();
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("{}/{}", base_path, encoded_key);
        let canonical_query = canonical_query(query);

        let signed = sign_get(creds, &location.region, &host, &canonical_uri, &canonical_query, Utc::now());
        let url = if canonical_query.is_empty() {
            format!("{}://{}{}", scheme, host, canonical_uri)
        } else {
            format!("{}://{}{}?{}", scheme, host, canonical_uri, canonical_query)
        };

        let mut req = self.client.get(&url);
        for (name, value) in signed {
            req = req.header(name, value);
        }
        let target = location.uri(key);
        let resp = req
            .send()
            .await
            .map_err(|e| HarnessError::connection(&target, e))?;
        check_status(&target, resp.status())?;
        Ok(resp)
    }

    async fn list_objects(&self, location: &Location, creds: &AwsCredentials) -> Result<Vec<S3Object>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !location.prefix.is_empty() {
                query.push(("prefix".to_string(), location.prefix.clone()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self.get(location, creds, "", &query).await?;
            let xml = resp
                .text()
                .await
                .map_err(|e| HarnessError::connection(location.uri(""), e))?;
            let (batch, is_truncated, next_token) = parse_list_objects_response(&xml);
            objects.extend(batch);

            if is_truncated && next_token.is_some() {
                continuation_token = next_token;
            } else {
                break;
            }
        }
        Ok(objects)
    }
}

#[async_trait]
impl SourceAdapter for S3Adapter {
    fn source_type(&self) -> &str {
        "s3"
    }

    fn description(&self) -> &str {
        "Objects under an S3 bucket prefix"
    }

    fn supports_uri(&self, uri: &str) -> Option<UriClaim> {
        let rest = uri.strip_prefix("s3://")?;
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return None;
        }
        Some(
            UriClaim::default()
                .connection("bucket", bucket)
                .source("prefix", prefix),
        )
    }

    fn missing_parameters(&self, config: &SourceConfig) -> Vec<Parameter> {
        let mut missing = Vec::new();
        if !config.has(ConfigSection::Connection, "bucket") {
            missing.push(Parameter::new(
                "bucket",
                "Which S3 bucket?",
                ParameterKind::Text,
                ConfigSection::Connection,
            ));
        }
        if AwsCredentials::resolve(config).is_none() {
            if credential(config, "access_key_id", "AWS_ACCESS_KEY_ID").is_none() {
                missing.push(Parameter::new(
                    "access_key_id",
                    "AWS access key ID",
                    ParameterKind::Text,
                    ConfigSection::Credentials,
                ));
            }
            if credential(config, "secret_access_key", "AWS_SECRET_ACCESS_KEY").is_none() {
                missing.push(Parameter::new(
                    "secret_access_key",
                    "AWS secret access key",
                    ParameterKind::Password,
                    ConfigSection::Credentials,
                ));
            }
        }
        missing
    }

    async fn enumerate(&self, config: &SourceConfig) -> Result<Vec<RawStreamHandle>> {
        let location = self.location(config)?;
        let creds = AwsCredentials::resolve(config).ok_or_else(|| {
            HarnessError::ConfigurationIncomplete {
                uri: config.display_uri().to_string(),
                parameter: "access_key_id".to_string(),
            }
        })?;

        let objects = self.list_objects(&location, &creds).await?;
        if objects.is_empty() {
            return Err(HarnessError::not_found(location.uri(&location.prefix)));
        }

        let set = config.display_uri();
        Ok(objects
            .into_iter()
            .map(|obj| {
                let file_name = obj.key.rsplit('/').next().unwrap_or(&obj.key).to_string();
                RawStreamHandle::new(location.uri(&obj.key), file_name)
                    .in_set(set)
                    .with_size(Some(obj.size))
                    .with_hash(Some(obj.etag).filter(|e| !e.is_empty()), HashStatus::Exact)
            })
            .collect())
    }

    async fn open(&self, config: &SourceConfig, handle: &RawStreamHandle) -> Result<OpenStream> {
        let location = self.location(config)?;
        let creds = AwsCredentials::resolve(config).ok_or_else(|| {
            HarnessError::ConfigurationIncomplete {
                uri: handle.uri.clone(),
                parameter: "access_key_id".to_string(),
            }
        })?;
        let key = handle
            .uri
            .strip_prefix(&location.uri(""))
            .ok_or_else(|| HarnessError::not_found(&handle.uri))?;

        tracing::debug!(uri = %handle.uri, "opening S3 object");
        let resp = self.get(&location, &creds, key, &[]).await?;
        let headers = resp.headers();
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|e| e.trim_matches('"').to_string());
        let mime = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|m| m.split(';').next().unwrap_or_default().trim().to_string());
        let size = resp.content_length();

        let body = StreamReader::new(Box::pin(
            resp.bytes_stream().map_err(std::io::Error::other),
        ));
        Ok(OpenStream::new(Box::new(SyncIoBridge::new(body)))
            .with_size(size)
            .with_reported_mime(mime)
            .with_hash(etag))
    }
}

// ============ Location ============

struct Location {
    bucket: String,
    prefix: String,
    region: String,
    endpoint_url: Option<String>,
}

impl Location {
    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// `(scheme, host, base path)`. Custom endpoints (MinIO, LocalStack)
    /// use path-style addressing, AWS uses virtual-hosted style.
    fn endpoint(&self) -> (String, String, String) {
        match &self.endpoint_url {
            Some(endpoint) => {
                let (scheme, host) = match endpoint.split_once("://") {
                    Some((scheme, host)) => (scheme.to_string(), host),
                    None => ("https".to_string(), endpoint.as_str()),
                };
                (
                    scheme,
                    host.trim_end_matches('/').to_string(),
                    format!("/{}", uri_encode(&self.bucket)),
                )
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
                String::new(),
            ),
        }
    }
}

// ============ AWS Credentials ============

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

fn credential(config: &SourceConfig, key: &str, env: &str) -> Option<String> {
    config
        .get_str(ConfigSection::Credentials, key)
        .map(str::to_string)
        .or_else(|| std::env::var(env).ok().filter(|v| !v.is_empty()))
}

impl AwsCredentials {
    /// Source credentials first, then the standard environment variables.
    fn resolve(config: &SourceConfig) -> Option<Self> {
        Some(Self {
            access_key_id: credential(config, "access_key_id", "AWS_ACCESS_KEY_ID")?,
            secret_access_key: credential(config, "secret_access_key", "AWS_SECRET_ACCESS_KEY")?,
            session_token: credential(config, "session_token", "AWS_SESSION_TOKEN"),
        })
    }
}

// ============ AWS SigV4 Helpers ============

fn canonical_query(query: &[(String, String)]) -> String {
    let mut sorted = query.to_vec();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Headers for a signed, body-less GET.
fn sign_get(
    creds: &AwsCredentials,
    region: &str,
    host: &str,
    canonical_uri: &str,
    canonical_query: &str,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(b"");

    let mut headers = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "GET\n{}\n{}\n{}\n{}\n{}",
        canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
    );
    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );
    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    // host is set by the HTTP client itself
    let mut out: Vec<(String, String)> = headers.into_iter().filter(|(k, _)| k != "host").collect();
    out.push(("authorization".to_string(), authorization));
    out
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so new_from_slice cannot fail
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode per RFC 3986, leaving only `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing (minimal, no extra deps) ============

struct S3Object {
    key: String,
    /// Entity tag, stripped of surrounding quotes.
    etag: String,
    size: u64,
}

/// Objects, truncation flag, and continuation token of one
/// `ListObjectsV2` page. Folder placeholder keys (`a/b/`) are skipped.
fn parse_list_objects_response(xml: &str) -> (Vec<S3Object>, bool, Option<String>) {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key")
            .map(|k| xml_unescape(&k))
            .unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            continue;
        }
        objects.push(S3Object {
            key,
            etag: extract_xml_value(block, "ETag")
                .map(|e| xml_unescape(&e).trim_matches('"').to_string())
                .unwrap_or_default(),
            size: extract_xml_value(block, "Size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        });
    }

    (objects, is_truncated, next_token)
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let value_start = xml.find(&open)? + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(xml[value_start..value_start + end].to_string())
}

fn xml_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn claims_bucket_and_prefix() {
        let adapter = S3Adapter::new(S3Config::default());
        let claim = adapter.supports_uri("s3://bucket/data/").unwrap();
        assert_eq!(claim.connection["bucket"], "bucket");
        assert_eq!(claim.source["prefix"], "data/");

        let claim = adapter.supports_uri("s3://bucket").unwrap();
        assert_eq!(claim.source["prefix"], "");
        assert!(adapter.supports_uri("s3:///key").is_none());
        assert!(adapter.supports_uri("https://bucket/key").is_none());
    }

    #[test]
    fn explicit_credentials_need_no_prompt() {
        let adapter = S3Adapter::new(S3Config::default());
        let mut config = SourceConfig::new("s3", vec!["s3://b/".into()]);
        config.connection.insert("bucket".into(), "b".into());
        config.credentials.insert("access_key_id".into(), "AKID".into());
        config.credentials.insert("secret_access_key".into(), "secret".into());
        assert!(adapter.missing_parameters(&config).is_empty());
    }

    #[test]
    fn signing_key_matches_aws_example() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn signed_headers_cover_token_and_date() {
        let creds = AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: Some("tok".into()),
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let headers = sign_get(&creds, "us-east-1", "b.s3.us-east-1.amazonaws.com", "/k", "", now);
        let auth = &headers.iter().find(|(k, _)| k == "authorization").unwrap().1;
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKID/20240501/us-east-1/s3/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token"));
        assert!(headers.iter().any(|(k, v)| k == "x-amz-date" && v == "20240501T120000Z"));
        assert!(!headers.iter().any(|(k, _)| k == "host"));
    }

    #[test]
    fn list_response_is_parsed() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>abc</NextContinuationToken>
            <Contents><Key>data/</Key><ETag>&quot;d&quot;</ETag><Size>0</Size></Contents>
            <Contents><Key>data/a&amp;b.json</Key><ETag>&quot;e1&quot;</ETag><Size>12</Size></Contents>
        </ListBucketResult>"#;
        let (objects, truncated, token) = parse_list_objects_response(xml);
        assert!(truncated);
        assert_eq!(token.as_deref(), Some("abc"));
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "data/a&b.json");
        assert_eq!(objects[0].etag, "e1");
        assert_eq!(objects[0].size, 12);
    }

    #[test]
    fn custom_endpoints_use_path_style() {
        let location = Location {
            bucket: "b".into(),
            prefix: String::new(),
            region: "us-east-1".into(),
            endpoint_url: Some("http://localhost:9000/".into()),
        };
        assert_eq!(
            location.endpoint(),
            ("http".to_string(), "localhost:9000".to_string(), "/b".to_string())
        );
    }
}
