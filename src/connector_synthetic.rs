//! In-memory `test://` source for demos and tests. No I/O.
//!
//! `test://people` yields one stream holding a JSON array of generated
//! records. Source settings shape it:
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `content` | generated | Literal body of every stream |
//! | `records` | `3` | Generated records per stream |
//! | `streams` | `1` | Streams in the set |
//! | `file_name` | `<name>.json` | Name of the stream (numbered when several) |
//! | `mime` | none | Reported MIME type |
//! | `hash` | SHA-256 of body | Change hash |
//! | `continuous` | `false` | Present the feed as `CONTINUOUS` |

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use stream_harness_core::models::{HashStatus, RawStreamHandle, UpdateMethod};
use stream_harness_core::prompt::ConfigSection;

use crate::config::SourceConfig;
use crate::error::{HarnessError, Result};
use crate::stream::OpenStream;
use crate::traits::{SourceAdapter, UriClaim};

pub struct SyntheticAdapter;

impl SyntheticAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyntheticAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn setting_u64(config: &SourceConfig, key: &str, default: u64) -> u64 {
    config
        .source
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
        .unwrap_or(default)
}

fn is_continuous(config: &SourceConfig) -> bool {
    config
        .source
        .get("continuous")
        .is_some_and(|v| v.as_bool() == Some(true) || v.as_str() == Some("true"))
}

fn name_of(config: &SourceConfig) -> &str {
    config
        .get_str(ConfigSection::Source, "name")
        .unwrap_or("synthetic")
}

/// Body of stream `index`.
fn body(config: &SourceConfig, index: u64) -> Vec<u8> {
    if let Some(content) = config.get_str(ConfigSection::Source, "content") {
        return content.as_bytes().to_vec();
    }
    let name = name_of(config);
    let count = setting_u64(config, "records", 3);
    let records: Vec<Value> = (0..count)
        .map(|i| json!({"id": i + 1, "stream": index, "name": format!("{}-{}", name, i + 1)}))
        .collect();
    if is_continuous(config) {
        // a live feed is line oriented
        let mut out = Vec::new();
        for record in records {
            out.extend(record.to_string().into_bytes());
            out.push(b'\n');
        }
        return out;
    }
    Value::Array(records).to_string().into_bytes()
}

fn handle_uri(config: &SourceConfig, index: u64) -> String {
    format!("test://{}/{}", name_of(config), index)
}

fn index_of(uri: &str) -> Option<u64> {
    uri.rsplit_once('/')?.1.parse().ok()
}

#[async_trait]
impl SourceAdapter for SyntheticAdapter {
    fn source_type(&self) -> &str {
        "synthetic"
    }

    fn description(&self) -> &str {
        "Generated in-memory records (test://name)"
    }

    fn supports_uri(&self, uri: &str) -> Option<UriClaim> {
        let name = uri.strip_prefix("test://")?.trim_end_matches('/');
        if name.is_empty() {
            return None;
        }
        Some(UriClaim::default().source("name", name))
    }

    fn update_methods(&self, config: &SourceConfig) -> Option<Vec<UpdateMethod>> {
        is_continuous(config).then(|| vec![UpdateMethod::Continuous])
    }

    async fn enumerate(&self, config: &SourceConfig) -> Result<Vec<RawStreamHandle>> {
        let name = name_of(config);
        let streams = setting_u64(config, "streams", 1);
        let default_ext = if is_continuous(config) { "ndjson" } else { "json" };
        let file_name = config
            .get_str(ConfigSection::Source, "file_name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.{}", name, default_ext));
        let mime = config
            .get_str(ConfigSection::Source, "mime")
            .map(str::to_string);

        Ok((0..streams)
            .map(|index| {
                let file_name = if streams == 1 {
                    file_name.clone()
                } else {
                    match file_name.rsplit_once('.') {
                        Some((stem, ext)) => format!("{}-{}.{}", stem, index, ext),
                        None => format!("{}-{}", file_name, index),
                    }
                };
                let bytes = body(config, index);
                let hash = config
                    .get_str(ConfigSection::Source, "hash")
                    .map(str::to_string)
                    .unwrap_or_else(|| hex::encode(Sha256::digest(&bytes)));
                RawStreamHandle::new(handle_uri(config, index), file_name)
                    .in_set(config.display_uri())
                    .with_size(Some(bytes.len() as u64))
                    .with_reported_mime(mime.clone())
                    .with_hash(Some(hash), HashStatus::Exact)
            })
            .collect())
    }

    async fn open(&self, config: &SourceConfig, handle: &RawStreamHandle) -> Result<OpenStream> {
        let index = index_of(&handle.uri)
            .filter(|i| *i < setting_u64(config, "streams", 1))
            .ok_or_else(|| HarnessError::not_found(&handle.uri))?;
        Ok(OpenStream::from_bytes(body(config, index))
            .with_hash(handle.last_updated_hash.clone())
            .with_reported_mime(handle.reported_mime_type.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn config_for(uri: &str) -> SourceConfig {
        let claim = SyntheticAdapter.supports_uri(uri).unwrap();
        SourceConfig {
            source_type: "synthetic".into(),
            uris: vec![uri.into()],
            source: claim.source,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn generates_a_json_array() {
        let config = config_for("test://people");
        let handles = SyntheticAdapter.enumerate(&config).await.unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].file_name, "people.json");

        let mut open = SyntheticAdapter.open(&config, &handles[0]).await.unwrap();
        let mut text = String::new();
        open.reader.read_to_string(&mut text).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn several_streams_share_one_set() {
        let mut config = config_for("test://logs");
        config.source.insert("streams".into(), json!(3));
        let handles = SyntheticAdapter.enumerate(&config).await.unwrap();
        let names: Vec<_> = handles.iter().map(|h| h.file_name.as_str()).collect();
        assert_eq!(names, vec!["logs-0.json", "logs-1.json", "logs-2.json"]);
        assert!(handles.iter().all(|h| h.stream_set == "test://logs"));
    }

    #[tokio::test]
    async fn hash_follows_content() {
        let mut config = config_for("test://a");
        config.source.insert("content".into(), json!("[1]"));
        let first = SyntheticAdapter.enumerate(&config).await.unwrap();
        config.source.insert("content".into(), json!("[1,2]"));
        let second = SyntheticAdapter.enumerate(&config).await.unwrap();
        assert_ne!(first[0].last_updated_hash, second[0].last_updated_hash);
    }

    #[test]
    fn continuous_feeds_dictate_their_update_method() {
        let mut config = config_for("test://feed");
        assert!(SyntheticAdapter.update_methods(&config).is_none());
        config.source.insert("continuous".into(), json!(true));
        assert_eq!(
            SyntheticAdapter.update_methods(&config),
            Some(vec![UpdateMethod::Continuous])
        );
    }
}
