//! TOML configuration and the per-source configuration record.
//!
//! ```toml
//! [inspection]
//! peek_bytes = 1048576
//! record_channel_capacity = 256
//! max_eager_streams = 64
//!
//! [http]
//! timeout_secs = 30
//!
//! [s3]
//! region = "eu-west-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//!
//! [sources.legislators]
//! type = "filesystem"
//! uris = ["./data/legislators.json"]
//! [sources.legislators.parsers."application/json".settings]
//! jsonPath = "$"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use stream_harness_core::models::UpdateMethod;
use stream_harness_core::prompt::ConfigSection;

use crate::error::{HarnessError, Result};
use crate::parser::ParserContext;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub inspection: InspectionSettings,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InspectionSettings {
    /// Bytes peeked from every stream for sniffing.
    #[serde(default = "default_peek_bytes")]
    pub peek_bytes: usize,
    /// Records buffered between a parsing pipeline and its consumer.
    #[serde(default = "default_record_channel_capacity")]
    pub record_channel_capacity: usize,
    /// Stream sets with more streams than this are returned as lazy cursors.
    #[serde(default = "default_max_eager_streams")]
    pub max_eager_streams: usize,
}

impl Default for InspectionSettings {
    fn default() -> Self {
        Self {
            peek_bytes: default_peek_bytes(),
            record_channel_capacity: default_record_channel_capacity(),
            max_eager_streams: default_max_eager_streams(),
        }
    }
}

fn default_peek_bytes() -> usize {
    1024 * 1024
}
fn default_record_channel_capacity() -> usize {
    256
}
fn default_max_eager_streams() -> usize {
    64
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("stream-harness/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Everything needed to inspect one source, plus the choices earlier
/// inspections persisted so repeat inspections stay silent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(default)]
    pub connection: Map<String, Value>,
    #[serde(default)]
    pub credentials: Map<String, Value>,
    #[serde(default)]
    pub source: Map<String, Value>,
    /// Parser MIME type chosen by hand for undetectable content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_override: Option<String>,
    /// Resolved parser settings, keyed by parser MIME type.
    #[serde(default)]
    pub parsers: BTreeMap<String, ParserContext>,
    /// Chosen update method, keyed by stream-set slug.
    #[serde(default)]
    pub update_methods: BTreeMap<String, UpdateMethod>,
}

impl SourceConfig {
    pub fn new(source_type: impl Into<String>, uris: Vec<String>) -> Self {
        Self {
            source_type: source_type.into(),
            uris,
            ..Default::default()
        }
    }

    /// First URI, or the source type when the source has none.
    pub fn display_uri(&self) -> &str {
        self.uris
            .first()
            .map(String::as_str)
            .unwrap_or(self.source_type.as_str())
    }

    pub fn section(&self, section: ConfigSection) -> Option<&Map<String, Value>> {
        match section {
            ConfigSection::Connection => Some(&self.connection),
            ConfigSection::Credentials => Some(&self.credentials),
            ConfigSection::Source => Some(&self.source),
            ConfigSection::Parser | ConfigSection::Inspection => None,
        }
    }

    pub fn section_mut(&mut self, section: ConfigSection) -> Option<&mut Map<String, Value>> {
        match section {
            ConfigSection::Connection => Some(&mut self.connection),
            ConfigSection::Credentials => Some(&mut self.credentials),
            ConfigSection::Source => Some(&mut self.source),
            ConfigSection::Parser | ConfigSection::Inspection => None,
        }
    }

    /// A string value from `section`, ignoring empty strings.
    pub fn get_str(&self, section: ConfigSection, key: &str) -> Option<&str> {
        self.section(section)?
            .get(key)?
            .as_str()
            .filter(|s| !s.is_empty())
    }

    pub fn has(&self, section: ConfigSection, key: &str) -> bool {
        self.section(section)
            .and_then(|m| m.get(key))
            .is_some_and(|v| !v.is_null() && v.as_str() != Some(""))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let origin = path.display().to_string();
    let content = std::fs::read_to_string(path)
        .map_err(|e| HarnessError::config(&origin, format!("failed to read: {}", e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| HarnessError::config(&origin, format!("failed to parse: {}", e)))?;

    validate(&config).map_err(|message| HarnessError::config(&origin, message))?;
    Ok(config)
}

fn validate(config: &Config) -> std::result::Result<(), String> {
    if config.inspection.peek_bytes == 0 {
        return Err("inspection.peek_bytes must be > 0".into());
    }
    if config.inspection.record_channel_capacity == 0 {
        return Err("inspection.record_channel_capacity must be > 0".into());
    }
    if config.inspection.max_eager_streams == 0 {
        return Err("inspection.max_eager_streams must be > 0".into());
    }
    if config.http.timeout_secs == 0 {
        return Err("http.timeout_secs must be > 0".into());
    }
    for (name, source) in &config.sources {
        if source.source_type.is_empty() && source.uris.is_empty() {
            return Err(format!("sources.{} needs a type or at least one uri", name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.inspection.peek_bytes, 1024 * 1024);
        assert_eq!(config.s3.region, "us-east-1");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn source_presets_round_trip_parser_settings() {
        let file = write_config(
            r#"
[sources.legislators]
type = "filesystem"
uris = ["./legislators.json"]

[sources.legislators.parsers."application/json".settings]
jsonPath = "$"

[sources.legislators.update_methods]
legislators = "BATCH_FULL_SET"
"#,
        );
        let config = load_config(file.path()).unwrap();
        let source = &config.sources["legislators"];
        assert_eq!(source.source_type, "filesystem");
        let ctx = &source.parsers["application/json"];
        assert_eq!(ctx.get_str("jsonPath"), Some("$"));
        assert_eq!(
            source.update_methods["legislators"],
            UpdateMethod::BatchFullSet
        );
    }

    #[test]
    fn zero_peek_is_rejected() {
        let file = write_config("[inspection]\npeek_bytes = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("peek_bytes"));
        assert!(err
            .to_string()
            .contains(&file.path().display().to_string()));
    }

    #[test]
    fn get_str_ignores_empty_values() {
        let mut cfg = SourceConfig::new("sqlite", vec!["sqlite://x.db".into()]);
        cfg.source.insert("table".into(), Value::String(String::new()));
        assert_eq!(cfg.get_str(ConfigSection::Source, "table"), None);
        assert!(!cfg.has(ConfigSection::Source, "table"));
        cfg.source.insert("table".into(), Value::String("users".into()));
        assert_eq!(cfg.get_str(ConfigSection::Source, "table"), Some("users"));
    }
}
