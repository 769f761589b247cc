//! Source adapter SPI and the connector registry.
//!
//! A transport is added by implementing [`SourceAdapter`] and registering it
//! with a [`ConnectorRegistry`]; the orchestrator needs no changes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ConnectorRegistry                    │
//! │  ┌─────────┐ ┌──────┐ ┌────┐ ┌────────┐ ┌──────────┐ │
//! │  │synthetic│ │ HTTP │ │ S3 │ │ SQLite │ │filesystem│ │
//! │  └─────────┘ └──────┘ └────┘ └────────┘ └──────────┘ │
//! └──────────────┬───────────────────────────────────────┘
//!                ▼  first adapter whose supports_uri() claims the URI
//!          Inspector::inspect() → sniff → parse → previews
//! ```
//!
//! # Usage
//!
//! ```rust
//! use stream_harness::config::Config;
//! use stream_harness::traits::ConnectorRegistry;
//!
//! let connectors = ConnectorRegistry::with_builtins(&Config::default()).unwrap();
//! let (adapter, source) = connectors.resolve("./data/legislators.json").unwrap();
//! assert_eq!(adapter.source_type(), "filesystem");
//! assert_eq!(source.uris, vec!["./data/legislators.json".to_string()]);
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use stream_harness_core::models::{RawStreamHandle, UpdateMethod};
use stream_harness_core::prompt::Parameter;

use crate::config::{Config, SourceConfig};
use crate::error::{HarnessError, Result};
use crate::stream::OpenStream;

// ═══════════════════════════════════════════════════════════════════════
// SourceAdapter Trait
// ═══════════════════════════════════════════════════════════════════════

/// Configuration an adapter pre-fills when it claims a URI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UriClaim {
    pub connection: Map<String, Value>,
    pub credentials: Map<String, Value>,
    pub source: Map<String, Value>,
}

impl UriClaim {
    pub fn connection(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.connection.insert(key.to_string(), value.into());
        self
    }

    pub fn source(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.source.insert(key.to_string(), value.into());
        self
    }
}

/// A transport that can enumerate and open raw byte streams.
///
/// # Lifecycle
///
/// 1. [`supports_uri`](SourceAdapter::supports_uri) claims a URI and seeds
///    its configuration.
/// 2. [`missing_parameters`](SourceAdapter::missing_parameters) is called in
///    a loop with the prompt callback until it returns nothing.
/// 3. [`enumerate`](SourceAdapter::enumerate) lists the streams.
/// 4. [`open`](SourceAdapter::open) is called once per stream per read.
///
/// # Errors
///
/// Transport failures must be classified here: unreachable hosts as
/// `ConnectionFailed`, rejected credentials as `AuthenticationFailed`,
/// missing objects as `TargetNotFound`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Type identifier (e.g. `"filesystem"`, `"http"`, `"s3"`).
    fn source_type(&self) -> &str;

    /// One-line description for listings.
    fn description(&self) -> &str;

    /// Claim `uri`, returning the configuration it implies, or `None`.
    fn supports_uri(&self, uri: &str) -> Option<UriClaim>;

    /// Parameters still needed before [`enumerate`](SourceAdapter::enumerate)
    /// can run. Pure: no I/O.
    fn missing_parameters(&self, _config: &SourceConfig) -> Vec<Parameter> {
        Vec::new()
    }

    /// Update methods the transport itself dictates, replacing the ones the
    /// parser offers. `None` leaves the choice to the parser.
    fn update_methods(&self, _config: &SourceConfig) -> Option<Vec<UpdateMethod>> {
        None
    }

    /// List the streams this source exposes.
    async fn enumerate(&self, config: &SourceConfig) -> Result<Vec<RawStreamHandle>>;

    /// Open one stream. Opening the same handle twice yields the same bytes
    /// as long as the underlying content has not changed.
    async fn open(&self, config: &SourceConfig, handle: &RawStreamHandle) -> Result<OpenStream>;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Ordered list of source adapters. The first adapter that claims a URI
/// wins, so catch-all adapters (filesystem) register last.
pub struct ConnectorRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl ConnectorRegistry {
    /// Create an empty connector registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Create a registry with every built-in adapter.
    pub fn with_builtins(config: &Config) -> Result<Self> {
        use crate::connector_fs::FilesystemAdapter;
        use crate::connector_http::HttpAdapter;
        use crate::connector_s3::S3Adapter;
        use crate::connector_sqlite::SqliteAdapter;
        use crate::connector_synthetic::SyntheticAdapter;

        let mut registry = Self::new();
        registry.register(Box::new(SyntheticAdapter::new()));
        registry.register(Box::new(HttpAdapter::new(config.http.clone())?));
        registry.register(Box::new(S3Adapter::new(config.s3.clone())));
        registry.register(Box::new(SqliteAdapter::new()));
        registry.register(Box::new(FilesystemAdapter::new()));
        Ok(registry)
    }

    /// Register an adapter after the existing ones.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.push(Arc::from(adapter));
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Find the adapter claiming `uri` and the configuration it implies.
    pub fn resolve(&self, uri: &str) -> Result<(Arc<dyn SourceAdapter>, SourceConfig)> {
        for adapter in &self.adapters {
            if let Some(claim) = adapter.supports_uri(uri) {
                let config = SourceConfig {
                    source_type: adapter.source_type().to_string(),
                    uris: vec![uri.to_string()],
                    connection: claim.connection,
                    credentials: claim.credentials,
                    source: claim.source,
                    ..Default::default()
                };
                return Ok((adapter.clone(), config));
            }
        }
        Err(HarnessError::NoAdapterFound {
            uri: uri.to_string(),
        })
    }

    /// Adapter for an already-resolved configuration: by type when set,
    /// otherwise by its first URI. Claimed values fill gaps in `config`.
    pub fn resolve_config(&self, config: SourceConfig) -> Result<(Arc<dyn SourceAdapter>, SourceConfig)> {
        if config.source_type.is_empty() {
            let uri = config.uris.first().cloned().unwrap_or_default();
            let (adapter, claimed) = self.resolve(&uri)?;
            return Ok((adapter, merge_claim(claimed, config)));
        }

        let adapter = self
            .by_type(&config.source_type)
            .ok_or_else(|| HarnessError::NoAdapterFound {
                uri: config.display_uri().to_string(),
            })?;
        let claimed = config
            .uris
            .first()
            .and_then(|uri| adapter.supports_uri(uri))
            .unwrap_or_default();
        let seeded = SourceConfig {
            connection: claimed.connection,
            credentials: claimed.credentials,
            source: claimed.source,
            ..Default::default()
        };
        Ok((adapter, merge_claim(seeded, config)))
    }

    pub fn by_type(&self, source_type: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.source_type() == source_type)
            .cloned()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Return the count of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay `explicit` on the values an adapter claimed for the same URI.
fn merge_claim(claimed: SourceConfig, explicit: SourceConfig) -> SourceConfig {
    let mut merged = explicit;
    for (section, claimed_map) in [
        (&mut merged.connection, claimed.connection),
        (&mut merged.credentials, claimed.credentials),
        (&mut merged.source, claimed.source),
    ] {
        for (k, v) in claimed_map {
            section.entry(k).or_insert(v);
        }
    }
    if merged.source_type.is_empty() {
        merged.source_type = claimed.source_type;
    }
    if merged.uris.is_empty() {
        merged.uris = claimed.uris;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_by_scheme() {
        let registry = ConnectorRegistry::with_builtins(&Config::default()).unwrap();
        let cases = [
            ("test://greeting", "synthetic"),
            ("https://example.com/data.json", "http"),
            ("s3://bucket/prefix/", "s3"),
            ("sqlite://catalog.db", "sqlite"),
            ("/tmp/data.csv", "filesystem"),
            ("file:///tmp/data.csv", "filesystem"),
            ("data/*.csv", "filesystem"),
        ];
        for (uri, expected) in cases {
            let (adapter, config) = registry.resolve(uri).unwrap();
            assert_eq!(adapter.source_type(), expected, "uri {}", uri);
            assert_eq!(config.source_type, expected);
        }
    }

    #[test]
    fn unclaimed_uri_is_no_adapter_found() {
        let registry = ConnectorRegistry::with_builtins(&Config::default()).unwrap();
        let err = registry.resolve("ftp://example.com/file").err().unwrap();
        assert!(matches!(err, HarnessError::NoAdapterFound { .. }));
        assert!(err.to_string().contains("ftp://example.com/file"));
    }

    #[test]
    fn empty_registry_finds_nothing() {
        let registry = ConnectorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve("/tmp/x").is_err());
    }

    #[test]
    fn resolve_config_keeps_explicit_values() {
        let registry = ConnectorRegistry::with_builtins(&Config::default()).unwrap();
        let mut config = SourceConfig::new("s3", vec!["s3://bucket/data/".into()]);
        config
            .connection
            .insert("bucket".into(), Value::String("override".into()));
        let (adapter, merged) = registry.resolve_config(config).unwrap();
        assert_eq!(adapter.source_type(), "s3");
        assert_eq!(merged.connection["bucket"], "override");
        assert_eq!(merged.source["prefix"], "data/");
    }
}
