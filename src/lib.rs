//! # Stream Harness
//!
//! Point at a file, URL, bucket, or table and get back uniform,
//! schema-tagged record streams.
//!
//! Stream Harness resolves a source adapter from a URI, enumerates the raw
//! byte streams behind it, sniffs each stream's format from its first bytes,
//! unwraps archives recursively, negotiates how changes should be picked up,
//! and hands back stream-set previews whose record streams can be opened
//! again and again.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Connectors  │──▶│   Sniffer   │──▶│   Parsers    │──▶│  Previews   │
//! │ fs/http/s3/ │   │ magic bytes │   │ json/csv/... │   │ stream sets │
//! │ sqlite/test │   └─────────────┘   └──────┬───────┘   └──────┬──────┘
//! └─────────────┘          ▲                 │                  │
//!                          └── zip/tar/gz ───┘                  ▼
//!                             inner entries              ┌─────────────┐
//!                                                        │  Records    │
//!                                                        │ (channel)   │
//!                                                        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! streamh inspect ./data/legislators.json
//! streamh read https://example.com/export.csv --limit 10
//! streamh inspect ./bundle.zip --set fileNameFilter='.*\.csv'
//! streamh read s3://my-bucket/logs/ --set access_key_id=... --set secret_access_key=...
//! streamh sniff ./mystery.bin
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and per-source configuration |
//! | [`error`] | Error taxonomy |
//! | [`traits`] | Source adapter SPI and the connector registry |
//! | [`connector_fs`] | Local files, directories, and globs |
//! | [`connector_http`] | HTTP(S) URLs |
//! | [`connector_s3`] | Amazon S3 and compatible object stores |
//! | [`connector_sqlite`] | SQLite tables |
//! | [`connector_synthetic`] | Generated in-memory records |
//! | [`stream`] | Open streams and peek buffering |
//! | [`parser`] | Parser SPI, registry, and the built-in formats |
//! | [`prompt`] | The prompt callback |
//! | [`inspect`] | Stream-set orchestration |
//! | [`sources`] | Adapter and parser listings |

pub mod config;
pub mod connector_fs;
pub mod connector_http;
pub mod connector_s3;
pub mod connector_sqlite;
pub mod connector_synthetic;
pub mod error;
pub mod inspect;
pub mod parser;
pub mod prompt;
pub mod sources;
pub mod stream;
pub mod traits;
