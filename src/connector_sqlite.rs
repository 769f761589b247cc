//! SQLite adapter: one stream per table.
//!
//! Claims `sqlite:` URIs (`sqlite:catalog.db`, `sqlite://catalog.db`). Each
//! selected table becomes its own stream set with one stream whose bytes
//! are the table's rows as a JSON array, in `rowid` order, so the regular
//! sniffing and JSON parsing apply unchanged.
//!
//! Rows are fetched incrementally on a runtime task and serialized into
//! chunks as the reader asks for them; a table is never held in memory
//! whole. Dropping the reader stops the fetch.
//!
//! SQLite keeps no per-table modification stamp, so the change hash is the
//! wall-clock time of enumeration, flagged as
//! [`HashStatus::WallClockFallback`]. Consumers must not treat it as a
//! content fingerprint.
//!
//! # Source settings
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `tables` | Comma-separated table names, or `*` for every table |

use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::io::{self, Cursor};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};

use stream_harness_core::models::{HashStatus, RawStreamHandle};
use stream_harness_core::prompt::{ConfigSection, Parameter, ParameterKind};
use stream_harness_core::sniff::MIME_JSON;

use crate::config::SourceConfig;
use crate::error::{HarnessError, Result};
use crate::stream::OpenStream;
use crate::traits::{SourceAdapter, UriClaim};

/// Serialized rows are handed to the reader in chunks of about this size.
const ROW_CHUNK_BYTES: usize = 64 * 1024;
const ROW_CHUNK_QUEUE: usize = 4;

type RowChunks = mpsc::Sender<io::Result<Cursor<Vec<u8>>>>;

pub struct SqliteAdapter;

impl SqliteAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn database_of(config: &SourceConfig) -> Result<&str> {
    config
        .get_str(ConfigSection::Connection, "database")
        .ok_or_else(|| HarnessError::ConfigurationIncomplete {
            uri: config.display_uri().to_string(),
            parameter: "database".to_string(),
        })
}

async fn connect(database: &str) -> Result<SqlitePool> {
    if !Path::new(database).exists() {
        return Err(HarnessError::not_found(format!("sqlite:{}", database)));
    }
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", database))
        .map_err(|e| HarnessError::connection(database, e))?
        .read_only(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| HarnessError::connection(database, e))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `sqlite:db#table` → `table`.
fn table_of(uri: &str) -> Option<&str> {
    uri.rsplit_once('#').map(|(_, table)| table)
}

fn column_value(row: &SqliteRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|b| Value::String(hex::encode(b)))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn row_to_json(row: &SqliteRow) -> Value {
    let mut record = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), column_value(row, index));
    }
    Value::Object(record)
}

/// `SELECT` for every row of `table`, in `rowid` order where the table has
/// one. `None` when there is no such table.
async fn select_for(pool: &SqlitePool, table: &str) -> sqlx::Result<Option<String>> {
    let definition: Option<Option<String>> =
        sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    let Some(definition) = definition else {
        return Ok(None);
    };
    let without_rowid = definition
        .unwrap_or_default()
        .to_ascii_uppercase()
        .contains("WITHOUT ROWID");
    Ok(Some(if without_rowid {
        format!("SELECT * FROM {}", quote_ident(table))
    } else {
        format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table))
    }))
}

/// Fetch the rows of `select` and send them as one JSON array, then close
/// the pool.
async fn stream_rows(pool: SqlitePool, select: String, uri: String, chunks: RowChunks) {
    match send_rows(&pool, &select, &chunks).await {
        Ok(Some(rows)) => tracing::debug!(uri = %uri, rows, "table streamed"),
        Ok(None) => tracing::debug!(uri = %uri, "table reader dropped, fetch stopped"),
        Err(e) => {
            tracing::warn!(uri = %uri, error = %e, "reading table failed");
            let _ = chunks.send(Err(e)).await;
        }
    }
    pool.close().await;
}

/// The number of rows sent, or `None` once the reader has gone away.
async fn send_rows(pool: &SqlitePool, select: &str, chunks: &RowChunks) -> io::Result<Option<usize>> {
    let mut rows = sqlx::query(select).fetch(pool);
    let mut chunk = b"[".to_vec();
    let mut count = 0usize;
    while let Some(row) = rows.try_next().await.map_err(io::Error::other)? {
        if count > 0 {
            chunk.push(b',');
        }
        count += 1;
        serde_json::to_writer(&mut chunk, &row_to_json(&row)).map_err(io::Error::other)?;
        if chunk.len() >= ROW_CHUNK_BYTES
            && chunks.send(Ok(Cursor::new(std::mem::take(&mut chunk)))).await.is_err()
        {
            return Ok(None);
        }
    }
    chunk.push(b']');
    if chunks.send(Ok(Cursor::new(chunk))).await.is_err() {
        return Ok(None);
    }
    Ok(Some(count))
}

#[async_trait]
impl SourceAdapter for SqliteAdapter {
    fn source_type(&self) -> &str {
        "sqlite"
    }

    fn description(&self) -> &str {
        "Tables of a SQLite database"
    }

    fn supports_uri(&self, uri: &str) -> Option<UriClaim> {
        let database = uri
            .strip_prefix("sqlite://")
            .or_else(|| uri.strip_prefix("sqlite:"))?;
        if database.is_empty() {
            return None;
        }
        Some(UriClaim::default().connection("database", database))
    }

    fn missing_parameters(&self, config: &SourceConfig) -> Vec<Parameter> {
        if config.has(ConfigSection::Source, "tables") {
            return Vec::new();
        }
        vec![Parameter::new(
            "tables",
            "Which tables should be read? (comma-separated, * for all)",
            ParameterKind::Text,
            ConfigSection::Source,
        )
        .with_default("*")]
    }

    async fn enumerate(&self, config: &SourceConfig) -> Result<Vec<RawStreamHandle>> {
        let database = database_of(config)?;
        let pool = connect(database).await?;

        let existing: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| HarnessError::connection(database, e))?;

        let wanted = config
            .get_str(ConfigSection::Source, "tables")
            .unwrap_or("*");
        let tables: Vec<String> = if wanted.trim() == "*" {
            existing
        } else {
            let mut picked = Vec::new();
            for name in wanted.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if !existing.iter().any(|t| t == name) {
                    return Err(HarnessError::not_found(format!("sqlite:{}#{}", database, name)));
                }
                picked.push(name.to_string());
            }
            picked
        };
        pool.close().await;

        let stamp = Utc::now().to_rfc3339();
        tracing::warn!(
            database = %database,
            "no commit timestamps in SQLite, change token falls back to wall clock"
        );
        Ok(tables
            .into_iter()
            .map(|table| {
                let uri = format!("sqlite:{}#{}", database, table);
                RawStreamHandle::new(&uri, format!("{}.json", table))
                    .in_set(&uri)
                    .with_reported_mime(Some(MIME_JSON.to_string()))
                    .with_hash(Some(stamp.clone()), HashStatus::WallClockFallback)
            })
            .collect())
    }

    async fn open(&self, config: &SourceConfig, handle: &RawStreamHandle) -> Result<OpenStream> {
        let database = database_of(config)?;
        let table = table_of(&handle.uri).ok_or_else(|| HarnessError::not_found(&handle.uri))?;
        tracing::debug!(uri = %handle.uri, "reading table");

        let pool = connect(database).await?;
        let select = match select_for(&pool, table).await {
            Ok(Some(select)) => select,
            Ok(None) => {
                pool.close().await;
                return Err(HarnessError::not_found(&handle.uri));
            }
            Err(e) => {
                pool.close().await;
                return Err(HarnessError::connection(&handle.uri, e));
            }
        };

        let (tx, rx) = mpsc::channel(ROW_CHUNK_QUEUE);
        tokio::spawn(stream_rows(pool, select, handle.uri.clone(), tx));
        let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        let body = StreamReader::new(Box::pin(chunks));
        Ok(OpenStream::new(Box::new(SyncIoBridge::new(body)))
            .with_reported_mime(Some(MIME_JSON.to_string()))
            .with_hash(Some(Utc::now().to_rfc3339())))
    }
}
