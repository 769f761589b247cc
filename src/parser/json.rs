//! JSON document and newline-delimited JSON parsers.
//!
//! A JSON document is read whole and the records are selected with a
//! JSONPath expression. Every node the path matches becomes a record; a
//! matched array fans out into one record per element, so `$` over a
//! top-level array yields its elements.

use async_trait::async_trait;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use stream_harness_core::models::{RecordContext, UpdateMethod};
use stream_harness_core::prompt::{ConfigSection, Parameter, ParameterKind, ParameterOption};
use stream_harness_core::slug::schema_slug;
use stream_harness_core::sniff::{MIME_JSON, MIME_NDJSON};

use super::{InspectEnv, Parser, ParserContext, ParserInspection, ParserRegistry, RecordIter};
use crate::error::{HarnessError, Result};
use crate::stream::{BufferedStreamSummary, ByteReader};

/// Setting: JSONPath selecting the records.
pub const JSON_PATH: &str = "jsonPath";

pub struct JsonParser;

#[async_trait]
impl Parser for JsonParser {
    fn mime_type(&self) -> &'static str {
        MIME_JSON
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn display_name(&self) -> &'static str {
        "JSON"
    }

    async fn inspect(
        &self,
        summary: BufferedStreamSummary,
        context: ParserContext,
        env: &InspectEnv<'_>,
    ) -> Result<ParserInspection> {
        let mut context = context;

        if context.get_str(JSON_PATH).is_none() {
            let path = if root_is_array(summary.peek()) {
                "$".to_string()
            } else {
                let parameter = Parameter::new(
                    JSON_PATH,
                    format!("Which JSONPath selects the records in {}?", summary.file_name),
                    ParameterKind::Text,
                    ConfigSection::Parser,
                )
                .with_options(suggest_paths(summary.peek()))
                .with_default("$");
                env.ask(parameter)
                    .await?
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "$".to_string())
            };
            context = context.with_setting(JSON_PATH, path);
        }

        compile_path(&summary.file_name, context.get_str(JSON_PATH).unwrap_or("$"))?;

        Ok(ParserInspection {
            update_methods: vec![UpdateMethod::BatchFullSet],
            context,
        })
    }

    fn transforms(
        &self,
        slug_prefix: &str,
        context: &ParserContext,
        reader: ByteReader,
        _parsers: &Arc<ParserRegistry>,
    ) -> Result<RecordIter> {
        let path = compile_path(slug_prefix, context.get_str(JSON_PATH).unwrap_or("$"))?;
        let slug = schema_slug(slug_prefix);

        let document: Value = serde_json::from_reader(BufReader::new(reader))
            .map_err(|e| HarnessError::parse(slug_prefix, e))?;

        let mut records = Vec::new();
        for node in path.query(&document).all() {
            match node {
                Value::Array(items) => records.extend(items.iter().cloned()),
                other => records.push(other.clone()),
            }
        }

        Ok(Box::new(
            records
                .into_iter()
                .map(move |record| Ok(RecordContext::new(slug.clone(), record))),
        ))
    }
}

fn compile_path(name: &str, path: &str) -> Result<JsonPath> {
    JsonPath::parse(path).map_err(|e| HarnessError::InvalidParserSetting {
        name: name.to_string(),
        setting: JSON_PATH.to_string(),
        message: e.to_string(),
    })
}

fn root_is_array(peek: &[u8]) -> bool {
    peek.iter()
        .find(|b| !b.is_ascii_whitespace() && **b != 0xef && **b != 0xbb && **b != 0xbf)
        .is_some_and(|b| *b == b'[')
}

/// `$` plus `$.key` for every top-level key holding an array, when the
/// peek contains the whole document.
fn suggest_paths(peek: &[u8]) -> Vec<ParameterOption> {
    let mut options = vec![ParameterOption::new("The whole document", "$")];
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(peek) {
        for (key, value) in map {
            if let Value::Array(items) = value {
                options.push(ParameterOption::new(
                    format!("{} ({} items)", key, items.len()),
                    format!("$.{}", key),
                ));
            }
        }
    }
    options
}

/// Newline-delimited JSON: one record per non-empty line.
pub struct NdjsonParser;

#[async_trait]
impl Parser for NdjsonParser {
    fn mime_type(&self) -> &'static str {
        MIME_NDJSON
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["ndjson", "jsonl"]
    }

    fn display_name(&self) -> &'static str {
        "Newline-delimited JSON"
    }

    async fn inspect(
        &self,
        _summary: BufferedStreamSummary,
        context: ParserContext,
        _env: &InspectEnv<'_>,
    ) -> Result<ParserInspection> {
        Ok(ParserInspection {
            update_methods: vec![UpdateMethod::BatchFullSet, UpdateMethod::AppendOnlyLog],
            context,
        })
    }

    fn transforms(
        &self,
        slug_prefix: &str,
        _context: &ParserContext,
        reader: ByteReader,
        _parsers: &Arc<ParserRegistry>,
    ) -> Result<RecordIter> {
        let slug = schema_slug(slug_prefix);
        let name = slug_prefix.to_string();
        let lines = BufReader::new(reader).lines().enumerate();

        Ok(Box::new(lines.filter_map(move |(idx, line)| {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(HarnessError::parse(&name, e))),
            };
            if line.trim().is_empty() {
                return None;
            }
            Some(
                serde_json::from_str::<Value>(&line)
                    .map(|record| RecordContext::new(slug.clone(), record))
                    .map_err(|e| HarnessError::parse(&name, format!("line {}: {}", idx + 1, e))),
            )
        })))
    }
}
