//! Delimited text (CSV, TSV, pipe- or semicolon-separated).

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use stream_harness_core::models::{RecordContext, UpdateMethod};
use stream_harness_core::slug::schema_slug;
use stream_harness_core::sniff::{self, MIME_CSV};

use super::{InspectEnv, Parser, ParserContext, ParserInspection, ParserRegistry, RecordIter};
use crate::error::{HarnessError, Result};
use crate::stream::{BufferedStreamSummary, ByteReader};

/// Setting: single-character field delimiter.
pub const DELIMITER: &str = "delimiter";
/// Setting: whether the first row names the columns.
pub const HAS_HEADER_ROW: &str = "hasHeaderRow";

pub struct CsvParser;

#[async_trait]
impl Parser for CsvParser {
    fn mime_type(&self) -> &'static str {
        MIME_CSV
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["csv", "tsv"]
    }

    fn display_name(&self) -> &'static str {
        "Delimited text (CSV)"
    }

    async fn inspect(
        &self,
        summary: BufferedStreamSummary,
        context: ParserContext,
        _env: &InspectEnv<'_>,
    ) -> Result<ParserInspection> {
        let mut context = context;
        if context.get_str(DELIMITER).is_none() {
            let delimiter = sniff::guess_delimiter(summary.peek());
            context = context.with_setting(DELIMITER, (delimiter as char).to_string());
        }
        if context.get_bool(HAS_HEADER_ROW).is_none() {
            context = context.with_setting(HAS_HEADER_ROW, true);
        }
        delimiter_of(&summary.file_name, &context)?;

        Ok(ParserInspection {
            update_methods: vec![UpdateMethod::BatchFullSet, UpdateMethod::AppendOnlyLog],
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
        let delimiter = delimiter_of(slug_prefix, context)?;
        let has_headers = context.get_bool(HAS_HEADER_ROW).unwrap_or(true);
        let slug = schema_slug(slug_prefix);
        let name = slug_prefix.to_string();

        let mut csv = ::csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = if has_headers {
            csv.headers()
                .map_err(|e| HarnessError::parse(&name, e))?
                .iter()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Box::new(csv.into_records().map(move |row| {
            let row = row.map_err(|e| HarnessError::parse(&name, e))?;
            let mut record = Map::new();
            for (i, field) in row.iter().enumerate() {
                let column = headers
                    .get(i)
                    .filter(|h| !h.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", i));
                let value = if field.is_empty() {
                    Value::Null
                } else {
                    Value::String(field.to_string())
                };
                record.insert(column, value);
            }
            Ok(RecordContext::new(slug.clone(), Value::Object(record)))
        })))
    }
}

fn delimiter_of(name: &str, context: &ParserContext) -> Result<u8> {
    let raw = context.get_str(DELIMITER).unwrap_or(",");
    let raw = match raw {
        "\\t" | "tab" => "\t",
        other => other,
    };
    match raw.as_bytes() {
        [b] => Ok(*b),
        _ => Err(HarnessError::InvalidParserSetting {
            name: name.to_string(),
            setting: DELIMITER.to_string(),
            message: format!("expected a single ASCII character, got '{}'", raw),
        }),
    }
}
