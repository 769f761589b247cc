//! Avro object container files. The writer schema is read from the file
//! header, so no settings are needed.

use async_trait::async_trait;
use serde_json::Value;
use std::io::BufReader;
use std::sync::Arc;

use stream_harness_core::models::{RecordContext, UpdateMethod};
use stream_harness_core::slug::schema_slug;
use stream_harness_core::sniff::MIME_AVRO;

use super::{InspectEnv, Parser, ParserContext, ParserInspection, ParserRegistry, RecordIter};
use crate::error::{HarnessError, Result};
use crate::stream::{BufferedStreamSummary, ByteReader};

pub struct AvroParser;

#[async_trait]
impl Parser for AvroParser {
    fn mime_type(&self) -> &'static str {
        MIME_AVRO
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["avro"]
    }

    fn display_name(&self) -> &'static str {
        "Avro"
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
        let avro = apache_avro::Reader::new(BufReader::new(reader))
            .map_err(|e| HarnessError::parse(&name, e))?;

        Ok(Box::new(avro.map(move |value| {
            let value = value.map_err(|e| HarnessError::parse(&name, e))?;
            let record = Value::try_from(value).map_err(|e| HarnessError::parse(&name, e))?;
            Ok(RecordContext::new(slug.clone(), record))
        })))
    }
}
