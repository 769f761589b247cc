//! gzip pass-through: decompress and hand the payload to the parser for
//! whatever is inside (`.json.gz`, `.csv.gz`, `.tar.gz`, ...).

use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use std::sync::Arc;

use stream_harness_core::slug::base_name;
use stream_harness_core::sniff::MIME_GZIP;

use super::archive::{inner_parser, inspect_inner, FILE_NAME_FILTER};
use super::{InspectEnv, Parser, ParserContext, ParserInspection, ParserRegistry, RecordIter};
use crate::error::{HarnessError, Result};
use crate::stream::{BufferedStreamSummary, ByteReader, OpenStream};

pub struct GzipParser;

/// Name of the decompressed payload: `x.json.gz` → `x.json`,
/// `x.tgz` → `x.tar`.
pub fn gunzipped_name(name: &str) -> String {
    let base = base_name(name);
    match base.rsplit_once('.') {
        Some((head, ext)) if !head.is_empty() && ext.eq_ignore_ascii_case("tgz") => {
            format!("{}.tar", head)
        }
        Some((head, ext))
            if !head.is_empty()
                && (ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("gzip")) =>
        {
            head.to_string()
        }
        _ => base.to_string(),
    }
}

#[async_trait]
impl Parser for GzipParser {
    fn mime_type(&self) -> &'static str {
        MIME_GZIP
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["gz", "gzip", "tgz"]
    }

    fn display_name(&self) -> &'static str {
        "gzip"
    }

    async fn inspect(
        &self,
        summary: BufferedStreamSummary,
        context: ParserContext,
        env: &InspectEnv<'_>,
    ) -> Result<ParserInspection> {
        let inner_name = gunzipped_name(&summary.file_name);
        let uri = summary.uri.clone();
        let peek_bytes = env.peek_bytes;
        let decoder: ByteReader = Box::new(MultiGzDecoder::new(summary.into_reader()));

        let join_uri = uri.clone();
        let inner = tokio::task::spawn_blocking(move || {
            BufferedStreamSummary::buffer(uri, inner_name, OpenStream::new(decoder), peek_bytes)
        })
        .await
        .map_err(|e| HarnessError::connection(join_uri, e))??;

        // a filter handed down from an enclosing archive goes on to a tarball
        let passed_filter = context.get_str(FILE_NAME_FILTER).map(str::to_string);
        inspect_inner(inner, context, passed_filter.as_deref(), env).await
    }

    fn transforms(
        &self,
        slug_prefix: &str,
        context: &ParserContext,
        reader: ByteReader,
        parsers: &Arc<ParserRegistry>,
    ) -> Result<RecordIter> {
        let (parser, inner_context) = inner_parser(slug_prefix, context, parsers)?;
        let decoder: ByteReader = Box::new(MultiGzDecoder::new(reader));
        parser.transforms(&gunzipped_name(slug_prefix), &inner_context, decoder, parsers)
    }
}
