//! ZIP archives, read as a forward-only stream of local file entries.
//!
//! Entries written with a trailing data descriptor (sizes unknown until the
//! entry ends, as produced by some streaming writers) cannot be read this
//! way and surface as a parse error.

use async_trait::async_trait;
use std::sync::Arc;

use stream_harness_core::sniff::MIME_ZIP;

use super::archive::{archive_records, inspect_archive, ArchiveKind};
use super::{InspectEnv, Parser, ParserContext, ParserInspection, ParserRegistry, RecordIter};
use crate::error::Result;
use crate::stream::{BufferedStreamSummary, ByteReader};

pub struct ZipParser;

#[async_trait]
impl Parser for ZipParser {
    fn mime_type(&self) -> &'static str {
        MIME_ZIP
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["zip"]
    }

    fn display_name(&self) -> &'static str {
        "ZIP archive"
    }

    async fn inspect(
        &self,
        summary: BufferedStreamSummary,
        context: ParserContext,
        env: &InspectEnv<'_>,
    ) -> Result<ParserInspection> {
        inspect_archive(ArchiveKind::Zip, summary, context, env).await
    }

    fn transforms(
        &self,
        slug_prefix: &str,
        context: &ParserContext,
        reader: ByteReader,
        parsers: &Arc<ParserRegistry>,
    ) -> Result<RecordIter> {
        archive_records(ArchiveKind::Zip, slug_prefix, context, reader, parsers)
    }
}
