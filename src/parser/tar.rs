//! TAR archives (ustar, GNU and PAX headers). Only regular files are read.

use async_trait::async_trait;
use std::sync::Arc;

use stream_harness_core::sniff::MIME_TAR;

use super::archive::{archive_records, inspect_archive, ArchiveKind};
use super::{InspectEnv, Parser, ParserContext, ParserInspection, ParserRegistry, RecordIter};
use crate::error::Result;
use crate::stream::{BufferedStreamSummary, ByteReader};

pub struct TarParser;

#[async_trait]
impl Parser for TarParser {
    fn mime_type(&self) -> &'static str {
        MIME_TAR
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["tar"]
    }

    fn display_name(&self) -> &'static str {
        "TAR archive"
    }

    async fn inspect(
        &self,
        summary: BufferedStreamSummary,
        context: ParserContext,
        env: &InspectEnv<'_>,
    ) -> Result<ParserInspection> {
        inspect_archive(ArchiveKind::Tar, summary, context, env).await
    }

    fn transforms(
        &self,
        slug_prefix: &str,
        context: &ParserContext,
        reader: ByteReader,
        parsers: &Arc<ParserRegistry>,
    ) -> Result<RecordIter> {
        archive_records(ArchiveKind::Tar, slug_prefix, context, reader, parsers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::archive::FILE_NAME_FILTER;
    use crate::parser::json::JSON_PATH;
    use crate::prompt::StaticPrompter;
    use crate::stream::OpenStream;
    use serde_json::json;
    use std::io::Cursor;
    use stream_harness_core::sniff::MIME_JSON;

    fn tar_of(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        for (name, body) in files {
            let mut header = ::tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *body).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[tokio::test]
    async fn filter_limits_records_to_matching_entry() {
        let bytes = tar_of(&[
            ("a.json", br#"[{"from":"a"},{"from":"a"}]"#),
            ("b.json", br#"[{"from":"b"}]"#),
        ]);
        let parsers = Arc::new(ParserRegistry::with_builtins());
        let prompter = StaticPrompter::from_pairs([(FILE_NAME_FILTER, r"a\.json")]);
        let env = InspectEnv {
            parsers: &parsers,
            prompter: &prompter,
            peek_bytes: 4096,
        };
        let summary = BufferedStreamSummary::buffer(
            "mem://pair.tar",
            "pair.tar",
            OpenStream::from_bytes(bytes.clone()),
            4096,
        )
        .unwrap();
        let inspection = TarParser
            .inspect(summary, ParserContext::default(), &env)
            .await
            .unwrap();
        let inner = inspection.context.inner.as_ref().unwrap();
        assert_eq!(inner.mime_type, MIME_JSON);
        assert_eq!(inner.context.get_str(JSON_PATH), Some("$"));

        let records: Vec<_> = TarParser
            .transforms("pair.tar", &inspection.context, Box::new(Cursor::new(bytes)), &parsers)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.record == json!({"from": "a"})));
        assert!(records.iter().all(|r| r.schema_slug == "a"));
    }
}
