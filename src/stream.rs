//! Live byte streams and peek buffering.
//!
//! An adapter's `open` yields an [`OpenStream`]. The orchestrator (or a
//! container parser, for inner entries) peeks up to a fixed number of bytes
//! into a [`BufferedStreamSummary`], sniffs them, and later hands the whole
//! stream to a parser with [`BufferedStreamSummary::into_reader`], which
//! replays the peeked bytes before the rest of the live stream.

use std::io::{Cursor, Read};
use std::sync::Mutex;

use stream_harness_core::models::RawStreamHandle;
use stream_harness_core::sniff;

use crate::error::{HarnessError, Result};

/// A blocking byte source. Parsing pipelines read these on blocking threads.
pub type ByteReader = Box<dyn Read + Send>;

/// A live byte stream plus metadata refreshed at open time. Some transports
/// (HTTP) only learn size, hash, and type from the response itself.
pub struct OpenStream {
    pub reader: ByteReader,
    pub file_size: Option<u64>,
    pub last_updated_hash: Option<String>,
    pub reported_mime_type: Option<String>,
}

impl OpenStream {
    pub fn new(reader: ByteReader) -> Self {
        Self {
            reader,
            file_size: None,
            last_updated_hash: None,
            reported_mime_type: None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self::new(Box::new(Cursor::new(bytes))).with_size(Some(size))
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.file_size = size;
        self
    }

    pub fn with_hash(mut self, hash: Option<String>) -> Self {
        self.last_updated_hash = hash;
        self
    }

    pub fn with_reported_mime(mut self, mime: Option<String>) -> Self {
        self.reported_mime_type = mime;
        self
    }
}

impl std::fmt::Debug for OpenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStream")
            .field("file_size", &self.file_size)
            .field("last_updated_hash", &self.last_updated_hash)
            .field("reported_mime_type", &self.reported_mime_type)
            .finish_non_exhaustive()
    }
}

/// An opened stream with its first bytes buffered and sniffed.
///
/// `detected_mime_type` comes from the peeked bytes only; `file_name` and
/// `reported_mime_type` are advisory and may disagree with it.
///
/// The summary is `Sync` so parsers can hold a reference to it across
/// prompts; the live remainder sits behind a mutex for that.
pub struct BufferedStreamSummary {
    pub uri: String,
    pub file_name: String,
    pub file_size: Option<u64>,
    pub reported_mime_type: Option<String>,
    pub last_updated_hash: Option<String>,
    pub detected_mime_type: Option<&'static str>,
    peek: Vec<u8>,
    rest: Mutex<ByteReader>,
}

impl BufferedStreamSummary {
    /// Peek up to `cap` bytes from `open`. Blocks on the underlying reader.
    pub fn buffer(
        uri: impl Into<String>,
        file_name: impl Into<String>,
        open: OpenStream,
        cap: usize,
    ) -> Result<Self> {
        let uri = uri.into();
        let mut rest = open.reader;
        let mut peek = Vec::with_capacity(cap.min(64 * 1024));
        rest.by_ref()
            .take(cap as u64)
            .read_to_end(&mut peek)
            .map_err(|e| HarnessError::from_io(uri.clone(), e))?;
        let detected_mime_type = sniff::detect(&peek);

        Ok(Self {
            uri,
            file_name: file_name.into(),
            file_size: open.file_size,
            reported_mime_type: open.reported_mime_type,
            last_updated_hash: open.last_updated_hash,
            detected_mime_type,
            peek,
            rest: Mutex::new(rest),
        })
    }

    /// Buffer an adapter stream. Open-time metadata wins over the metadata
    /// recorded when the handle was enumerated.
    pub async fn from_handle(handle: &RawStreamHandle, open: OpenStream, cap: usize) -> Result<Self> {
        let uri = handle.uri.clone();
        let file_name = handle.file_name.clone();
        let open = OpenStream {
            file_size: open.file_size.or(handle.file_size),
            last_updated_hash: open
                .last_updated_hash
                .or_else(|| handle.last_updated_hash.clone()),
            reported_mime_type: open
                .reported_mime_type
                .or_else(|| handle.reported_mime_type.clone()),
            reader: open.reader,
        };
        let join_uri = uri.clone();
        tokio::task::spawn_blocking(move || Self::buffer(uri, file_name, open, cap))
            .await
            .map_err(|e| HarnessError::connection(join_uri, e))?
    }

    pub fn peek(&self) -> &[u8] {
        &self.peek
    }

    /// Reported MIME type for messages, `unknown` when the transport had none.
    pub fn reported(&self) -> &str {
        self.reported_mime_type.as_deref().unwrap_or("unknown")
    }

    /// The full byte sequence: peeked bytes first, then the live remainder.
    pub fn into_reader(self) -> ByteReader {
        let rest = self.rest.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        Box::new(Cursor::new(self.peek).chain(rest))
    }
}

impl std::fmt::Debug for BufferedStreamSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedStreamSummary")
            .field("uri", &self.uri)
            .field("file_name", &self.file_name)
            .field("detected_mime_type", &self.detected_mime_type)
            .field("peeked", &self.peek.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_is_replayed_exactly_once() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let summary =
            BufferedStreamSummary::buffer("mem://x", "x.bin", OpenStream::from_bytes(data.clone()), 100)
                .unwrap();
        assert_eq!(summary.peek().len(), 100);

        let mut replayed = Vec::new();
        summary.into_reader().read_to_end(&mut replayed).unwrap();
        assert_eq!(replayed, data);
    }

    #[test]
    fn short_streams_are_fully_peeked() {
        let summary = BufferedStreamSummary::buffer(
            "mem://x",
            "x.txt",
            OpenStream::from_bytes(b"[1,2]".to_vec()),
            1024,
        )
        .unwrap();
        assert_eq!(summary.peek(), b"[1,2]");
        assert_eq!(summary.detected_mime_type, Some(sniff::MIME_JSON));
    }

    #[test]
    fn summaries_can_be_shared_across_await_points() {
        fn shareable<T: Send + Sync>() {}
        shareable::<BufferedStreamSummary>();
    }

    #[test]
    fn detection_ignores_names_and_reported_type() {
        let gz = vec![0x1f, 0x8b, 0x08, 0x00, 0x00];
        let open = OpenStream::from_bytes(gz).with_reported_mime(Some("application/json".into()));
        let summary = BufferedStreamSummary::buffer("mem://a.json", "a.json", open, 64).unwrap();
        assert_eq!(summary.detected_mime_type, Some(sniff::MIME_GZIP));
        assert_eq!(summary.reported(), "application/json");
    }
}
