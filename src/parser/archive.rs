//! Shared machinery for container parsers.
//!
//! # Streaming entries
//!
//! Archive decoders borrow the underlying reader for the lifetime of each
//! entry, which does not fit a pull-based iterator of owned readers. A pump
//! thread owns the decoder instead and hands entries over channels:
//!
//! ```text
//!   ByteReader ──► pump thread (zip / tar decoder)
//!                     │ entry header   (rendezvous, one at a time)
//!                     ▼
//!               ArchiveEntries::next() ──► ArchiveEntry { name, reader }
//!                     ▲                                   │
//!                     └──────── chunk channel ◄───────────┘
//! ```
//!
//! The pump only decodes the next header once the consumer asks for it, so
//! entries are never pre-materialized. An entry's reader must be exhausted
//! or dropped before the next entry is requested. Dropping a reader early
//! makes the pump skip the rest of that entry when the next one is asked
//! for. Dropping [`ArchiveEntries`] cancels the source: reads of the
//! underlying stream fail from then on, so the pump stops without draining
//! the transport.
//!
//! # Nested containers
//!
//! The file name filter selects leaf entries. An entry whose content is
//! itself a container is selected whatever its name and the filter is
//! passed down to it, so `fileNameFilter=a\.json` on `outer.zip` reaches
//! `outer.zip/inner.tar/a.json` with a single question. A container picked
//! by its own name is read whole.

use regex::Regex;
use serde_json::Value;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use stream_harness_core::prompt::{ConfigSection, Parameter, ParameterKind};
use stream_harness_core::sniff::{MIME_GZIP, MIME_TAR, MIME_ZIP};

use super::{select_parser, InspectEnv, Parser, ParserContext, ParserInspection, ParserRegistry, RecordIter};
use crate::error::{HarnessError, Result};
use crate::stream::{BufferedStreamSummary, ByteReader, OpenStream};

/// Setting: regular expression an entry path must fully match.
pub const FILE_NAME_FILTER: &str = "fileNameFilter";

const CHUNK_SIZE: usize = 64 * 1024;
const CHUNK_QUEUE: usize = 4;
/// Enough to sniff every container signature (tar's sits at 257).
const CONTAINER_PEEK: usize = 512;

/// Whether `mime` is a format whose parser unwraps other streams.
pub fn is_container(mime: &str) -> bool {
    matches!(mime, MIME_ZIP | MIME_TAR | MIME_GZIP)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveKind::Zip => write!(f, "zip"),
            ArchiveKind::Tar => write!(f, "tar"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Entry pump
// ═══════════════════════════════════════════════════════════════════════

type Chunk = io::Result<Vec<u8>>;

struct PumpedEntry {
    name: String,
    size: Option<u64>,
    chunks: Receiver<Chunk>,
}

/// One regular-file entry of an archive.
pub struct ArchiveEntry {
    /// Path inside the archive.
    pub name: String,
    pub size: Option<u64>,
    pub reader: ChannelReader,
}

/// Pull-based iterator over the regular-file entries of an archive.
pub struct ArchiveEntries {
    container: String,
    demand: SyncSender<()>,
    entries: Receiver<io::Result<PumpedEntry>>,
}

impl ArchiveEntries {
    /// Start decoding `reader` on a pump thread.
    pub fn spawn(kind: ArchiveKind, container: &str, reader: ByteReader) -> Result<Self> {
        let (demand_tx, demand_rx) = sync_channel(0);
        let (entries_tx, entries_rx) = sync_channel(0);
        let link = PumpLink {
            demand: demand_rx,
            entries: entries_tx,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        std::thread::Builder::new()
            .name(format!("{}-entries", kind))
            .spawn(move || match kind {
                ArchiveKind::Zip => pump_zip(reader, link),
                ArchiveKind::Tar => pump_tar(reader, link),
            })
            .map_err(|e| HarnessError::connection(container, e))?;
        Ok(Self {
            container: container.to_string(),
            demand: demand_tx,
            entries: entries_rx,
        })
    }
}

impl Iterator for ArchiveEntries {
    type Item = Result<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        // the pump has finished once nobody takes the demand
        if self.demand.send(()).is_err() {
            return None;
        }
        match self.entries.recv() {
            Ok(Ok(entry)) => Some(Ok(ArchiveEntry {
                name: entry.name,
                size: entry.size,
                reader: ChannelReader::new(entry.chunks),
            })),
            Ok(Err(e)) => Some(Err(HarnessError::parse(&self.container, e))),
            Err(_) => None,
        }
    }
}

/// The source stream of a pump. Every read fails once the consumer has
/// gone away.
struct CancellableReader {
    inner: ByteReader,
    cancelled: Arc<AtomicBool>,
}

impl Read for CancellableReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancelled.load(Ordering::Acquire) {
            // not Interrupted: io::copy would retry that forever
            return Err(io::Error::other("archive read cancelled"));
        }
        self.inner.read(buf)
    }
}

/// The pump thread's ends of the channels.
struct PumpLink {
    demand: Receiver<()>,
    entries: SyncSender<io::Result<PumpedEntry>>,
    cancelled: Arc<AtomicBool>,
}

impl PumpLink {
    fn guard(&self, reader: ByteReader) -> CancellableReader {
        CancellableReader {
            inner: reader,
            cancelled: self.cancelled.clone(),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Block until the consumer asks for another entry. `false`, with the
    /// source cancelled, once it has gone away.
    fn wait_for_demand(&self) -> bool {
        if self.demand.recv().is_ok() {
            return true;
        }
        self.cancel();
        false
    }

    fn fail(&self, err: io::Error) {
        let _ = self.entries.send(Err(err));
    }

    /// Hand one entry to the consumer and stream its bytes. Returns `false`
    /// once the consumer is gone.
    fn forward(&self, name: String, size: Option<u64>, body: &mut impl Read) -> bool {
        let (chunk_tx, chunk_rx) = sync_channel(CHUNK_QUEUE);
        let entry = PumpedEntry {
            name,
            size,
            chunks: chunk_rx,
        };
        if self.entries.send(Ok(entry)).is_err() {
            self.cancel();
            return false;
        }

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    // reader dropped: the rest is skipped on the next demand
                    if chunk_tx.send(Ok(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = chunk_tx.send(Err(e));
                    break;
                }
            }
        }
        true
    }
}

fn pump_zip(reader: ByteReader, link: PumpLink) {
    let mut reader = link.guard(reader);
    if !link.wait_for_demand() {
        return;
    }
    loop {
        match ::zip::read::read_zipfile_from_stream(&mut reader) {
            Ok(Some(mut file)) => {
                if file.is_dir() {
                    continue;
                }
                let name = file.name().to_string();
                let size = Some(file.size());
                if !link.forward(name, size, &mut file) {
                    return;
                }
                // dropping `file` reads past the rest of the entry, so it
                // stays alive until the consumer wants more or is gone
                if !link.wait_for_demand() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                link.fail(io::Error::other(e));
                return;
            }
        }
    }
}

fn pump_tar(reader: ByteReader, link: PumpLink) {
    let mut archive = ::tar::Archive::new(link.guard(reader));
    if !link.wait_for_demand() {
        return;
    }
    let iter = match archive.entries() {
        Ok(iter) => iter,
        Err(e) => {
            link.fail(e);
            return;
        }
    };
    for entry in iter {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                link.fail(e);
                return;
            }
        };
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = match entry.path() {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                link.fail(e);
                return;
            }
        };
        let size = Some(entry.size());
        if !link.forward(name, size, &mut entry) {
            return;
        }
        // the next header is only read once the consumer asks for it
        if !link.wait_for_demand() {
            return;
        }
    }
}

/// Blocking reader over the chunks of one archive entry.
pub struct ChannelReader {
    chunks: Receiver<Chunk>,
    buf: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(chunks: Receiver<Chunk>) -> Self {
        Self {
            chunks,
            buf: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buf.len() {
            match self.chunks.recv() {
                Ok(Ok(chunk)) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Entry filter
// ═══════════════════════════════════════════════════════════════════════

/// Compiled `fileNameFilter`. Matches the whole entry path or its base name.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    source: String,
    regex: Regex,
}

impl EntryFilter {
    pub fn new(container: &str, source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| {
            HarnessError::InvalidParserSetting {
                name: container.to_string(),
                setting: FILE_NAME_FILTER.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    fn from_context(container: &str, context: &ParserContext) -> Result<Self> {
        Self::new(container, context.get_str(FILE_NAME_FILTER).unwrap_or(".*"))
    }

    pub fn matches(&self, entry_name: &str) -> bool {
        self.regex.is_match(entry_name)
            || self
                .regex
                .is_match(stream_harness_core::slug::base_name(entry_name))
    }

    fn no_match(&self, container: &str) -> HarnessError {
        HarnessError::NoMatchingContainerEntry {
            container: container.to_string(),
            filter: self.source.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Inspection
// ═══════════════════════════════════════════════════════════════════════

/// Resolve the parser for a container's inner content and inspect it.
///
/// The returned context is `context` with the inner MIME type and the inner
/// parser's resolved context nested under it. Update methods are the inner
/// parser's. When the inner content is a container too, `passed_filter`
/// becomes its file name filter unless one is already recorded.
pub(crate) async fn inspect_inner(
    inner: BufferedStreamSummary,
    context: ParserContext,
    passed_filter: Option<&str>,
    env: &InspectEnv<'_>,
) -> Result<ParserInspection> {
    let manual = context.inner.as_ref().map(|i| i.mime_type.clone());
    let (parser, _) = select_parser(env, &inner, manual.as_deref()).await?;
    tracing::debug!(
        entry = %inner.file_name,
        parser = parser.mime_type(),
        "inner parser selected"
    );

    let mut inner_context = context.inner_context_for(parser.mime_type());
    if let Some(filter) = passed_filter {
        if is_container(parser.mime_type()) && inner_context.get_str(FILE_NAME_FILTER).is_none() {
            inner_context = inner_context.with_setting(FILE_NAME_FILTER, filter);
        }
    }
    let inspection = parser.inspect(inner, inner_context, env).await?;
    Ok(ParserInspection {
        update_methods: inspection.update_methods,
        context: context.with_inner(parser.mime_type(), inspection.context),
    })
}

/// An archive entry chosen for reading, with the filter its content
/// inherits if it turns out to be a container.
struct Selected {
    entry: BufferedStreamSummary,
    passed_filter: String,
}

/// Inspect a ZIP or TAR container: resolve the entry filter, then inspect
/// the first selected entry recursively.
pub(crate) async fn inspect_archive(
    kind: ArchiveKind,
    summary: BufferedStreamSummary,
    context: ParserContext,
    env: &InspectEnv<'_>,
) -> Result<ParserInspection> {
    let mut context = context;
    if context.get_str(FILE_NAME_FILTER).is_none() {
        let parameter = Parameter::new(
            FILE_NAME_FILTER,
            format!(
                "Regular expression selecting the files to read inside {}",
                summary.file_name
            ),
            ParameterKind::Regex,
            ConfigSection::Parser,
        )
        .with_default(".*");
        let filter = env
            .ask(parameter)
            .await?
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .unwrap_or_else(|| ".*".to_string());
        context = context.with_setting(FILE_NAME_FILTER, filter);
    }

    let container = summary.file_name.clone();
    let filter = EntryFilter::from_context(&container, &context)?;
    let uri = summary.uri.clone();
    let peek_bytes = env.peek_bytes;
    let entries = ArchiveEntries::spawn(kind, &container, summary.into_reader())?;

    let scan_filter = filter.clone();
    let (entries, first) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut entries = entries;
        let first = loop {
            let Some(entry) = entries.next() else {
                break None;
            };
            let entry = entry?;
            let named = scan_filter.matches(&entry.name);
            let cap = if named {
                peek_bytes
            } else {
                CONTAINER_PEEK.min(peek_bytes)
            };
            let open = OpenStream::new(Box::new(entry.reader)).with_size(entry.size);
            let buffered = BufferedStreamSummary::buffer(
                format!("{}#{}", uri, entry.name),
                entry.name,
                open,
                cap,
            )?;
            if named {
                break Some(Selected {
                    entry: buffered,
                    passed_filter: ".*".to_string(),
                });
            }
            if buffered.detected_mime_type.is_some_and(is_container) {
                break Some(Selected {
                    entry: buffered,
                    passed_filter: scan_filter.source.clone(),
                });
            }
            tracing::trace!(entry = %buffered.file_name, "container entry filtered out");
        };
        Ok((entries, first))
    })
    .await
    .map_err(|e| HarnessError::connection(&container, e))??;

    let first = first.ok_or_else(|| filter.no_match(&container))?;
    tracing::debug!(
        container = %container,
        entry = %first.entry.file_name,
        "inspecting first selected container entry"
    );
    let inspection = inspect_inner(first.entry, context, Some(&first.passed_filter), env).await;
    drop(entries);
    inspection
}

// ═══════════════════════════════════════════════════════════════════════
// Transforms
// ═══════════════════════════════════════════════════════════════════════

/// The inner parser recorded by a previous inspection.
pub(crate) fn inner_parser(
    container: &str,
    context: &ParserContext,
    parsers: &Arc<ParserRegistry>,
) -> Result<(Arc<dyn Parser>, ParserContext)> {
    let inner = context
        .inner
        .as_ref()
        .ok_or_else(|| HarnessError::InvalidParserSetting {
            name: container.to_string(),
            setting: "innerFileMimeType".to_string(),
            message: "container has not been inspected".to_string(),
        })?;
    let parser = parsers
        .by_mime_type(&inner.mime_type)
        .ok_or_else(|| HarnessError::ParserNotFound {
            mime: inner.mime_type.clone(),
            name: container.to_string(),
        })?;
    Ok((parser, inner.context.clone()))
}

/// Records of every selected entry, in archive order, each parsed by the
/// inner parser under its own entry name.
///
/// With a leaf inner parser the entries whose names match the filter are
/// read. With a container inner parser only entries of that container type
/// are read: those matching by name, and, when the filter was passed down,
/// every one of them.
pub(crate) fn archive_records(
    kind: ArchiveKind,
    container: &str,
    context: &ParserContext,
    reader: ByteReader,
    parsers: &Arc<ParserRegistry>,
) -> Result<RecordIter> {
    let filter = EntryFilter::from_context(container, context)?;
    let (parser, inner_context) = inner_parser(container, context, parsers)?;
    let entries = ArchiveEntries::spawn(kind, container, reader)?;
    let descend = is_container(parser.mime_type())
        && inner_context.get_str(FILE_NAME_FILTER) == Some(filter.source.as_str());
    Ok(Box::new(EntryRecords {
        container: container.to_string(),
        entries,
        filter,
        descend,
        parser,
        context: inner_context,
        parsers: parsers.clone(),
        current: None,
        matched: false,
        done: false,
    }))
}

struct EntryRecords {
    container: String,
    entries: ArchiveEntries,
    filter: EntryFilter,
    /// Nested containers are read whatever their names.
    descend: bool,
    parser: Arc<dyn Parser>,
    context: ParserContext,
    parsers: Arc<ParserRegistry>,
    current: Option<RecordIter>,
    matched: bool,
    done: bool,
}

impl EntryRecords {
    /// The entry's bytes if it is to be read.
    fn select(&self, entry: ArchiveEntry) -> Result<Option<ByteReader>> {
        let named = self.filter.matches(&entry.name);
        if !is_container(self.parser.mime_type()) {
            return Ok(named.then(|| Box::new(entry.reader) as ByteReader));
        }
        if !named && !self.descend {
            return Ok(None);
        }
        let open = OpenStream::new(Box::new(entry.reader)).with_size(entry.size);
        let buffered = BufferedStreamSummary::buffer(
            format!("{}#{}", self.container, entry.name),
            entry.name,
            open,
            CONTAINER_PEEK,
        )?;
        if buffered.detected_mime_type != Some(self.parser.mime_type()) {
            tracing::trace!(entry = %buffered.file_name, "entry is not a nested container, skipped");
            return Ok(None);
        }
        Ok(Some(buffered.into_reader()))
    }
}

impl Iterator for EntryRecords {
    type Item = Result<stream_harness_core::models::RecordContext>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = self.current.as_mut() {
                if let Some(record) = current.next() {
                    return Some(record);
                }
            }
            // release the finished entry's reader before the pump moves on
            self.current = None;
            if self.done {
                return None;
            }

            match self.entries.next() {
                None => {
                    self.done = true;
                    if !self.matched {
                        return Some(Err(self.filter.no_match(&self.container)));
                    }
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(entry)) => {
                    let name = entry.name.clone();
                    let reader = match self.select(entry) {
                        Ok(Some(reader)) => reader,
                        Ok(None) => continue,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    };
                    self.matched = true;
                    match self
                        .parser
                        .transforms(&name, &self.context, reader, &self.parsers)
                    {
                        Ok(records) => self.current = Some(records),
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }
}
