//! The stream-set orchestrator.
//!
//! Turns a URI or a [`SourceConfig`] into [`StreamSetPreview`]s: resolves
//! the adapter, fills in missing parameters through the prompt callback,
//! enumerates the raw streams, sniffs and inspects each one, negotiates the
//! update method per stream set, and hands back record-stream factories.
//!
//! # Phases
//!
//! ```text
//! START → RESOLVING_PARAMETERS → ENUMERATING → SNIFFING(stream i)
//!       → PARSER_SELECTED → UPDATE_METHOD_RESOLVED → READY
//!                 ▲    │
//!                 └────┘ containers recurse into SNIFFING for their entries
//! ```
//!
//! Every choice made along the way (parameters, manual parser, parser
//! settings, update method) is written into the returned
//! [`Inspection::config`]. Inspecting again with that config asks nothing.
//!
//! # Reading
//!
//! [`StreamSummary::open_stream`] reopens the transport and runs the parser
//! pipeline on a blocking thread, feeding a bounded channel. Dropping the
//! [`RecordStream`] closes the channel, which stops the pipeline and
//! releases the transport.

use chrono::Utc;
use futures_util::Stream;
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use stream_harness_core::models::{HashStatus, RawStreamHandle, RecordContext, ResumeState, UpdateMethod};
use stream_harness_core::prompt::{ConfigSection, Parameter, ParameterKind, ParameterOption};
use stream_harness_core::slug::common_slug;

use crate::config::{Config, InspectionSettings, SourceConfig};
use crate::error::{HarnessError, Result};
use crate::parser::{select_parser, InspectEnv, Parser, ParserContext, ParserRegistry};
use crate::prompt::Prompter;
use crate::stream::BufferedStreamSummary;
use crate::traits::{ConnectorRegistry, SourceAdapter};

/// Name of the update-method choice parameter.
pub const UPDATE_METHOD_CHOICE: &str = "updateMethod";

// ═══════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of an inspection: the previews plus the configuration with
/// every choice made during the inspection recorded.
pub struct Inspection {
    pub previews: Vec<StreamSetPreview>,
    pub config: SourceConfig,
}

/// One set of streams sharing a schema.
pub struct StreamSetPreview {
    /// Derived from the file names shared by the set's streams.
    pub slug: String,
    /// Set-level change token; `None` when any member has no hash.
    pub update_hash: Option<String>,
    /// Sum of the known stream sizes.
    pub expected_bytes_total: u64,
    pub streams: StreamSet,
}

pub enum StreamSet {
    /// Every stream inspected up front.
    Finite(Vec<StreamSummary>),
    /// Streams inspected one at a time on demand.
    Lazy(StreamCursor),
}

impl StreamSetPreview {
    pub fn is_lazy(&self) -> bool {
        matches!(self.streams, StreamSet::Lazy(_))
    }

    /// The eagerly inspected streams; empty for lazy sets.
    pub fn summaries(&self) -> &[StreamSummary] {
        match &self.streams {
            StreamSet::Finite(summaries) => summaries,
            StreamSet::Lazy(_) => &[],
        }
    }
}

/// An inspected stream, ready to be opened any number of times.
#[derive(Clone)]
pub struct StreamSummary {
    pub uri: String,
    pub file_name: String,
    pub detected_mime_type: Option<&'static str>,
    pub parser_mime_type: &'static str,
    pub update_method: UpdateMethod,
    pub file_size: Option<u64>,
    pub last_updated_hash: Option<String>,
    pub hash_status: HashStatus,
    handle: RawStreamHandle,
    parser: Arc<dyn Parser>,
    context: ParserContext,
    factory: StreamFactory,
}

impl std::fmt::Debug for StreamSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSummary")
            .field("uri", &self.uri)
            .field("file_name", &self.file_name)
            .field("parser_mime_type", &self.parser_mime_type)
            .field("update_method", &self.update_method)
            .field("last_updated_hash", &self.last_updated_hash)
            .finish_non_exhaustive()
    }
}

impl StreamSummary {
    /// Open a live record stream.
    ///
    /// The transport always restarts at byte zero; `resume` skips the
    /// records a previous read already delivered.
    pub async fn open_stream(&self, resume: Option<ResumeState>) -> Result<RecordStream> {
        let factory = &self.factory;
        let open = factory.adapter.open(&factory.source, &self.handle).await?;
        tracing::debug!(uri = %self.uri, parser = self.parser_mime_type, "record pipeline starting");

        let (tx, rx) = mpsc::channel(factory.settings.record_channel_capacity.max(1));
        let parser = self.parser.clone();
        let context = self.context.clone();
        let parsers = factory.parsers.clone();
        let file_name = self.file_name.clone();
        let uri = self.uri.clone();
        let stamp = self.update_method == UpdateMethod::Continuous;
        let skip = resume.map(|r| r.records_delivered).unwrap_or(0);

        tokio::task::spawn_blocking(move || {
            let records = match parser.transforms(&file_name, &context, open.reader, &parsers) {
                Ok(records) => records,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            for item in records.skip(usize::try_from(skip).unwrap_or(usize::MAX)) {
                let failed = item.is_err();
                let item = item.map(|mut record| {
                    if stamp {
                        record.received_at = Some(Utc::now());
                    }
                    record
                });
                if tx.blocking_send(item).is_err() {
                    tracing::debug!(uri = %uri, "record consumer closed, pipeline cancelled");
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        Ok(RecordStream { rx })
    }
}

/// Live records of one stream, in source byte order. Ends after the first
/// error.
pub struct RecordStream {
    rx: mpsc::Receiver<Result<RecordContext>>,
}

impl RecordStream {
    pub async fn next(&mut self) -> Option<Result<RecordContext>> {
        self.rx.recv().await
    }

    /// Drain the stream into memory.
    pub async fn collect(mut self) -> Result<Vec<RecordContext>> {
        let mut records = Vec::new();
        while let Some(record) = self.rx.recv().await {
            records.push(record?);
        }
        Ok(records)
    }
}

impl Stream for RecordStream {
    type Item = Result<RecordContext>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Pull-based iterator over the streams of a large set. Each call opens,
/// sniffs, and inspects one more stream, reusing the settings resolved for
/// the first one. Streams those settings cannot cover (an undetectable
/// format, say) go through the prompter passed to
/// [`move_to_next_stream`](Self::move_to_next_stream); the answers land in
/// [`config`](Self::config).
pub struct StreamCursor {
    first: Option<StreamSummary>,
    pending: VecDeque<RawStreamHandle>,
    config: SourceConfig,
    update_method: UpdateMethod,
    factory: StreamFactory,
}

impl StreamCursor {
    /// The next stream, or `None` when the set is exhausted.
    ///
    /// A stream that cannot be read with the update method negotiated for
    /// its set is [`HarnessError::UnsupportedUpdateMethod`].
    pub async fn move_to_next_stream(
        &mut self,
        prompter: &dyn Prompter,
    ) -> Option<Result<StreamSummary>> {
        if let Some(first) = self.first.take() {
            return Some(Ok(first));
        }
        let handle = self.pending.pop_front()?;
        Some(self.inspect_next(handle, prompter).await)
    }

    async fn inspect_next(
        &mut self,
        handle: RawStreamHandle,
        prompter: &dyn Prompter,
    ) -> Result<StreamSummary> {
        let stream = self
            .factory
            .inspect_handle(handle, &mut self.config, prompter)
            .await?;
        if !stream.methods.contains(&self.update_method) {
            return Err(HarnessError::UnsupportedUpdateMethod {
                name: stream.handle.file_name.clone(),
                method: self.update_method.to_string(),
            });
        }
        Ok(self.factory.summary(stream, self.update_method))
    }

    /// The source configuration, including choices made while iterating.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Streams not yet returned.
    pub fn remaining(&self) -> usize {
        self.pending.len() + usize::from(self.first.is_some())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Per-stream inspection
// ═══════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct StreamFactory {
    adapter: Arc<dyn SourceAdapter>,
    /// Source configuration after parameter resolution.
    source: Arc<SourceConfig>,
    parsers: Arc<ParserRegistry>,
    settings: InspectionSettings,
}

struct InspectedStream {
    /// Enumeration metadata refreshed from the open.
    handle: RawStreamHandle,
    detected_mime_type: Option<&'static str>,
    parser: Arc<dyn Parser>,
    context: ParserContext,
    methods: Vec<UpdateMethod>,
}

impl StreamFactory {
    /// SNIFFING → PARSER_SELECTED for one stream. Resolved parser settings
    /// and a manual parser choice are recorded in `config`.
    async fn inspect_handle(
        &self,
        handle: RawStreamHandle,
        config: &mut SourceConfig,
        prompter: &dyn Prompter,
    ) -> Result<InspectedStream> {
        tracing::debug!(phase = "sniffing", uri = %handle.uri, "opening stream for inspection");
        let open = self.adapter.open(&self.source, &handle).await?;
        let summary =
            BufferedStreamSummary::from_handle(&handle, open, self.settings.peek_bytes).await?;

        let env = InspectEnv {
            parsers: &self.parsers,
            prompter,
            peek_bytes: self.settings.peek_bytes,
        };
        let (parser, chosen) = select_parser(&env, &summary, config.parser_override.as_deref())
            .await
            .map_err(|e| e.for_uri(&handle.uri))?;
        if let Some(choice) = chosen {
            config.parser_override = Some(choice);
        }
        tracing::info!(
            phase = "parser_selected",
            uri = %handle.uri,
            detected = summary.detected_mime_type.unwrap_or("unknown"),
            parser = parser.mime_type(),
            "parser selected"
        );

        let mut handle = handle;
        handle.file_size = summary.file_size;
        handle.reported_mime_type = summary.reported_mime_type.clone();
        if summary.last_updated_hash != handle.last_updated_hash {
            let status = match handle.hash_status {
                HashStatus::Unavailable => HashStatus::Exact,
                status => status,
            };
            handle = handle.with_hash(summary.last_updated_hash.clone(), status);
        }
        let detected_mime_type = summary.detected_mime_type;

        let context = config
            .parsers
            .get(parser.mime_type())
            .cloned()
            .unwrap_or_default();
        let inspection = parser
            .inspect(summary, context, &env)
            .await
            .map_err(|e| e.for_uri(&handle.uri))?;
        config
            .parsers
            .insert(parser.mime_type().to_string(), inspection.context.clone());

        let methods = self
            .adapter
            .update_methods(&self.source)
            .unwrap_or(inspection.update_methods);

        Ok(InspectedStream {
            handle,
            detected_mime_type,
            parser,
            context: inspection.context,
            methods,
        })
    }

    fn summary(&self, stream: InspectedStream, update_method: UpdateMethod) -> StreamSummary {
        StreamSummary {
            uri: stream.handle.uri.clone(),
            file_name: stream.handle.file_name.clone(),
            detected_mime_type: stream.detected_mime_type,
            parser_mime_type: stream.parser.mime_type(),
            update_method,
            file_size: stream.handle.file_size,
            last_updated_hash: stream.handle.last_updated_hash.clone(),
            hash_status: stream.handle.hash_status,
            handle: stream.handle,
            parser: stream.parser,
            context: stream.context,
            factory: self.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Inspector
// ═══════════════════════════════════════════════════════════════════════

/// Entry point: inspects sources and produces stream-set previews.
pub struct Inspector {
    connectors: ConnectorRegistry,
    parsers: Arc<ParserRegistry>,
    settings: InspectionSettings,
}

impl Inspector {
    pub fn new(
        connectors: ConnectorRegistry,
        parsers: ParserRegistry,
        settings: InspectionSettings,
    ) -> Self {
        Self {
            connectors,
            parsers: Arc::new(parsers),
            settings,
        }
    }

    /// Every built-in adapter and parser, configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ConnectorRegistry::with_builtins(config)?,
            ParserRegistry::with_builtins(),
            config.inspection.clone(),
        ))
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn parsers(&self) -> &Arc<ParserRegistry> {
        &self.parsers
    }

    /// Inspect a bare URI.
    pub async fn inspect_uri(&self, uri: &str, prompter: &dyn Prompter) -> Result<Inspection> {
        self.inspect(SourceConfig::new("", vec![uri.to_string()]), prompter)
            .await
    }

    /// Inspect a configured source.
    pub async fn inspect(&self, source: SourceConfig, prompter: &dyn Prompter) -> Result<Inspection> {
        let (adapter, mut config) = self.connectors.resolve_config(source)?;
        let uri = config.display_uri().to_string();
        tracing::info!(phase = "resolving_parameters", uri = %uri, adapter = adapter.source_type(), "inspecting source");
        resolve_parameters(adapter.as_ref(), &mut config, prompter).await?;

        tracing::info!(phase = "enumerating", uri = %uri, "enumerating streams");
        let handles = adapter.enumerate(&config).await?;
        if handles.is_empty() {
            return Err(HarnessError::not_found(&uri));
        }

        let factory = StreamFactory {
            adapter: adapter.clone(),
            source: Arc::new(config.clone()),
            parsers: self.parsers.clone(),
            settings: self.settings.clone(),
        };

        let mut previews = Vec::new();
        for (_, members) in group_by_set(handles) {
            let preview = self
                .inspect_set(&factory, members, &mut config, prompter)
                .await?;
            previews.push(preview);
        }

        tracing::info!(phase = "ready", uri = %uri, sets = previews.len(), "inspection complete");
        Ok(Inspection { previews, config })
    }

    async fn inspect_set(
        &self,
        factory: &StreamFactory,
        members: Vec<RawStreamHandle>,
        config: &mut SourceConfig,
        prompter: &dyn Prompter,
    ) -> Result<StreamSetPreview> {
        let names: Vec<&str> = members.iter().map(|h| h.file_name.as_str()).collect();
        let slug = common_slug(&names);

        if members.len() > self.settings.max_eager_streams {
            let update_hash = set_update_hash(members.iter().map(|h| h.last_updated_hash.as_deref()));
            let mut pending: VecDeque<RawStreamHandle> = members.into();
            let Some(first) = pending.pop_front() else {
                return Err(HarnessError::not_found(config.display_uri()));
            };
            let first = factory.inspect_handle(first, config, prompter).await?;
            let method = negotiate_update_method(&slug, &first.methods, config, prompter).await?;
            tracing::info!(
                phase = "update_method_resolved",
                set = %slug,
                method = %method,
                streams = pending.len() + 1,
                "large stream set, streams will be inspected lazily"
            );
            return Ok(StreamSetPreview {
                slug,
                update_hash,
                expected_bytes_total: expected_bytes_total(&pending, &first),
                streams: StreamSet::Lazy(StreamCursor {
                    first: Some(factory.summary(first, method)),
                    pending,
                    config: config.clone(),
                    update_method: method,
                    factory: factory.clone(),
                }),
            });
        }

        let mut inspected = Vec::with_capacity(members.len());
        for handle in members {
            inspected.push(factory.inspect_handle(handle, config, prompter).await?);
        }

        let offered = common_methods(inspected.iter().map(|s| s.methods.as_slice()));
        let method = negotiate_update_method(&slug, &offered, config, prompter).await?;
        tracing::info!(phase = "update_method_resolved", set = %slug, method = %method, "update method resolved");

        let update_hash = set_update_hash(inspected.iter().map(|s| s.handle.last_updated_hash.as_deref()));
        // open-time sizes fill in what enumeration could not see
        let expected_bytes_total: u64 = inspected.iter().filter_map(|s| s.handle.file_size).sum();
        let summaries = inspected
            .into_iter()
            .map(|stream| factory.summary(stream, method))
            .collect();

        Ok(StreamSetPreview {
            slug,
            update_hash,
            expected_bytes_total,
            streams: StreamSet::Finite(summaries),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

/// Ask for what the adapter is missing until it is satisfied. A round that
/// answers nothing, or a parameter asked for again after being answered,
/// is `ConfigurationIncomplete`.
async fn resolve_parameters(
    adapter: &dyn SourceAdapter,
    config: &mut SourceConfig,
    prompter: &dyn Prompter,
) -> Result<()> {
    let mut answered: HashSet<String> = HashSet::new();
    loop {
        let missing = adapter.missing_parameters(config);
        let Some(first) = missing.first() else {
            return Ok(());
        };
        let incomplete = |parameter: &str| HarnessError::ConfigurationIncomplete {
            uri: config.display_uri().to_string(),
            parameter: parameter.to_string(),
        };
        if let Some(again) = missing.iter().find(|p| answered.contains(&p.name)) {
            return Err(incomplete(&again.name));
        }

        let answers = prompter
            .prompt(&missing)
            .await
            .map_err(|e| e.for_uri(config.display_uri()))?;
        let mut progressed = false;
        for parameter in &missing {
            let Some(value) = parameter.answer_from(&answers) else {
                continue;
            };
            if let Some(section) = config.section_mut(parameter.target) {
                section.insert(parameter.name.clone(), value);
                answered.insert(parameter.name.clone());
                progressed = true;
            }
        }
        if !progressed {
            return Err(HarnessError::ConfigurationIncomplete {
                uri: config.display_uri().to_string(),
                parameter: first.name.clone(),
            });
        }
    }
}

/// UPDATE_METHOD_RESOLVED: a single offered method is adopted silently;
/// otherwise a cached choice is reused, or the caller is asked once and the
/// answer cached under the set slug.
async fn negotiate_update_method(
    slug: &str,
    offered: &[UpdateMethod],
    config: &mut SourceConfig,
    prompter: &dyn Prompter,
) -> Result<UpdateMethod> {
    match offered {
        [] => return Ok(UpdateMethod::BatchFullSet),
        [only] => return Ok(*only),
        _ => {}
    }
    if let Some(cached) = config.update_methods.get(slug) {
        if offered.contains(cached) {
            return Ok(*cached);
        }
    }

    let default = if offered.contains(&UpdateMethod::BatchFullSet) {
        UpdateMethod::BatchFullSet
    } else {
        offered[0]
    };
    let parameter = Parameter::new(
        UPDATE_METHOD_CHOICE,
        format!("How should changes to '{}' be picked up?", slug),
        ParameterKind::Select,
        ConfigSection::Inspection,
    )
    .with_options(
        offered
            .iter()
            .map(|m| ParameterOption::new(m.label(), m.as_str()))
            .collect(),
    )
    .with_default(default.as_str());

    let answers = prompter
        .prompt(std::slice::from_ref(&parameter))
        .await
        .map_err(|e| e.for_uri(config.display_uri()))?;
    let method = parameter
        .answer_from(&answers)
        .and_then(|v| v.as_str()?.parse::<UpdateMethod>().ok())
        .unwrap_or(default);
    config.update_methods.insert(slug.to_string(), method);
    Ok(method)
}

/// Methods offered by every stream of a set, in the first stream's order.
fn common_methods<'a>(mut offers: impl Iterator<Item = &'a [UpdateMethod]>) -> Vec<UpdateMethod> {
    let Some(first) = offers.next() else {
        return Vec::new();
    };
    let mut common = first.to_vec();
    for offer in offers {
        common.retain(|m| offer.contains(m));
    }
    if common.is_empty() {
        common.push(UpdateMethod::BatchFullSet);
    }
    common
}

/// One member: its hash. Several: SHA-256 over the member hashes in order.
/// Any member without a hash: none.
fn set_update_hash<'a>(hashes: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let hashes: Vec<&str> = hashes.collect::<Option<_>>()?;
    match hashes.as_slice() {
        [] => None,
        [one] => Some(one.to_string()),
        many => {
            let mut hasher = Sha256::new();
            for hash in many {
                hasher.update(hash.as_bytes());
                hasher.update([0u8]);
            }
            Some(hex::encode(hasher.finalize()))
        }
    }
}

fn expected_bytes_total(pending: &VecDeque<RawStreamHandle>, first: &InspectedStream) -> u64 {
    pending
        .iter()
        .filter_map(|h| h.file_size)
        .chain(first.handle.file_size)
        .sum()
}

/// Group handles by `stream_set`, keeping first-seen order.
fn group_by_set(handles: Vec<RawStreamHandle>) -> Vec<(String, Vec<RawStreamHandle>)> {
    let mut groups: Vec<(String, Vec<RawStreamHandle>)> = Vec::new();
    for handle in handles {
        match groups.iter_mut().find(|(key, _)| *key == handle.stream_set) {
            Some((_, members)) => members.push(handle),
            None => groups.push((handle.stream_set.clone(), vec![handle])),
        }
    }
    groups
}
