//! Parser SPI, parser context, and the parser registry.
//!
//! A parser turns a byte stream into [`RecordContext`]s. Container parsers
//! (ZIP, TAR, gzip) instead unwrap inner streams, sniff them, and delegate
//! to the parser registered for the inner format, recursively.
//!
//! # Two phases
//!
//! 1. [`Parser::inspect`] looks at a [`BufferedStreamSummary`], asks the
//!    prompt callback for anything it cannot decide alone, and returns the
//!    supported update methods together with a [`ParserContext`] holding
//!    every resolved setting.
//! 2. [`Parser::transforms`] rebuilds the record pipeline from that context
//!    alone, any number of times, without prompting.
//!
//! Contexts are values: `inspect` takes one and returns a new one. Container
//! parsers nest the inner parser's context under [`ParserContext::inner`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use stream_harness_core::models::{RecordContext, UpdateMethod};
use stream_harness_core::prompt::{ConfigSection, Parameter, ParameterKind, ParameterOption};
use stream_harness_core::sniff::MIME_TEXT;

use crate::error::{HarnessError, Result};
use crate::prompt::Prompter;
use crate::stream::{BufferedStreamSummary, ByteReader};

pub mod archive;
pub mod avro;
pub mod csv;
pub mod gzip;
pub mod json;
pub mod tar;
pub mod zip;

/// A lazily evaluated sequence of parsed records.
pub type RecordIter = Box<dyn Iterator<Item = Result<RecordContext>> + Send>;

/// Resolved, parser-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParserContext {
    #[serde(default)]
    pub settings: Map<String, Value>,
    /// Selection for the content inside a container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<InnerSelection>>,
}

/// The parser chosen for a container's inner entries and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerSelection {
    #[serde(rename = "innerFileMimeType")]
    pub mime_type: String,
    #[serde(rename = "innerFileConfiguration", default)]
    pub context: ParserContext,
}

impl ParserContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    pub fn with_setting(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }

    pub fn with_inner(mut self, mime_type: impl Into<String>, context: ParserContext) -> Self {
        self.inner = Some(Box::new(InnerSelection {
            mime_type: mime_type.into(),
            context,
        }));
        self
    }

    /// The cached inner context when it was resolved for `mime_type`.
    pub fn inner_context_for(&self, mime_type: &str) -> ParserContext {
        self.inner
            .as_ref()
            .filter(|inner| inner.mime_type == mime_type)
            .map(|inner| inner.context.clone())
            .unwrap_or_default()
    }
}

/// Outcome of [`Parser::inspect`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParserInspection {
    pub update_methods: Vec<UpdateMethod>,
    pub context: ParserContext,
}

/// What a parser may use while inspecting.
pub struct InspectEnv<'a> {
    pub parsers: &'a Arc<ParserRegistry>,
    pub prompter: &'a dyn Prompter,
    pub peek_bytes: usize,
}

impl InspectEnv<'_> {
    /// Ask a single question and return the answer (or its default).
    pub async fn ask(&self, parameter: Parameter) -> Result<Option<Value>> {
        let answers = self
            .prompter
            .prompt(std::slice::from_ref(&parameter))
            .await?;
        Ok(parameter.answer_from(&answers))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parser Trait
// ═══════════════════════════════════════════════════════════════════════

/// A format-specific parser.
#[async_trait]
pub trait Parser: Send + Sync {
    /// MIME type this parser is registered under.
    fn mime_type(&self) -> &'static str;

    /// Extensions conventionally used by the format (advisory only).
    fn file_extensions(&self) -> &'static [&'static str];

    /// Name shown in manual parser selection menus.
    fn display_name(&self) -> &'static str;

    /// Resolve settings for `summary`, prompting if needed. Settings already
    /// present in `context` are reused without prompting.
    async fn inspect(
        &self,
        summary: BufferedStreamSummary,
        context: ParserContext,
        env: &InspectEnv<'_>,
    ) -> Result<ParserInspection>;

    /// Build the record pipeline over `reader`. `slug_prefix` is the file
    /// name the records came from. Runs on a blocking thread.
    fn transforms(
        &self,
        slug_prefix: &str,
        context: &ParserContext,
        reader: ByteReader,
        parsers: &Arc<ParserRegistry>,
    ) -> Result<RecordIter>;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Parsers keyed by MIME type. Built once at startup and shared read-only.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn Parser>>,
}

impl ParserRegistry {
    /// Create an empty parser registry.
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Create a registry with every built-in parser.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(json::JsonParser));
        registry.register(Box::new(json::NdjsonParser));
        registry.register(Box::new(csv::CsvParser));
        registry.register(Box::new(avro::AvroParser));
        registry.register(Box::new(zip::ZipParser));
        registry.register(Box::new(tar::TarParser));
        registry.register(Box::new(gzip::GzipParser));
        registry
    }

    /// Register a parser. A later registration for the same MIME type
    /// shadows the earlier one.
    pub fn register(&mut self, parser: Box<dyn Parser>) {
        self.parsers.retain(|p| p.mime_type() != parser.mime_type());
        self.parsers.push(Arc::from(parser));
    }

    pub fn by_mime_type(&self, mime: &str) -> Option<Arc<dyn Parser>> {
        self.parsers
            .iter()
            .find(|p| p.mime_type().eq_ignore_ascii_case(mime))
            .cloned()
    }

    /// Parser for a sniffed peek buffer.
    pub fn by_content(&self, peek: &[u8]) -> Option<Arc<dyn Parser>> {
        stream_harness_core::sniff::detect(peek).and_then(|mime| self.by_mime_type(mime))
    }

    pub fn all(&self) -> &[Arc<dyn Parser>] {
        &self.parsers
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the manual parser choice parameter.
pub const PARSER_CHOICE: &str = "parserMimeType";

/// Pick the parser for `summary` from its sniffed type.
///
/// When sniffing found nothing a parser is registered for (unknown bytes,
/// plain text, or a known format without a parser), `manual_choice` is
/// used; without one the caller is asked to choose and the choice is
/// returned for persisting. An unanswered question is `FormatUndetectable`
/// for unknown or plain-text content and `ParserNotFound` otherwise.
pub async fn select_parser(
    env: &InspectEnv<'_>,
    summary: &BufferedStreamSummary,
    manual_choice: Option<&str>,
) -> Result<(Arc<dyn Parser>, Option<String>)> {
    let by_mime = |mime: &str| {
        env.parsers
            .by_mime_type(mime)
            .ok_or_else(|| HarnessError::ParserNotFound {
                mime: mime.to_string(),
                name: summary.file_name.clone(),
            })
    };

    let detected = summary.detected_mime_type;
    if let Some(parser) = detected.and_then(|mime| env.parsers.by_mime_type(mime)) {
        return Ok((parser, None));
    }
    if let Some(choice) = manual_choice {
        return Ok((by_mime(choice)?, None));
    }

    let detected_label = detected.unwrap_or("unknown");
    tracing::info!(
        stream = %summary.file_name,
        detected = detected_label,
        reported = %summary.reported(),
        "no parser for the detected format, asking for one"
    );
    let options = env
        .parsers
        .all()
        .iter()
        .map(|p| ParameterOption::new(p.display_name(), p.mime_type()))
        .collect();
    let parameter = Parameter::new(
        PARSER_CHOICE,
        format!(
            "No parser for {} (detected as {}, reported as {}). Which parser should read it?",
            summary.file_name,
            detected_label,
            summary.reported()
        ),
        ParameterKind::Select,
        ConfigSection::Inspection,
    )
    .with_options(options);

    let choice = env
        .ask(parameter)
        .await?
        .and_then(|v| v.as_str().map(str::to_string));
    match (choice, detected) {
        (Some(choice), _) => Ok((by_mime(&choice)?, Some(choice))),
        (None, Some(mime)) if mime != MIME_TEXT => Err(HarnessError::ParserNotFound {
            mime: mime.to_string(),
            name: summary.file_name.clone(),
        }),
        (None, _) => Err(HarnessError::FormatUndetectable {
            name: summary.file_name.clone(),
            reported: summary.reported().to_string(),
        }),
    }
}
