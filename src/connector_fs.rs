//! Local filesystem adapter.
//!
//! Claims plain paths, `file://` URIs, and glob patterns. A single file is a
//! one-stream set; a directory or a glob becomes one stream set holding
//! every matching regular file, in path order.
//!
//! # Source settings
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `path` | File, directory, or glob (`data/**/*.csv`) |
//! | `follow_symlinks` | Follow symlinks while walking (default `false`) |
//!
//! The change-detection hash is the modification time (nanosecond RFC 3339)
//! joined with the file size.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use stream_harness_core::models::{HashStatus, RawStreamHandle};
use stream_harness_core::prompt::{ConfigSection, Parameter, ParameterKind};

use crate::config::SourceConfig;
use crate::error::{HarnessError, Result};
use crate::stream::OpenStream;
use crate::traits::{SourceAdapter, UriClaim};

const GLOB_META: &[char] = &['*', '?', '[', '{'];

pub struct FilesystemAdapter;

impl FilesystemAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FilesystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for FilesystemAdapter {
    fn source_type(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "Local files, directories, and glob patterns"
    }

    fn supports_uri(&self, uri: &str) -> Option<UriClaim> {
        let path = match uri.strip_prefix("file://") {
            Some(path) => path,
            None if uri.contains("://") => return None,
            None => uri,
        };
        if path.is_empty() {
            return None;
        }
        Some(UriClaim::default().source("path", path))
    }

    fn missing_parameters(&self, config: &SourceConfig) -> Vec<Parameter> {
        if config.has(ConfigSection::Source, "path") {
            return Vec::new();
        }
        vec![Parameter::new(
            "path",
            "Which file, directory, or glob pattern should be read?",
            ParameterKind::Text,
            ConfigSection::Source,
        )]
    }

    async fn enumerate(&self, config: &SourceConfig) -> Result<Vec<RawStreamHandle>> {
        let path = config
            .get_str(ConfigSection::Source, "path")
            .ok_or_else(|| HarnessError::ConfigurationIncomplete {
                uri: config.display_uri().to_string(),
                parameter: "path".to_string(),
            })?
            .to_string();
        let follow = config
            .source
            .get("follow_symlinks")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let set = config.display_uri().to_string();

        let files = tokio::task::spawn_blocking(move || list_files(&path, follow))
            .await
            .map_err(|e| HarnessError::connection(&set, e))??;

        Ok(files
            .into_iter()
            .map(|(path, meta)| {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                RawStreamHandle::new(path.to_string_lossy(), file_name)
                    .in_set(&set)
                    .with_size(Some(meta.len()))
                    .with_hash(change_hash(&meta), HashStatus::Exact)
            })
            .collect())
    }

    async fn open(&self, _config: &SourceConfig, handle: &RawStreamHandle) -> Result<OpenStream> {
        let uri = handle.uri.clone();
        tracing::debug!(uri = %uri, "opening file");
        tokio::task::spawn_blocking(move || -> Result<OpenStream> {
            let file = std::fs::File::open(&uri).map_err(|e| HarnessError::from_io(&uri, e))?;
            let meta = file.metadata().map_err(|e| HarnessError::from_io(&uri, e))?;
            Ok(OpenStream::new(Box::new(file))
                .with_size(Some(meta.len()))
                .with_hash(change_hash(&meta)))
        })
        .await
        .map_err(|e| HarnessError::connection(&handle.uri, e))?
    }
}

fn change_hash(meta: &Metadata) -> Option<String> {
    let modified: DateTime<Utc> = meta.modified().ok()?.into();
    Some(format!(
        "{}/{}",
        modified.to_rfc3339_opts(SecondsFormat::Nanos, true),
        meta.len()
    ))
}

/// Regular files named by `path`, sorted by path.
fn list_files(path: &str, follow_symlinks: bool) -> Result<Vec<(PathBuf, Metadata)>> {
    if path.contains(GLOB_META) {
        return list_glob(path, follow_symlinks);
    }

    let root = Path::new(path);
    let meta = std::fs::metadata(root).map_err(|e| HarnessError::from_io(path, e))?;
    if meta.is_file() {
        return Ok(vec![(root.to_path_buf(), meta)]);
    }

    let excludes = build_globset(&["**/.git/**", "**/node_modules/**"], path)?;
    walk(root, follow_symlinks, |p| !excludes.is_match(p), path)
}

fn list_glob(pattern: &str, follow_symlinks: bool) -> Result<Vec<(PathBuf, Metadata)>> {
    let matcher = build_globset(&[pattern], pattern)?;

    // walk from the deepest directory that has no glob characters
    let literal: Vec<&str> = pattern
        .split('/')
        .take_while(|segment| !segment.contains(GLOB_META))
        .collect();
    let root = if literal.is_empty() {
        PathBuf::from(".")
    } else if literal == [""] {
        PathBuf::from("/")
    } else {
        PathBuf::from(literal.join("/"))
    };

    let files = walk(&root, follow_symlinks, |p| matcher.is_match(p), pattern)?;
    if files.is_empty() {
        return Err(HarnessError::not_found(pattern));
    }
    Ok(files)
}

fn walk(
    root: &Path,
    follow_symlinks: bool,
    keep: impl Fn(&Path) -> bool,
    uri: &str,
) -> Result<Vec<(PathBuf, Metadata)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => HarnessError::from_io(uri, io),
            None => HarnessError::connection(uri, "filesystem loop detected"),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        // globs written as ./x match walk paths without the leading ./
        let path = entry.path();
        let relative = path.strip_prefix(".").unwrap_or(path);
        if !keep(path) && !keep(relative) {
            continue;
        }
        let meta = entry.metadata().map_err(|e| match e.into_io_error() {
            Some(io) => HarnessError::from_io(uri, io),
            None => HarnessError::connection(uri, "metadata unavailable"),
        })?;
        files.push((path.to_path_buf(), meta));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn build_globset(patterns: &[&str], uri: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| HarnessError::InvalidParserSetting {
            name: uri.to_string(),
            setting: "path".to_string(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| HarnessError::connection(uri, e))
}
