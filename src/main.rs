//! # Stream Harness CLI (`streamh`)
//!
//! Inspect a source, read its records, or sniff a file's format.
//!
//! ## Usage
//!
//! ```bash
//! streamh [--config ./streamh.toml] [--set name=value]... <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `streamh inspect <uri>` | Show the stream sets behind a source and the resolved configuration |
//! | `streamh read <uri>` | Print every record as one JSON line |
//! | `streamh sniff <file>` | Print the format detected from a file's first bytes |
//! | `streamh sources` | List the source adapters in claim order |
//! | `streamh parsers` | List the registered parsers |
//!
//! Questions the inspection cannot answer alone (credentials, JSONPath,
//! archive entry filter, update method) are answered with `--set`. A named
//! preset from the config file can stand in for the URI with `--source`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use stream_harness::config::{load_config, Config, SourceConfig};
use stream_harness::inspect::{Inspection, Inspector, StreamSet, StreamSummary};
use stream_harness::prompt::StaticPrompter;
use stream_harness::sources;
use stream_harness_core::sniff;

/// Stream Harness CLI: uniform, schema-tagged record streams from files,
/// URLs, buckets, and tables.
#[derive(Parser)]
#[command(
    name = "streamh",
    about = "Stream Harness: point at a source, get back schema-tagged records",
    version
)]
struct Cli {
    /// Path to a configuration file (TOML). Built-in defaults apply when
    /// omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer a prompt parameter, as `name=value`. Repeatable.
    #[arg(long = "set", global = true, value_parser = parse_key_val)]
    answers: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a source and print its stream sets.
    ///
    /// The resolved configuration is printed as JSON at the end; saved as a
    /// `[sources.<name>]` preset it makes the next inspection silent.
    Inspect {
        /// File path, glob, `file://`, `http(s)://`, `s3://`, `sqlite:`, or `test://` URI.
        uri: Option<String>,

        /// Use the `[sources.<name>]` preset instead of a URI.
        #[arg(long)]
        source: Option<String>,
    },

    /// Read every record of a source as JSON lines.
    Read {
        uri: Option<String>,

        #[arg(long)]
        source: Option<String>,

        /// Stop after this many records.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the format detected from a local file's first bytes.
    Sniff {
        path: PathBuf,
    },

    /// List source adapters.
    Sources,

    /// List parsers.
    Parsers,
}

/// Parse a `key=value` pair for `--set` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn source_config(cfg: &Config, uri: Option<String>, source: Option<String>) -> Result<SourceConfig> {
    match (uri, source) {
        (_, Some(name)) => cfg
            .sources
            .get(&name)
            .cloned()
            .with_context(|| format!("no [sources.{}] preset in the configuration", name)),
        (Some(uri), None) => Ok(SourceConfig::new("", vec![uri])),
        (None, None) => bail!("either a URI or --source <name> is required"),
    }
}

async fn run_inspect(inspector: &Inspector, source: SourceConfig, prompter: &StaticPrompter) -> Result<()> {
    let uri = source.display_uri().to_string();
    let Inspection { previews, config } = inspector
        .inspect(source, prompter)
        .await
        .with_context(|| format!("inspecting {}", uri))?;

    for preview in previews {
        println!(
            "{}  ({} bytes, hash {})",
            preview.slug,
            preview.expected_bytes_total,
            preview.update_hash.as_deref().unwrap_or("none")
        );
        match preview.streams {
            StreamSet::Finite(summaries) => {
                for summary in &summaries {
                    print_summary(summary);
                }
            }
            StreamSet::Lazy(cursor) => {
                println!("  {} streams, inspected on read", cursor.remaining());
            }
        }
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn print_summary(summary: &StreamSummary) {
    println!(
        "  {:<40} {:<24} {}",
        summary.file_name, summary.parser_mime_type, summary.update_method
    );
}

async fn run_read(
    inspector: &Inspector,
    source: SourceConfig,
    prompter: &StaticPrompter,
    limit: Option<usize>,
) -> Result<()> {
    let uri = source.display_uri().to_string();
    let inspection = inspector
        .inspect(source, prompter)
        .await
        .with_context(|| format!("inspecting {}", uri))?;

    let mut remaining = limit.unwrap_or(usize::MAX);
    for preview in inspection.previews {
        match preview.streams {
            StreamSet::Finite(summaries) => {
                for summary in &summaries {
                    if remaining == 0 {
                        return Ok(());
                    }
                    remaining = print_records(summary, remaining).await?;
                }
            }
            StreamSet::Lazy(mut cursor) => {
                while remaining > 0 {
                    let Some(summary) = cursor.move_to_next_stream(prompter).await else {
                        break;
                    };
                    remaining = print_records(&summary?, remaining).await?;
                }
            }
        }
    }
    Ok(())
}

/// Print up to `budget` records of one stream; returns the budget left.
async fn print_records(summary: &StreamSummary, mut budget: usize) -> Result<usize> {
    let mut stream = summary
        .open_stream(None)
        .await
        .with_context(|| format!("opening {}", summary.uri))?;
    while budget > 0 {
        let Some(record) = stream.next().await else {
            break;
        };
        let record = record.with_context(|| format!("reading {}", summary.uri))?;
        println!("{}", serde_json::to_string(&record)?);
        budget -= 1;
    }
    Ok(budget)
}

fn run_sniff(path: &Path, peek_bytes: usize) -> Result<()> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut peek = Vec::new();
    file.take(peek_bytes as u64)
        .read_to_end(&mut peek)
        .with_context(|| format!("reading {}", path.display()))?;
    println!("{}", sniff::detect(&peek).unwrap_or("unknown"));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let inspector = Inspector::from_config(&cfg)?;
    let prompter = StaticPrompter::from_pairs(cli.answers);

    match cli.command {
        Commands::Inspect { uri, source } => {
            let source = source_config(&cfg, uri, source)?;
            run_inspect(&inspector, source, &prompter).await?;
        }
        Commands::Read { uri, source, limit } => {
            let source = source_config(&cfg, uri, source)?;
            run_read(&inspector, source, &prompter, limit).await?;
        }
        Commands::Sniff { path } => {
            run_sniff(&path, cfg.inspection.peek_bytes)?;
        }
        Commands::Sources => {
            sources::list_sources(inspector.connectors())?;
        }
        Commands::Parsers => {
            sources::list_parsers(inspector.parsers())?;
        }
    }

    Ok(())
}
