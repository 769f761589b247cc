//! Listings for the `sources` and `parsers` commands.

use anyhow::Result;

use crate::parser::ParserRegistry;
use crate::traits::ConnectorRegistry;

/// One row of `streamh sources`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub source_type: String,
    pub description: String,
}

/// One row of `streamh parsers`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserRow {
    pub mime_type: &'static str,
    pub name: &'static str,
    pub extensions: String,
}

/// Adapters in claim order.
pub fn source_rows(registry: &ConnectorRegistry) -> Vec<SourceRow> {
    registry
        .adapters()
        .iter()
        .map(|a| SourceRow {
            source_type: a.source_type().to_string(),
            description: a.description().to_string(),
        })
        .collect()
}

pub fn parser_rows(registry: &ParserRegistry) -> Vec<ParserRow> {
    registry
        .all()
        .iter()
        .map(|p| ParserRow {
            mime_type: p.mime_type(),
            name: p.display_name(),
            extensions: p.file_extensions().join(", "),
        })
        .collect()
}

pub fn list_sources(registry: &ConnectorRegistry) -> Result<()> {
    println!("{:<12} DESCRIPTION", "SOURCE");
    for row in source_rows(registry) {
        println!("{:<12} {}", row.source_type, row.description);
    }
    Ok(())
}

pub fn list_parsers(registry: &ParserRegistry) -> Result<()> {
    println!("{:<30} {:<16} EXTENSIONS", "MIME TYPE", "NAME");
    for row in parser_rows(registry) {
        println!("{:<30} {:<16} {}", row.mime_type, row.name, row.extensions);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn filesystem_is_listed_last() {
        let rows = source_rows(&ConnectorRegistry::with_builtins(&Config::default()).unwrap());
        let types: Vec<_> = rows.iter().map(|r| r.source_type.as_str()).collect();
        assert_eq!(types, vec!["synthetic", "http", "s3", "sqlite", "filesystem"]);
    }

    #[test]
    fn every_builtin_parser_is_listed() {
        let rows = parser_rows(&ParserRegistry::with_builtins());
        assert_eq!(rows.len(), 7);
        assert!(rows.iter().all(|r| !r.name.is_empty()));
    }
}
