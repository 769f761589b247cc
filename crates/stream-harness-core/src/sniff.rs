//! Content sniffing from leading bytes.
//!
//! [`detect`] looks only at the bytes it is given. File names, extensions,
//! and transport-reported MIME types are never consulted: a `.json` file
//! that is really gzip is reported as gzip.
//!
//! # Detection order
//!
//! 1. Binary signatures from the embedded [`SIGNATURES`] table.
//! 2. Text heuristics on valid UTF-8: JSON document, newline-delimited
//!    JSON, consistently delimited rows (CSV/TSV), then plain text.
//! 3. Anything else is unknown (`None`).

pub const MIME_JSON: &str = "application/json";
pub const MIME_NDJSON: &str = "application/x-ndjson";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_AVRO: &str = "application/avro";
pub const MIME_ZIP: &str = "application/zip";
pub const MIME_TAR: &str = "application/x-tar";
pub const MIME_GZIP: &str = "application/gzip";
pub const MIME_BZIP2: &str = "application/x-bzip2";
pub const MIME_XZ: &str = "application/x-xz";
pub const MIME_ZSTD: &str = "application/zstd";
pub const MIME_PARQUET: &str = "application/vnd.apache.parquet";
pub const MIME_PDF: &str = "application/pdf";

/// A magic-byte signature: `magic` found at `offset` means `mime`.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub offset: usize,
    pub magic: &'static [u8],
    pub mime: &'static str,
}

/// Binary signatures, checked in order.
pub const SIGNATURES: &[Signature] = &[
    Signature { offset: 0, magic: &[0x1f, 0x8b], mime: MIME_GZIP },
    Signature { offset: 0, magic: b"PK\x03\x04", mime: MIME_ZIP },
    Signature { offset: 0, magic: b"PK\x05\x06", mime: MIME_ZIP },
    Signature { offset: 0, magic: b"PK\x07\x08", mime: MIME_ZIP },
    Signature { offset: 257, magic: b"ustar", mime: MIME_TAR },
    Signature { offset: 0, magic: b"Obj\x01", mime: MIME_AVRO },
    // "BZh", block size 1-9, then the first block magic
    Signature { offset: 0, magic: b"BZh11AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: b"BZh21AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: b"BZh31AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: b"BZh41AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: b"BZh51AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: b"BZh61AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: b"BZh71AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: b"BZh81AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: b"BZh91AY&SY", mime: MIME_BZIP2 },
    Signature { offset: 0, magic: &[0xfd, b'7', b'z', b'X', b'Z', 0x00], mime: MIME_XZ },
    Signature { offset: 0, magic: &[0x28, 0xb5, 0x2f, 0xfd], mime: MIME_ZSTD },
    Signature { offset: 0, magic: b"PAR1", mime: MIME_PARQUET },
    Signature { offset: 0, magic: b"%PDF-", mime: MIME_PDF },
];

const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];
const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];
const MAX_SNIFF_LINES: usize = 50;

/// Detect the most likely MIME type of `peek`, or `None` when unknown.
pub fn detect(peek: &[u8]) -> Option<&'static str> {
    detect_with(SIGNATURES, peek)
}

/// Like [`detect`], with a caller-supplied signature table.
pub fn detect_with(signatures: &[Signature], peek: &[u8]) -> Option<&'static str> {
    if peek.is_empty() {
        return None;
    }

    for sig in signatures {
        let end = sig.offset + sig.magic.len();
        if peek.len() >= end && &peek[sig.offset..end] == sig.magic {
            return Some(sig.mime);
        }
    }

    let text = as_text(peek)?;
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(mime) = sniff_json(trimmed) {
            return Some(mime);
        }
    }

    if looks_delimited(text) {
        return Some(MIME_CSV);
    }

    Some(MIME_TEXT)
}

/// Decode `peek` as UTF-8 text, tolerating a multi-byte character cut off
/// at the end of the buffer. Returns `None` for binary content.
fn as_text(peek: &[u8]) -> Option<&str> {
    let body = peek.strip_prefix(UTF8_BOM).unwrap_or(peek);
    if body.contains(&0) {
        return None;
    }
    match std::str::from_utf8(body) {
        Ok(s) => Some(s),
        // error_len() == None: the buffer ends mid-character
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&body[..e.valid_up_to()]).ok(),
        Err(_) => None,
    }
}

fn sniff_json(text: &str) -> Option<&'static str> {
    let err = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(_) => return Some(MIME_JSON),
        Err(e) => e,
    };

    if looks_ndjson(text) {
        return Some(MIME_NDJSON);
    }

    // A document cut short by the peek cap.
    if err.is_eof() {
        return Some(MIME_JSON);
    }
    None
}

fn looks_ndjson(text: &str) -> bool {
    let lines = complete_lines(text);
    let lines: Vec<&str> = lines.into_iter().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return false;
    }
    lines.iter().all(|line| {
        matches!(
            serde_json::from_str::<serde_json::Value>(line),
            Ok(serde_json::Value::Object(_)) | Ok(serde_json::Value::Array(_))
        )
    })
}

fn looks_delimited(text: &str) -> bool {
    let lines: Vec<&str> = complete_lines(text)
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .take(MAX_SNIFF_LINES)
        .collect();
    if lines.len() < 2 {
        return false;
    }
    DELIMITERS.iter().any(|&d| {
        let first = count_unquoted(lines[0], d);
        first > 0 && lines.iter().all(|l| count_unquoted(l, d) == first)
    })
}

/// Lines of `text`, dropping a trailing partial line when the buffer does
/// not end in a newline and more than one line is present.
fn complete_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.lines().collect();
    if lines.len() > 1 && !text.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Pick the delimiter that splits every line of `peek` into the same
/// number of fields, preferring comma.
pub fn guess_delimiter(peek: &[u8]) -> u8 {
    let Some(text) = as_text(peek) else {
        return b',';
    };
    let lines: Vec<&str> = complete_lines(text)
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .take(MAX_SNIFF_LINES)
        .collect();
    DELIMITERS
        .iter()
        .copied()
        .find(|&d| {
            let first = lines.first().map(|l| count_unquoted(l, d)).unwrap_or(0);
            first > 0 && lines.iter().all(|l| count_unquoted(l, d) == first)
        })
        .unwrap_or(b',')
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_binary_signatures() {
        assert_eq!(detect(&[0x1f, 0x8b, 0x08, 0x00]), Some(MIME_GZIP));
        assert_eq!(detect(b"PK\x03\x04rest"), Some(MIME_ZIP));
        assert_eq!(detect(b"Obj\x01\x04\x14"), Some(MIME_AVRO));
        assert_eq!(detect(b"PAR1\x15\x04"), Some(MIME_PARQUET));

        let mut tar = vec![0u8; 512];
        tar[..5].copy_from_slice(b"a.txt");
        tar[257..262].copy_from_slice(b"ustar");
        assert_eq!(detect(&tar), Some(MIME_TAR));
    }

    #[test]
    fn bzip2_needs_the_full_header() {
        assert_eq!(detect(b"BZh91AY&SY\x4e\xec\xe8\x36"), Some(MIME_BZIP2));
        assert_eq!(detect(b"BZh11AY&SY\x00\x00"), Some(MIME_BZIP2));
        assert_eq!(detect(b"BZh is how the memo starts\n"), Some(MIME_TEXT));
        assert_eq!(detect(b"BZh0"), Some(MIME_TEXT));
    }

    #[test]
    fn detects_json_documents() {
        assert_eq!(detect(br#"[{"a":1},{"a":2}]"#), Some(MIME_JSON));
        assert_eq!(detect(b"  \n{\"name\": \"x\"}"), Some(MIME_JSON));
    }

    #[test]
    fn truncated_json_is_still_json() {
        assert_eq!(detect(b"[\n  {\"a\": 1},\n  {\"a\": 2"), Some(MIME_JSON));
        assert_eq!(detect(b"[{\"a\": 1}, {\"a\":"), Some(MIME_JSON));
    }

    #[test]
    fn detects_ndjson() {
        assert_eq!(detect(b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n"), Some(MIME_NDJSON));
        // last line cut short by the peek cap
        assert_eq!(detect(b"{\"a\":1}\n{\"a\":2}\n{\"a\""), Some(MIME_NDJSON));
    }

    #[test]
    fn detects_delimited_text() {
        assert_eq!(detect(b"id,name\n1,alice\n2,bob\n"), Some(MIME_CSV));
        assert_eq!(detect(b"id\tname\n1\talice\n"), Some(MIME_CSV));
        assert_eq!(detect(b"id,name\n1,\"smith, al\"\n"), Some(MIME_CSV));
    }

    #[test]
    fn plain_text_and_unknown() {
        assert_eq!(detect(b"hello world"), Some(MIME_TEXT));
        assert_eq!(detect(&[0x00, 0x01, 0x02, 0xff]), None);
        assert_eq!(detect(b""), None);
    }

    #[test]
    fn bom_and_split_utf8_are_tolerated() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(br#"{"k":"v"}"#);
        assert_eq!(detect(&bytes), Some(MIME_JSON));

        let mut cut = b"a,b\n1,\xc3\xa9\n2,".to_vec();
        cut.push(0xc3);
        assert_eq!(detect(&cut), Some(MIME_CSV));
    }

    #[test]
    fn guesses_delimiter() {
        assert_eq!(guess_delimiter(b"a;b;c\n1;2;3\n"), b';');
        assert_eq!(guess_delimiter(b"a\tb\n1\t2\n"), b'\t');
        assert_eq!(guess_delimiter(b"a,b\n1,2\n"), b',');
        assert_eq!(guess_delimiter(b"single"), b',');
    }

    #[test]
    fn custom_table_is_honoured() {
        const TABLE: &[Signature] = &[Signature { offset: 2, magic: b"ZZ", mime: "application/x-zz" }];
        assert_eq!(detect_with(TABLE, b"..ZZ.."), Some("application/x-zz"));
        assert_eq!(detect_with(TABLE, &[0x1f, 0x8b, 0x00]), None);
    }
}
