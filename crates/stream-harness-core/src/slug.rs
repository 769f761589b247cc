//! Schema and stream-set slug derivation from file names.
//!
//! A slug is a short lowercase identifier (`[a-z0-9-]+`). Record slugs come
//! from the innermost file name with format extensions removed, so
//! `outer.zip → inner.tar → data.json` tags records `data`, exactly like a
//! pre-extracted `data.json` would.

/// Extensions stripped when deriving a stem.
pub const KNOWN_EXTENSIONS: &[&str] = &[
    "gz", "gzip", "tgz", "zip", "tar", "json", "jsonl", "ndjson", "csv", "tsv", "txt", "avro",
];

/// Last path segment of `name` (handles `/` and `\`).
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Remove one trailing `.ext` from `name` when `ext` is in `extensions`
/// (case-insensitive). A name that is only an extension is kept.
pub fn strip_extension<'a>(name: &'a str, extensions: &[&str]) -> &'a str {
    if let Some((head, ext)) = name.rsplit_once('.') {
        if !head.is_empty() && extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            return head;
        }
    }
    name
}

/// Base name with every known format extension removed.
pub fn stem(name: &str) -> &str {
    let mut current = base_name(name);
    loop {
        let next = strip_extension(current, KNOWN_EXTENSIONS);
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}

/// Lowercase, collapse runs of non-alphanumerics into `-`, trim dashes.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut dash = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "stream".to_string()
    } else {
        out
    }
}

/// Slug for records parsed from a file called `name`.
pub fn schema_slug(name: &str) -> String {
    slugify(stem(name))
}

fn tokens(name: &str) -> Vec<String> {
    stem(name)
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

fn contains_run(haystack: &[String], run: &[String]) -> bool {
    haystack.windows(run.len()).any(|w| w == run)
}

/// Stream-set slug: the longest run of name tokens shared by every file
/// name, ignoring purely numeric runs. Falls back to the first file's stem.
pub fn common_slug<S: AsRef<str>>(names: &[S]) -> String {
    let Some(first) = names.first() else {
        return "stream".to_string();
    };
    if names.len() == 1 {
        return schema_slug(first.as_ref());
    }

    let token_lists: Vec<Vec<String>> = names.iter().map(|n| tokens(n.as_ref())).collect();
    let head = &token_lists[0];
    for len in (1..=head.len()).rev() {
        for run in head.windows(len) {
            let meaningful = run.iter().any(|t| !t.chars().all(|c| c.is_ascii_digit()));
            if meaningful && token_lists[1..].iter().all(|other| contains_run(other, run)) {
                return run.join("-");
            }
        }
    }
    schema_slug(first.as_ref())
}
