//! End-to-end inspection scenarios through the public API: real files in
//! temp dirs, archives built in memory, and a local HTTP server.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use stream_harness::config::{Config, SourceConfig};
use stream_harness::error::{HarnessError, Result};
use stream_harness::inspect::{Inspection, Inspector, StreamSummary, UPDATE_METHOD_CHOICE};
use stream_harness::parser::archive::FILE_NAME_FILTER;
use stream_harness::prompt::{Answers, Parameter, Prompter, StaticPrompter};
use stream_harness_core::models::{RecordContext, UpdateMethod};

// ─── Helpers ────────────────────────────────────────────────────────

/// Records every parameter it is asked, then answers from a fixed set.
struct CountingPrompter {
    answers: StaticPrompter,
    asked: Mutex<Vec<String>>,
}

impl CountingPrompter {
    fn new(answers: StaticPrompter) -> Self {
        Self {
            answers,
            asked: Mutex::new(Vec::new()),
        }
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for CountingPrompter {
    async fn prompt(&self, parameters: &[Parameter]) -> Result<Answers> {
        self.asked
            .lock()
            .unwrap()
            .extend(parameters.iter().map(|p| p.name.clone()));
        self.answers.prompt(parameters).await
    }
}

fn inspector() -> Inspector {
    Inspector::from_config(&Config::default()).unwrap()
}

fn uri_of(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn inspect(path: &Path, prompter: &dyn Prompter) -> Inspection {
    inspector()
        .inspect_uri(&uri_of(path), prompter)
        .await
        .unwrap()
}

fn only_stream(inspection: &Inspection) -> &StreamSummary {
    assert_eq!(inspection.previews.len(), 1);
    let summaries = inspection.previews[0].summaries();
    assert_eq!(summaries.len(), 1);
    &summaries[0]
}

async fn records_of(summary: &StreamSummary) -> Vec<RecordContext> {
    summary.open_stream(None).await.unwrap().collect().await.unwrap()
}

fn values(records: &[RecordContext]) -> Vec<Value> {
    records.iter().map(|r| r.record.clone()).collect()
}

fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn tar_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, bytes) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *bytes).unwrap();
    }
    builder.into_inner().unwrap()
}

const LEGISLATORS: &str = r#"[
  {"id": "A000360", "name": "Lamar Alexander", "party": "Republican"},
  {"id": "B000944", "name": "Sherrod Brown", "party": "Democrat"},
  {"id": "C000127", "name": "Maria Cantwell", "party": "Democrat"}
]"#;

// ─── Files ──────────────────────────────────────────────────────────

#[tokio::test]
async fn json_file_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("legislators.json");
    fs::write(&path, LEGISLATORS).unwrap();

    let prompter = CountingPrompter::new(StaticPrompter::empty());
    let inspection = inspect(&path, &prompter).await;
    assert!(prompter.asked().is_empty());

    let preview = &inspection.previews[0];
    assert_eq!(preview.slug, "legislators");
    assert_eq!(preview.expected_bytes_total, LEGISLATORS.len() as u64);
    assert!(preview.update_hash.is_some());

    let summary = only_stream(&inspection);
    assert_eq!(summary.parser_mime_type, "application/json");
    assert_eq!(summary.update_method, UpdateMethod::BatchFullSet);

    let records = records_of(summary).await;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.schema_slug == "legislators"));
    assert_eq!(records[1].record["name"], json!("Sherrod Brown"));
}

#[tokio::test]
async fn opening_twice_yields_the_same_records() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("legislators.json");
    fs::write(&path, LEGISLATORS).unwrap();

    let inspection = inspect(&path, &StaticPrompter::empty()).await;
    let summary = only_stream(&inspection);
    let first = records_of(summary).await;
    let second = records_of(summary).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn format_follows_content_not_name() {
    let tmp = TempDir::new().unwrap();
    let named = tmp.path().join("legislators.json");
    let misnamed = tmp.path().join("legislators.csv");
    fs::write(&named, LEGISLATORS).unwrap();
    fs::write(&misnamed, LEGISLATORS).unwrap();

    let a = inspect(&named, &StaticPrompter::empty()).await;
    let b = inspect(&misnamed, &StaticPrompter::empty()).await;
    let (a, b) = (only_stream(&a), only_stream(&b));
    assert_eq!(a.detected_mime_type, b.detected_mime_type);
    assert_eq!(a.parser_mime_type, b.parser_mime_type);
    assert_eq!(values(&records_of(a).await), values(&records_of(b).await));
}

#[tokio::test]
async fn missing_path_is_target_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = inspector()
        .inspect_uri(&uri_of(&tmp.path().join("nope.json")), &StaticPrompter::empty())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HarnessError::TargetNotFound { .. }));
}

#[tokio::test]
async fn undetectable_content_needs_a_manual_parser() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("export.dat");
    // Latin-1 text is not valid UTF-8, so nothing is detected
    fs::write(&path, b"caf\xe9,1\nna\xefve,2\n").unwrap();

    let err = inspector()
        .inspect_uri(&uri_of(&path), &StaticPrompter::empty())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HarnessError::FormatUndetectable { .. }));

    let prompter = StaticPrompter::from_pairs([("parserMimeType", "text/csv")]);
    let inspection = inspect(&path, &prompter).await;
    assert_eq!(inspection.config.parser_override.as_deref(), Some("text/csv"));
    assert_eq!(only_stream(&inspection).parser_mime_type, "text/csv");

    // the persisted choice is reused silently
    let counting = CountingPrompter::new(StaticPrompter::empty());
    inspector().inspect(inspection.config, &counting).await.unwrap();
    assert!(counting.asked().is_empty());
}

#[tokio::test]
async fn single_column_text_asks_for_a_parser() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("names.csv");
    // one column, so no delimiter to detect: sniffs as plain text
    fs::write(&path, "name\nada\ngrace\n").unwrap();

    let silent = CountingPrompter::new(StaticPrompter::empty());
    let err = inspector()
        .inspect_uri(&uri_of(&path), &silent)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HarnessError::FormatUndetectable { ref name, .. } if name == "names.csv"));
    assert_eq!(silent.asked(), vec!["parserMimeType".to_string()]);

    let prompter = StaticPrompter::from_pairs([("parserMimeType", "text/csv")]);
    let inspection = inspect(&path, &prompter).await;
    let summary = only_stream(&inspection);
    assert_eq!(summary.detected_mime_type, Some("text/plain"));
    assert_eq!(summary.parser_mime_type, "text/csv");
    assert_eq!(
        values(&records_of(summary).await),
        vec![json!({"name": "ada"}), json!({"name": "grace"})]
    );
}

// ─── Containers ─────────────────────────────────────────────────────

#[tokio::test]
async fn tar_entries_are_filtered() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bundle.tar");
    fs::write(
        &path,
        tar_of(&[
            ("a.json", br#"[{"n": 1}, {"n": 2}]"#),
            ("b.json", br#"[{"n": 3}]"#),
        ]),
    )
    .unwrap();

    let prompter = StaticPrompter::from_pairs([(FILE_NAME_FILTER, r"a\.json")]);
    let inspection = inspect(&path, &prompter).await;
    let records = records_of(only_stream(&inspection)).await;
    assert_eq!(values(&records), vec![json!({"n": 1}), json!({"n": 2})]);
    assert!(records.iter().all(|r| r.schema_slug == "a"));
}

#[tokio::test]
async fn nested_archives_parse_like_the_plain_file() {
    let data = br#"[{"k": "x", "v": 1}, {"k": "y", "v": 2}]"#;
    let tmp = TempDir::new().unwrap();
    let plain = tmp.path().join("data.json");
    let nested = tmp.path().join("outer.zip");
    fs::write(&plain, data).unwrap();
    let inner = tar_of(&[("data.json", data)]);
    fs::write(&nested, zip_of(&[("inner.tar", inner.as_slice())])).unwrap();

    let direct = inspect(&plain, &StaticPrompter::empty()).await;
    let wrapped = inspect(&nested, &StaticPrompter::empty()).await;

    let direct_records = records_of(only_stream(&direct)).await;
    let wrapped_records = records_of(only_stream(&wrapped)).await;
    assert_eq!(direct_records, wrapped_records);
    assert_eq!(only_stream(&wrapped).parser_mime_type, "application/zip");
}

#[tokio::test]
async fn filter_reaches_through_nested_archives() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("outer.zip");
    let inner = tar_of(&[("a.json", br#"[{"n": 1}]"#), ("b.json", br#"[{"n": 2}]"#)]);
    fs::write(&path, zip_of(&[("inner.tar", inner.as_slice())])).unwrap();

    let prompter = CountingPrompter::new(StaticPrompter::from_pairs([(FILE_NAME_FILTER, r"a\.json")]));
    let inspection = inspect(&path, &prompter).await;
    assert_eq!(prompter.asked(), vec![FILE_NAME_FILTER.to_string()]);

    let records = records_of(only_stream(&inspection)).await;
    assert_eq!(values(&records), vec![json!({"n": 1})]);
    assert_eq!(records[0].schema_slug, "a");
}

#[tokio::test]
async fn archive_named_by_the_filter_is_read_whole() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("outer.zip");
    let wanted = tar_of(&[("a.json", br#"[{"n": 1}]"#), ("b.json", br#"[{"n": 2}]"#)]);
    let other = tar_of(&[("c.json", br#"[{"n": 3}]"#)]);
    fs::write(
        &path,
        zip_of(&[("inner.tar", wanted.as_slice()), ("other.tar", other.as_slice())]),
    )
    .unwrap();

    let prompter = CountingPrompter::new(StaticPrompter::from_pairs([(FILE_NAME_FILTER, r"inner\.tar")]));
    let inspection = inspect(&path, &prompter).await;
    assert_eq!(prompter.asked(), vec![FILE_NAME_FILTER.to_string()]);

    let records = records_of(only_stream(&inspection)).await;
    assert_eq!(values(&records), vec![json!({"n": 1}), json!({"n": 2})]);
}

#[tokio::test]
async fn gzipped_tarball_is_unwrapped() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("events.tgz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&tar_of(&[("events.ndjson", b"{\"e\":1}\n{\"e\":2}\n{\"e\":3}\n")]))
        .unwrap();
    fs::write(&path, encoder.finish().unwrap()).unwrap();

    let inspection = inspect(&path, &StaticPrompter::empty()).await;
    let summary = only_stream(&inspection);
    assert_eq!(summary.parser_mime_type, "application/gzip");
    let records = records_of(summary).await;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].schema_slug, "events");
}

#[tokio::test]
async fn archive_without_matching_entries() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bundle.zip");
    fs::write(&path, zip_of(&[("readme.json", b"[]")])).unwrap();

    let prompter = StaticPrompter::from_pairs([(FILE_NAME_FILTER, r".*\.csv")]);
    let err = inspector()
        .inspect_uri(&uri_of(&path), &prompter)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HarnessError::NoMatchingContainerEntry { .. }));
}

#[tokio::test]
async fn each_question_is_asked_once_and_never_again() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sales.zip");
    fs::write(
        &path,
        zip_of(&[
            ("sales-01.csv", b"region,total\nnorth,10\nsouth,20\n"),
            ("sales-02.csv", b"region,total\neast,30\n"),
        ]),
    )
    .unwrap();

    let first = CountingPrompter::new(StaticPrompter::from_pairs([(
        UPDATE_METHOD_CHOICE,
        "APPEND_ONLY_LOG",
    )]));
    let inspection = inspect(&path, &first).await;
    let mut asked = first.asked();
    asked.sort();
    assert_eq!(asked, vec![FILE_NAME_FILTER.to_string(), UPDATE_METHOD_CHOICE.to_string()]);

    let summary = only_stream(&inspection);
    assert_eq!(summary.update_method, UpdateMethod::AppendOnlyLog);
    let totals: Vec<_> = records_of(summary)
        .await
        .iter()
        .map(|r| r.record["total"].clone())
        .collect();
    assert_eq!(totals, vec![json!("10"), json!("20"), json!("30")]);

    let second = CountingPrompter::new(StaticPrompter::empty());
    let again = inspector()
        .inspect(inspection.config.clone(), &second)
        .await
        .unwrap();
    assert!(second.asked().is_empty());
    assert_eq!(again.config, inspection.config);
    assert_eq!(only_stream(&again).update_method, UpdateMethod::AppendOnlyLog);
}

// ─── Directories ────────────────────────────────────────────────────

#[tokio::test]
async fn directory_streams_share_one_set() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("orders-2024.ndjson"), "{\"id\":1}\n{\"id\":2}\n").unwrap();
    fs::write(tmp.path().join("orders-2025.ndjson"), "{\"id\":3}\n{\"id\":4}\n").unwrap();

    let prompter = StaticPrompter::from_pairs([(UPDATE_METHOD_CHOICE, "BATCH_FULL_SET")]);
    let inspection = inspect(tmp.path(), &prompter).await;
    assert_eq!(inspection.previews.len(), 1);
    let preview = &inspection.previews[0];
    assert_eq!(preview.slug, "orders");
    assert_eq!(preview.summaries().len(), 2);
    assert_eq!(preview.update_hash.as_ref().map(String::len), Some(64));
    assert_eq!(
        inspection.config.update_methods.get("orders"),
        Some(&UpdateMethod::BatchFullSet)
    );
}

// ─── HTTP ───────────────────────────────────────────────────────────

mod http {
    use super::*;
    use axum::extract::State;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;

    type Served = Arc<Mutex<(String, String)>>;

    async fn serve_data(State(served): State<Served>) -> impl axum::response::IntoResponse {
        let (etag, body) = served.lock().unwrap().clone();
        (
            [
                (header::ETAG, etag),
                (header::CONTENT_TYPE, "application/json; charset=utf-8".to_string()),
            ],
            body,
        )
    }

    async fn start(served: Served) -> String {
        let app = Router::new()
            .route("/exports/legislators.json", get(serve_data))
            .with_state(served);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/exports/legislators.json", addr)
    }

    #[tokio::test]
    async fn etag_changes_are_visible_between_inspections() {
        let served: Served = Arc::new(Mutex::new((
            "\"v1\"".to_string(),
            r#"[{"id": 1}]"#.to_string(),
        )));
        let url = start(served.clone()).await;

        let first = inspector()
            .inspect_uri(&url, &StaticPrompter::empty())
            .await
            .unwrap();
        assert_eq!(first.previews[0].slug, "legislators");
        assert_eq!(first.previews[0].update_hash.as_deref(), Some("\"v1\""));
        let summary = only_stream(&first);
        assert_eq!(summary.parser_mime_type, "application/json");
        assert_eq!(records_of(summary).await.len(), 1);

        *served.lock().unwrap() = ("\"v2\"".to_string(), r#"[{"id": 1}, {"id": 2}]"#.to_string());

        let second = inspector()
            .inspect(first.config.clone(), &StaticPrompter::empty())
            .await
            .unwrap();
        assert_eq!(second.previews[0].update_hash.as_deref(), Some("\"v2\""));
        assert_eq!(records_of(only_stream(&second)).await.len(), 2);
    }

    async fn stall() -> &'static str {
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        "[]"
    }

    #[tokio::test]
    async fn stalled_server_times_out() {
        let app = Router::new().route("/slow.json", get(stall));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = Config::default();
        config.http.timeout_secs = 1;
        let started = std::time::Instant::now();
        let err = Inspector::from_config(&config)
            .unwrap()
            .inspect_uri(&format!("http://{}/slow.json", addr), &StaticPrompter::empty())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::ConnectionFailed { .. }));
        assert!(err.is_retryable());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_url_is_target_not_found() {
        let served: Served = Arc::new(Mutex::new(("\"v1\"".to_string(), "[]".to_string())));
        let url = start(served).await.replace("legislators.json", "missing.json");
        let err = inspector()
            .inspect_uri(&url, &StaticPrompter::empty())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::TargetNotFound { .. }));
    }
}

// ─── S3 ─────────────────────────────────────────────────────────────

mod s3 {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{header, StatusCode, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::Router;
    use std::collections::{BTreeMap, HashMap};

    /// key → (etag, body) of the one bucket, `acme`.
    type Bucket = Arc<Mutex<BTreeMap<String, (String, String)>>>;

    /// Path-style ListObjectsV2 (one key per page) and GetObject.
    async fn serve_bucket(
        State(bucket): State<Bucket>,
        uri: Uri,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        let Some(key) = uri.path().strip_prefix("/acme/") else {
            return StatusCode::NOT_FOUND.into_response();
        };
        let objects = bucket.lock().unwrap();
        if !key.is_empty() {
            return match objects.get(key) {
                Some((etag, body)) => {
                    ([(header::ETAG, format!("\"{}\"", etag))], body.clone()).into_response()
                }
                None => StatusCode::NOT_FOUND.into_response(),
            };
        }

        assert_eq!(query.get("list-type").map(String::as_str), Some("2"));
        let prefix = query.get("prefix").cloned().unwrap_or_default();
        let after = query.get("continuation-token");
        let mut listed = objects
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| after.map_or(true, |token| k.as_str() > token.as_str()));
        let page = listed.next();
        let truncated = listed.next().is_some();

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><ListBucketResult>");
        if let Some((key, (etag, body))) = page {
            xml.push_str(&format!(
                "<Contents><Key>{}</Key><ETag>&quot;{}&quot;</ETag><Size>{}</Size></Contents>",
                key,
                etag,
                body.len()
            ));
            if truncated {
                xml.push_str(&format!("<NextContinuationToken>{}</NextContinuationToken>", key));
            }
        }
        xml.push_str(&format!("<IsTruncated>{}</IsTruncated></ListBucketResult>", truncated));
        ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
    }

    async fn start(bucket: Bucket) -> String {
        let app = Router::new().fallback(serve_bucket).with_state(bucket);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn s3_inspector(endpoint: String) -> Inspector {
        let mut config = Config::default();
        config.s3.endpoint_url = Some(endpoint);
        Inspector::from_config(&config).unwrap()
    }

    fn daily() -> SourceConfig {
        let mut source = SourceConfig::new("", vec!["s3://acme/daily/".into()]);
        source.credentials.insert("access_key_id".into(), json!("AKIDEXAMPLE"));
        source
            .credentials
            .insert("secret_access_key".into(), json!("wJalrXUtnFEMI/K7MDENG"));
        source
    }

    #[tokio::test]
    async fn prefix_objects_are_listed_across_pages_and_read() {
        let bucket: Bucket = Arc::new(Mutex::new(BTreeMap::from([
            ("daily/a.ndjson".to_string(), ("e1".to_string(), "{\"id\":1}\n{\"id\":2}\n".to_string())),
            ("daily/b.ndjson".to_string(), ("e2".to_string(), "{\"id\":3}\n{\"id\":4}\n".to_string())),
            ("monthly/c.ndjson".to_string(), ("e3".to_string(), "{\"id\":9}\n".to_string())),
        ])));
        let inspector = s3_inspector(start(bucket.clone()).await);

        let first = inspector.inspect(daily(), &StaticPrompter::empty()).await.unwrap();
        assert_eq!(first.config.source_type, "s3");
        assert_eq!(first.previews.len(), 1);
        let preview = &first.previews[0];
        let uris: Vec<_> = preview.summaries().iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(uris, vec!["s3://acme/daily/a.ndjson", "s3://acme/daily/b.ndjson"]);
        assert_eq!(preview.summaries()[0].last_updated_hash.as_deref(), Some("e1"));

        let mut ids = Vec::new();
        for summary in preview.summaries() {
            ids.extend(records_of(summary).await.into_iter().map(|r| r.record["id"].clone()));
        }
        assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4)]);

        let unchanged = inspector
            .inspect(first.config.clone(), &StaticPrompter::empty())
            .await
            .unwrap();
        assert_eq!(unchanged.previews[0].update_hash, preview.update_hash);

        bucket.lock().unwrap().insert(
            "daily/b.ndjson".to_string(),
            ("e2-v2".to_string(), "{\"id\":3}\n{\"id\":4}\n{\"id\":5}\n".to_string()),
        );
        let changed = inspector
            .inspect(first.config.clone(), &StaticPrompter::empty())
            .await
            .unwrap();
        assert!(changed.previews[0].update_hash.is_some());
        assert_ne!(changed.previews[0].update_hash, preview.update_hash);
        assert_eq!(records_of(&changed.previews[0].summaries()[1]).await.len(), 3);
    }

    #[tokio::test]
    async fn empty_prefix_is_target_not_found() {
        let bucket: Bucket = Arc::new(Mutex::new(BTreeMap::new()));
        let err = s3_inspector(start(bucket).await)
            .inspect(daily(), &StaticPrompter::empty())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::TargetNotFound { ref uri } if uri == "s3://acme/daily/"));
    }
}

#[tokio::test]
async fn unclaimed_uri_has_no_adapter() {
    let err = inspector()
        .inspect(SourceConfig::new("ftp", vec!["ftp://x/y".into()]), &StaticPrompter::empty())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HarnessError::NoAdapterFound { .. }));
}
