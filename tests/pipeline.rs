//! End-to-end batch tests over real directory trees.
//!
//! Every fixture is built in-process (hand-assembled PDF bytes, OOXML
//! containers via `zip::ZipWriter`), so these run offline and need no
//! external tools.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use docfeed::{
    unique_output_name, upload_new_artifacts, ConversionResult, ConvertError, DocumentIndex,
    PipelineConfig, PipelineError, RetryPolicy, Scheduler, SkipReason, SpreadsheetFormat,
};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=docfeed=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, obj).as_bytes());
    }
    let xref_start = pdf.len();
    let xref_header = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    pdf.extend_from_slice(xref_header.as_bytes());
    for off in offsets {
        pdf.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    pdf
}

fn zip_of(entries: &[(&str, String)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let opts = zip::write::SimpleFileOptions::default();
    for (name, body) in entries {
        zip.start_file(*name, opts).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    zip_of(&[(
        "word/document.xml",
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        ),
    )])
}

/// Workbook whose sheets hold inline-string rows.
fn minimal_xlsx(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
    let mut entries: Vec<(String, String)> = Vec::new();
    let mut overrides = String::new();
    let mut sheet_list = String::new();
    let mut rels = String::new();

    for (i, (name, rows)) in sheets.iter().enumerate() {
        let n = i + 1;
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, row) in rows.iter().enumerate() {
            xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, v) in row.iter().enumerate() {
                let col = (b'A' + c as u8) as char;
                xml.push_str(&format!(
                    r#"<c r="{col}{}" t="inlineStr"><is><t>{v}</t></is></c>"#,
                    r + 1
                ));
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        entries.push((format!("xl/worksheets/sheet{n}.xml"), xml));

        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        sheet_list.push_str(&format!(r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }

    entries.push((
        "[Content_Types].xml".into(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>{overrides}</Types>"#
        ),
    ));
    entries.push((
        "_rels/.rels".into(),
        r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.into(),
    ));
    entries.push((
        "xl/workbook.xml".into(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{sheet_list}</sheets></workbook>"#
        ),
    ));
    entries.push((
        "xl/_rels/workbook.xml.rels".into(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        ),
    ));

    let borrowed: Vec<(&str, String)> = entries
        .iter()
        .map(|(n, b)| (n.as_str(), b.clone()))
        .collect();
    zip_of(&borrowed)
}

struct Workspace {
    _tmp: tempfile::TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("inbox");
        let output = tmp.path().join("converted");
        fs::create_dir_all(&input).unwrap();
        Self {
            _tmp: tmp,
            input,
            output,
        }
    }

    fn put(&self, rel: &str, bytes: impl AsRef<[u8]>) -> PathBuf {
        let path = self.input.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    fn config(&self) -> docfeed::PipelineConfigBuilder {
        PipelineConfig::builder(&self.input, &self.output)
            .delete_retry(RetryPolicy::new(3, Duration::from_millis(10)))
    }

    fn artifacts(&self) -> Vec<PathBuf> {
        let mut v: Vec<PathBuf> = fs::read_dir(&self.output)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        v.sort();
        v
    }
}

// ── Batch behaviour ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_files_one_corrupt_pdf() {
    let ws = Workspace::new();
    for i in 0..99 {
        ws.put(&format!("batch{}/note_{i}.txt", i % 5), format!("note {i}"));
    }
    let corrupt = ws.put("broken/report.pdf", b"%PDF-1.4 truncated garbage");

    let outcome = Scheduler::new(ws.config().workers(10).build().unwrap())
        .run_configured()
        .await
        .unwrap();

    assert_eq!(outcome.len(), 100);
    assert_eq!(outcome.stats.succeeded, 99);
    assert_eq!(outcome.stats.failed, 1);
    assert!(corrupt.exists(), "failed source must be retained");
    assert!(matches!(
        outcome.get(&corrupt),
        Some(ConversionResult::Failed(ConvertError::Extraction { .. }))
    ));
    assert_eq!(ws.artifacts().len(), 99);

    // batch0..batch4 are now empty and pruned; `broken` still holds its file.
    assert_eq!(outcome.stats.pruned_dirs, 5);
    assert!(ws.input.join("broken").exists());
    assert!(!ws.input.join("batch0").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pdf_converted_and_source_removed() {
    let ws = Workspace::new();
    let src = ws.put("letters/hello.pdf", minimal_pdf("Hello"));

    let outcome = Scheduler::new(ws.config().build().unwrap())
        .run_configured()
        .await
        .unwrap();

    let Some(ConversionResult::Success(outputs)) = outcome.get(&src) else {
        panic!("expected success, got {:?}", outcome.get(&src));
    };
    assert_eq!(
        outputs[0].file_name().unwrap().to_string_lossy(),
        unique_output_name(&src, "txt")
    );
    assert!(fs::read_to_string(&outputs[0]).unwrap().contains("Hello"));
    assert!(!src.exists());
    assert!(!ws.input.join("letters").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn workbook_with_empty_sheet_yields_one_csv() {
    let ws = Workspace::new();
    let rows: &[&[&str]] = &[&["Name", "City"], &["Ana", "Lima"], &["Bo", "Oslo"]];
    let empty: &[&[&str]] = &[];
    let src = ws.put("book.xlsx", minimal_xlsx(&[("Sheet1", rows), ("Empty", empty)]));

    let outcome = Scheduler::new(
        ws.config()
            .spreadsheet_format(SpreadsheetFormat::Csv)
            .build()
            .unwrap(),
    )
    .run_configured()
    .await
    .unwrap();

    let Some(ConversionResult::Success(outputs)) = outcome.get(&src) else {
        panic!("expected success, got {:?}", outcome.get(&src));
    };
    assert_eq!(outputs.len(), 1);
    assert_eq!(ws.artifacts(), outputs.clone());
    assert_eq!(
        fs::read_to_string(&outputs[0]).unwrap(),
        "name,city\nAna,Lima\nBo,Oslo\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mixed_tree_routes_every_category() {
    let ws = Workspace::new();
    let docx = ws.put("office/memo.docx", minimal_docx(&["First", "Second"]));
    let img = ws.put("media/photo.png", b"\x89PNG");
    let audio = ws.put("media/voice.m4a", b"ftyp");
    let unknown = ws.put("misc/archive.zip", b"PK");
    let script = ws.put("code/run.sh", b"#!/bin/sh\necho hi\n");

    let outcome = Scheduler::new(ws.config().build().unwrap())
        .run_configured()
        .await
        .unwrap();

    assert!(outcome.get(&docx).unwrap().is_success());
    assert!(outcome.get(&script).unwrap().is_success());
    assert_eq!(
        outcome.get(&img),
        Some(&ConversionResult::Skipped(SkipReason::ImageDiscarded))
    );
    assert_eq!(
        outcome.get(&audio),
        Some(&ConversionResult::Skipped(SkipReason::AudioDeferred))
    );
    assert_eq!(
        outcome.get(&unknown),
        Some(&ConversionResult::Skipped(SkipReason::Unsupported))
    );
    assert_eq!(outcome.stats.failed, 0);

    assert!(!img.exists());
    assert!(audio.exists());
    assert!(unknown.exists());
    assert!(!ws.input.join("office").exists());
    assert!(!ws.input.join("code").exists());
    assert!(ws.input.join("media").exists());

    let memo = ws
        .artifacts()
        .into_iter()
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("memo_"))
        .unwrap();
    assert_eq!(fs::read_to_string(memo).unwrap(), "First\nSecond");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_base_name_in_two_dirs_does_not_collide() {
    let ws = Workspace::new();
    ws.put("a/readme.md", "# A");
    ws.put("b/readme.md", "# B");

    let outcome = Scheduler::new(ws.config().build().unwrap())
        .run_configured()
        .await
        .unwrap();

    assert_eq!(outcome.stats.succeeded, 2);
    let artifacts = ws.artifacts();
    assert_eq!(artifacts.len(), 2);
    let contents: HashSet<String> = artifacts
        .iter()
        .map(|p| fs::read_to_string(p).unwrap())
        .collect();
    assert_eq!(contents, HashSet::from(["# A".to_string(), "# B".to_string()]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_run_is_a_no_op() {
    let ws = Workspace::new();
    ws.put("x/one.txt", "1");
    ws.put("y/two.py", "print(2)");
    let config = ws.config().build().unwrap();
    let scheduler = Scheduler::new(config);

    let first = scheduler.run_configured().await.unwrap();
    assert_eq!(first.stats.succeeded, 2);
    let artifacts_after_first = ws.artifacts();

    let second = scheduler.run_configured().await.unwrap();
    assert!(second.is_empty());
    assert_eq!(second.stats.pruned_dirs, 0);
    assert_eq!(ws.artifacts(), artifacts_after_first);
}

#[tokio::test]
async fn missing_input_root_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder(tmp.path().join("absent"), tmp.path().join("out"))
        .build()
        .unwrap();
    let err = Scheduler::new(config).run_configured().await.unwrap_err();
    assert!(matches!(err, PipelineError::InputNotFound { .. }));
}

// ── Upload after batch ───────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingIndex {
    existing: HashSet<String>,
    uploaded: Mutex<Vec<String>>,
    embedded: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl DocumentIndex for RecordingIndex {
    async fn wait_until_available(&self, _policy: &RetryPolicy) -> bool {
        true
    }

    async fn list_titles(&self) -> Result<HashSet<String>, PipelineError> {
        Ok(self.existing.clone())
    }

    async fn upload(&self, path: &Path) -> Result<Option<String>, PipelineError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.uploaded.lock().unwrap().push(name.clone());
        Ok(Some(format!("custom-documents/{name}.json")))
    }

    async fn update_embeddings(&self, adds: &[String]) -> Result<(), PipelineError> {
        self.embedded.lock().unwrap().push(adds.to_vec());
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_skips_already_indexed_artifacts() {
    let ws = Workspace::new();
    let old = ws.put("old.txt", "already indexed");
    ws.put("new.txt", "fresh");
    Scheduler::new(ws.config().build().unwrap())
        .run_configured()
        .await
        .unwrap();

    let old_title = format!(
        "{}.txt",
        Path::new(&unique_output_name(&old, "txt"))
            .file_stem()
            .unwrap()
            .to_string_lossy()
    );
    let index = RecordingIndex {
        existing: HashSet::from([old_title.clone()]),
        ..Default::default()
    };

    let report = upload_new_artifacts(&index, &ws.output).await.unwrap();

    assert_eq!(report.already_present, vec![old_title]);
    assert_eq!(report.uploaded.len(), 1);
    assert!(report.embeddings_updated);
    let uploaded = index.uploaded.lock().unwrap();
    assert_eq!(uploaded.len(), 1);
    assert!(uploaded[0].starts_with("new_"));
    assert_eq!(index.embedded.lock().unwrap().len(), 1);
}
