//! Word documents → plain text.
//!
//! `.docx` is an OOXML zip; the body lives in `word/document.xml` and is
//! walked with `quick-xml`. Legacy binary `.doc` has no pure-Rust reader,
//! so it goes through an external command (default `antiword`) that prints
//! the text to stdout.

use super::{Converter, OutputDir};
use crate::error::ConvertError;
use crate::output::{ConversionResult, InputFile, SkipReason};
use crate::pipeline::naming::unique_output_name;
use quick_xml::events::Event;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum decompressed size of `word/document.xml` (zip-bomb guard).
const MAX_DOCUMENT_XML_BYTES: u64 = 64 * 1024 * 1024;

/// How often a running `.doc` tool is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

// ── DOCX ─────────────────────────────────────────────────────────────────

pub struct DocxConverter;

impl Converter for DocxConverter {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn convert(&self, input: &InputFile, out: &OutputDir) -> ConversionResult {
        let text = match read_docx_text(&input.path) {
            Ok(text) => text,
            Err(e) => return ConversionResult::Failed(e),
        };
        write_text(input, out, &text)
    }
}

fn read_docx_text(path: &Path) -> Result<String, ConvertError> {
    let format_err = |detail: String| ConvertError::Format {
        path: path.to_path_buf(),
        detail,
    };

    let file = std::fs::File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format_err(format!("not a zip container: {e}")))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| format_err("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_DOCUMENT_XML_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ConvertError::io(path, e))?;
    if xml.len() as u64 >= MAX_DOCUMENT_XML_BYTES {
        return Err(format_err("word/document.xml exceeds size limit".to_string()));
    }

    paragraphs_text(&xml).map_err(format_err)
}

/// Paragraph text in document order, one line per `w:p`.
///
/// Runs inside a paragraph are concatenated; `w:tab` becomes `\t` and
/// `w:br` a line break within the paragraph. A paragraph nested in a text
/// box gets its own line after the paragraph that anchors it.
fn paragraphs_text(xml: &[u8]) -> Result<String, String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    // Whitespace inside w:t is content.
    reader.config_mut().trim_text(false);

    let mut paragraphs: Vec<String> = Vec::new();
    // Open paragraphs, innermost last. Text boxes (`w:txbxContent`) nest
    // whole paragraphs inside a run of the enclosing one; each open
    // paragraph owns the output slot reserved when it started.
    let mut open: Vec<(usize, String)> = Vec::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    paragraphs.push(String::new());
                    open.push((paragraphs.len() - 1, String::new()));
                }
                b"t" => in_text = true,
                b"tab" => push_str(&mut open, "\t"),
                b"br" | b"cr" => push_str(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => push_str(&mut open, "\t"),
                b"br" | b"cr" => push_str(&mut open, "\n"),
                // Self-closing paragraph: an empty line.
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                push_str(&mut open, &text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some((slot, text)) = open.pop() {
                        paragraphs[slot] = text;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed document.xml: {e}")),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

fn push_str(open: &mut [(usize, String)], s: &str) {
    if let Some((_, current)) = open.last_mut() {
        current.push_str(s);
    }
}

// ── Legacy DOC ───────────────────────────────────────────────────────────

/// Legacy `.doc` via an external text dumper.
///
/// The child is killed once `deadline` passes, so a hung tool never outlives
/// the conversion that started it.
pub struct DocConverter {
    command: String,
    deadline: Duration,
}

impl DocConverter {
    pub fn new(command: impl Into<String>, deadline: Duration) -> Self {
        Self {
            command: command.into(),
            deadline,
        }
    }
}

impl Converter for DocConverter {
    fn name(&self) -> &'static str {
        "doc"
    }

    fn convert(&self, input: &InputFile, out: &OutputDir) -> ConversionResult {
        debug!("Running {} on {}", self.command, input.path.display());
        let tool_err = |detail: String| ConvertError::ExternalTool {
            path: input.path.clone(),
            tool: self.command.clone(),
            detail,
        };

        let child = Command::new(&self.command)
            .arg(&input.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return ConversionResult::Failed(tool_err(e.to_string())),
        };

        let output = match wait_with_deadline(child, self.deadline) {
            Ok(Some(output)) => output,
            Ok(None) => {
                warn!(
                    "{} exceeded {:?} on {}, killed",
                    self.command,
                    self.deadline,
                    input.path.display()
                );
                return ConversionResult::Failed(ConvertError::Timeout {
                    path: input.path.clone(),
                    limit: self.deadline,
                });
            }
            Err(e) => return ConversionResult::Failed(tool_err(e.to_string())),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return ConversionResult::Failed(tool_err(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        write_text(input, out, &text)
    }
}

/// Poll `child` until it exits or `deadline` passes.
///
/// Pipes are drained on their own threads so a chatty tool cannot block on
/// a full pipe. Returns `Ok(None)` after killing and reaping a child that
/// ran past the deadline.
fn wait_with_deadline(mut child: Child, deadline: Duration) -> std::io::Result<Option<Output>> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let started = Instant::now();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= deadline {
            // kill() fails only if the child already exited; wait() reaps it either way.
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    Ok(Some(Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    }))
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut bytes);
        }
        bytes
    })
}

// ── Shared ───────────────────────────────────────────────────────────────

fn write_text(input: &InputFile, out: &OutputDir, text: &str) -> ConversionResult {
    if text.trim().is_empty() {
        info!("{}: document has no text, leaving in place", input.path.display());
        return ConversionResult::Skipped(SkipReason::EmptyDocument);
    }
    let name = unique_output_name(&input.path, "txt");
    match out.write_artifact(&name, text.as_bytes()) {
        Ok(path) => ConversionResult::Success(vec![path]),
        Err(e) => ConversionResult::Failed(ConvertError::io(&input.path, e)),
    }
}
