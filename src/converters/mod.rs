//! Format converters and the extension routing table.
//!
//! ## Why one trait?
//!
//! Every supported format follows the same contract: read the source, emit
//! one or more artifacts into the flat output directory, and report a
//! [`ConversionResult`]. The [`Converter`] trait captures that contract so
//! the dispatcher can stay format-agnostic; [`ConverterRegistry`] maps each
//! [`FileCategory`] to the strategy configured for the batch.
//!
//! ## Routing
//!
//! ```text
//! extension ──▶ FileCategory ──▶ Converter
//!   pdf          Pdf              PdfConverter
//!   docx         Docx             DocxConverter
//!   doc          Doc              DocConverter (external tool)
//!   xls/xlsx     Spreadsheet      SpreadsheetConverter
//!   py/rs/…      Code  ┐
//!   txt/md       Text  ┘          PassthroughConverter
//!   jpg/png      Image            (none: deleted by the dispatcher)
//!   mp3/wav/…    Audio            (none: left in place)
//! ```

pub mod passthrough;
pub mod pdf;
pub mod spreadsheet;
pub mod table;
pub mod word;

use crate::config::PipelineConfig;
use crate::output::{ConversionResult, InputFile};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use passthrough::PassthroughConverter;
pub use pdf::PdfConverter;
pub use spreadsheet::SpreadsheetConverter;
pub use word::{DocConverter, DocxConverter};

// ── Categories ───────────────────────────────────────────────────────────

/// Coarse input category, derived from the lower-cased extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    Pdf,
    Docx,
    Doc,
    Spreadsheet,
    Code,
    Text,
    Image,
    Audio,
    Unknown,
}

/// Source-code extensions carried over verbatim.
pub const CODE_EXTENSIONS: &[&str] = &[
    "py", "java", "js", "c", "cpp", "cs", "rb", "go", "php", "yaml", "yml", "hcl", "ts", "swift",
    "kt", "rs", "scala", "pl", "sh", "bat", "ps1", "lua", "sql",
];

pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a"];

static EXTENSION_TABLE: Lazy<HashMap<&'static str, FileCategory>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert("pdf", FileCategory::Pdf);
    table.insert("docx", FileCategory::Docx);
    table.insert("doc", FileCategory::Doc);
    table.insert("xlsx", FileCategory::Spreadsheet);
    table.insert("xls", FileCategory::Spreadsheet);
    for ext in CODE_EXTENSIONS {
        table.insert(*ext, FileCategory::Code);
    }
    for ext in TEXT_EXTENSIONS {
        table.insert(*ext, FileCategory::Text);
    }
    for ext in IMAGE_EXTENSIONS {
        table.insert(*ext, FileCategory::Image);
    }
    for ext in AUDIO_EXTENSIONS {
        table.insert(*ext, FileCategory::Audio);
    }
    table
});

impl FileCategory {
    /// Look up a lower-cased extension (no leading dot).
    pub fn from_extension(ext: &str) -> Self {
        EXTENSION_TABLE
            .get(ext)
            .copied()
            .unwrap_or(FileCategory::Unknown)
    }
}

// ── Output directory ─────────────────────────────────────────────────────

/// The flat directory receiving artifacts.
///
/// Artifacts are written to a temp file inside the directory and persisted
/// under their final name, so concurrent readers never see a partial file.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Atomically write `contents` as `<root>/<name>` and return the path.
    pub fn write_artifact(&self, name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        let dest = self.root.join(name);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(contents)?;
        tmp.flush()?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(dest)
    }
}

// ── Converter trait ──────────────────────────────────────────────────────

/// A format-specific conversion strategy.
///
/// Implementations hold only immutable configuration and may be called from
/// many blocking threads at once. `convert` must never delete or modify the
/// source; the dispatcher owns that decision.
pub trait Converter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn convert(&self, input: &InputFile, out: &OutputDir) -> ConversionResult;
}

/// The converters active for one batch, keyed by category.
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<FileCategory, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    /// Registry for every convertible category, configured from `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let passthrough: Arc<dyn Converter> =
            Arc::new(PassthroughConverter::new(config.passthrough));
        let mut converters: HashMap<FileCategory, Arc<dyn Converter>> = HashMap::new();
        converters.insert(FileCategory::Pdf, Arc::new(PdfConverter));
        converters.insert(FileCategory::Docx, Arc::new(DocxConverter));
        converters.insert(
            FileCategory::Doc,
            Arc::new(DocConverter::new(
                config.doc_command.clone(),
                config.conversion_timeout,
            )),
        );
        converters.insert(
            FileCategory::Spreadsheet,
            Arc::new(SpreadsheetConverter::new(config.spreadsheet_format)),
        );
        converters.insert(FileCategory::Code, Arc::clone(&passthrough));
        converters.insert(FileCategory::Text, passthrough);
        Self { converters }
    }

    /// Replace or add the converter for `category`.
    pub fn register(&mut self, category: FileCategory, converter: Arc<dyn Converter>) {
        self.converters.insert(category, converter);
    }

    pub fn get(&self, category: FileCategory) -> Option<Arc<dyn Converter>> {
        self.converters.get(&category).cloned()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .converters
            .iter()
            .map(|(k, v)| format!("{k:?}={}", v.name()))
            .collect();
        names.sort();
        f.debug_struct("ConverterRegistry")
            .field("converters", &names)
            .finish()
    }
}
