//! Source Document Loading
//!
//! Discovers source documents in a directory and turns each into
//! page-numbered plain text. PDFs go through the `pdftotext` binary
//! from poppler; plain-text files are read directly.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

/// Extensions accepted by `discover_documents`
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

/// Page separator emitted by pdftotext
const FORM_FEED: char = '\u{c}';

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("Text extraction failed for {file}: {reason}")]
    Extraction { file: String, reason: String },
}

/// A source document as page-numbered plain text.
///
/// `pages[0]` is page 1. Numbering restarts for every document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name used in citations
    pub source_file: String,
    pub pages: Vec<String>,
}

impl Document {
    pub fn new(source_file: impl Into<String>, pages: Vec<String>) -> Self {
        Self {
            source_file: source_file.into(),
            pages,
        }
    }

    /// Build a document from text that uses form feeds as page breaks.
    pub fn from_paged_text(source_file: impl Into<String>, text: &str) -> Self {
        let mut pages: Vec<String> = text.split(FORM_FEED).map(str::to_string).collect();
        // pdftotext terminates the last page with a form feed too
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Self::new(source_file, pages)
    }
}

/// List supported documents directly inside `dir`, sorted by file name.
pub fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    let mut found = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();

        // Skip hidden files
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        if !entry.metadata()?.is_file() {
            continue;
        }

        if SUPPORTED_EXTENSIONS.contains(&extension_of(&path).as_str()) {
            found.push(path);
        }
    }

    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = found.len(), "Discovered documents");
    Ok(found)
}

/// Load one document from disk.
pub fn load_document(path: &Path) -> Result<Document, LoaderError> {
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match extension_of(path).as_str() {
        "pdf" => {
            let text = extract_pdf_text(path, &source_file)?;
            Ok(Document::from_paged_text(source_file, &text))
        }
        "txt" | "md" => {
            let text = fs::read_to_string(path)?;
            Ok(Document::from_paged_text(source_file, &text))
        }
        other => Err(LoaderError::UnsupportedType(other.to_string())),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn extract_pdf_text(path: &Path, source_file: &str) -> Result<String, LoaderError> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .map_err(|e| LoaderError::Extraction {
            file: source_file.to_string(),
            reason: format!("could not run pdftotext: {} (is poppler installed?)", e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(file = %source_file, error = %stderr, "pdftotext failed");
        return Err(LoaderError::Extraction {
            file: source_file.to_string(),
            reason: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
