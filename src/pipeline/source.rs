//! Page sources: turn a stored file into ordered page texts.
//!
//! Two implementations:
//!
//! * [`PdfiumTextSource`] reads a PDF's text layer with pdfium. pdfium is a
//!   blocking C++ library with thread-local state, so all work happens in
//!   `tokio::task::spawn_blocking`.
//! * [`FormFeedTextSource`] reads text that was already extracted (for
//!   example `pdftotext` output) where pages are separated by form feeds.
//!
//! Both validate the path first so callers get a typed error (missing file,
//! permission denied, not a PDF) rather than a library crash.

use crate::error::ImportError;
use crate::model::PageText;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Page separator in pre-extracted text.
pub const FORM_FEED: char = '\x0c';

/// Produces the ordered page texts of a document.
#[async_trait]
pub trait PdfTextSource: Send + Sync {
    /// Pages in document order, numbered from 1. Fails when the file cannot
    /// be read.
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ImportError>;
}

/// Check that `path` exists and is readable; with `expect_pdf`, also check
/// the `%PDF` magic bytes.
pub fn check_readable(path: &Path, expect_pdf: bool) -> Result<(), ImportError> {
    let path_buf = path.to_path_buf();
    if !path.exists() {
        return Err(ImportError::FileNotFound { path: path_buf });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            if expect_pdf {
                let mut magic = [0u8; 4];
                if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                    return Err(ImportError::NotAPdf {
                        path: path_buf,
                        magic,
                    });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ImportError::PermissionDenied { path: path_buf });
        }
        Err(_) => {
            return Err(ImportError::FileNotFound { path: path_buf });
        }
    }

    debug!("Readable source: {}", path.display());
    Ok(())
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Text-layer extraction through pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextSource {
    password: Option<String>,
}

impl PdfiumTextSource {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl PdfTextSource for PdfiumTextSource {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ImportError> {
        check_readable(path, true)?;

        let path = path.to_path_buf();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || extract_pages_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| ImportError::Internal(format!("Text extraction task panicked: {}", e)))?
    }
}

fn extract_pages_blocking(pdf_path: &Path, password: Option<&str>) -> Result<Vec<PageText>, ImportError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password, e))?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page.text().map_err(|e| ImportError::TextExtraction {
            path: pdf_path.to_path_buf(),
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        let content = text.all();
        debug!("Page {}: {} chars", idx + 1, content.chars().count());
        texts.push(PageText::new(idx + 1, content));
    }

    Ok(texts)
}

fn load_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> ImportError {
    let detail = format!("{:?}", e);
    let path = pdf_path.to_path_buf();
    if detail.contains("Password") || detail.contains("password") {
        if password.is_some() {
            ImportError::WrongPassword { path }
        } else {
            ImportError::PasswordRequired { path }
        }
    } else {
        ImportError::CorruptPdf { path, detail }
    }
}

// ── pre-extracted text ───────────────────────────────────────────────────

/// Plain text with pages separated by form feeds (`\x0c`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FormFeedTextSource;

/// Split pre-extracted text into pages. A trailing page that is empty after
/// trimming (the form feed `pdftotext` writes after the last page) is dropped.
pub fn split_pages(text: &str) -> Vec<PageText> {
    let mut parts: Vec<&str> = text.split(FORM_FEED).collect();
    if parts.last().is_some_and(|p| p.trim().is_empty()) {
        parts.pop();
    }
    PageText::numbered(parts)
}

#[async_trait]
impl PdfTextSource for FormFeedTextSource {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ImportError> {
        check_readable(path, false)?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| read_error(path.to_path_buf(), e))?;
        let text = String::from_utf8_lossy(&bytes);
        let pages = split_pages(&text);
        info!("Read {} pages from {}", pages.len(), path.display());
        Ok(pages)
    }
}

fn read_error(path: PathBuf, e: std::io::Error) -> ImportError {
    match e.kind() {
        std::io::ErrorKind::NotFound => ImportError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => ImportError::PermissionDenied { path },
        _ => ImportError::TextExtraction {
            path,
            detail: e.to_string(),
        },
    }
}
