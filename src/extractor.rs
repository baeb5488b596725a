use std::panic;
use std::path::{Path, PathBuf};

use crate::error::{LedgerError, Result};

const PAGE_BREAK: char = '\x0c';

/// A single line of statement text and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLine<'a> {
    pub page: usize,
    pub number: usize,
    pub text: &'a str,
}

/// Raw text of one statement, kept per page.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    pages: Vec<String>,
}

impl Document {
    /// Read a statement from disk. PDFs go through `pdf-extract`; `.txt` files are
    /// treated as already-extracted text with form feeds between pages.
    pub fn open(path: &Path) -> Result<Self> {
        let unreadable = |reason: String| LedgerError::UnreadableDocument {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| unreadable(e.to_string()))?;
        let pages = if is_text_dump(path) {
            let text = String::from_utf8(bytes).map_err(|e| unreadable(e.to_string()))?;
            text.split(PAGE_BREAK).map(str::to_string).collect()
        } else {
            extract_pdf_pages(&bytes).map_err(unreadable)?
        };

        let document = Self::from_pages(display_name(path), pages);
        if !document.has_text() {
            return Err(unreadable("no extractable text (scanned image?)".to_string()));
        }
        log::debug!("{}: {} page(s) extracted", document.name, document.pages.len());
        Ok(document)
    }

    pub fn from_pages(name: impl Into<String>, pages: Vec<String>) -> Self {
        Self {
            name: name.into(),
            pages,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn has_text(&self) -> bool {
        self.pages.iter().any(|p| !p.trim().is_empty())
    }

    /// Lines in reading order. Pages are split only as the iterator advances.
    pub fn lines(&self) -> impl Iterator<Item = TextLine<'_>> {
        self.pages.iter().enumerate().flat_map(|(page_idx, page)| {
            page.lines().enumerate().map(move |(line_idx, text)| TextLine {
                page: page_idx + 1,
                number: line_idx + 1,
                text: text.trim_end_matches('\r'),
            })
        })
    }
}

fn is_text_dump(path: &Path) -> bool {
    path.extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("txt"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn extract_pdf_pages(bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
    // pdf-extract panics on some malformed and encrypted files.
    match panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("PDF could not be decoded (corrupt or encrypted)".to_string()),
    }
}

/// Statement files in a folder, in file-name order.
pub fn statement_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension().map_or(false, |e| {
                e.eq_ignore_ascii_case("pdf") || e.eq_ignore_ascii_case("txt")
            })
        })
        .collect();
    files.sort();
    Ok(files)
}
