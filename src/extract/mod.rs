// Document extraction
// Turns files on disk into ordered pages of plain text keyed by file extension


use async_trait::async_trait;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::chunking::{Metadata, Page};
use crate::{DocsError, Result};

/// Metadata key holding the file path a page came from
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the 0-based page number of a PDF page
pub const PAGE_KEY: &str = "page";

/// Maximum decompressed bytes read from `word/document.xml`
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Loader-level view of a file type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentFormat {
    /// Picks a loader from the path's extension, case-insensitively
    #[inline]
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "txt" | "md" => Ok(Self::PlainText),
            _ => Err(DocsError::UnsupportedFormat {
                path: path.display().to_string(),
                extension,
            }),
        }
    }
}

/// Source of pages for the ingestion pipeline
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Vec<Page>>;
}

/// Extractor reading PDF, DOCX and plain-text files from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExtractor;

#[async_trait]
impl DocumentExtractor for FileExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        let format = DocumentFormat::from_path(path)?;
        let source = path.display().to_string();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| extraction_error(&source, format!("failed to read file: {e}")))?;

        let parse_source = source.clone();
        let pages = tokio::task::spawn_blocking(move || {
            extract_pages(&bytes, format, &parse_source)
        })
        .await
        .map_err(|e| extraction_error(&source, format!("extraction task failed: {e}")))??;

        debug!("Loaded {} pages from {}", pages.len(), source);
        Ok(pages)
    }
}

/// Parses in-memory file content into pages tagged with `source`
#[inline]
pub fn extract_pages(bytes: &[u8], format: DocumentFormat, source: &str) -> Result<Vec<Page>> {
    match format {
        DocumentFormat::Pdf => {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| extraction_error(source, format!("PDF extraction failed: {e}")))?;
            Ok(split_pdf_pages(&text, source))
        }
        DocumentFormat::Docx => {
            let text = extract_docx_text(bytes).map_err(|message| extraction_error(source, message))?;
            Ok(vec![Page::new(text, source_metadata(source))])
        }
        DocumentFormat::PlainText => {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| extraction_error(source, format!("file is not valid UTF-8: {e}")))?;
            Ok(vec![Page::new(text, source_metadata(source))])
        }
    }
}

/// One page per form feed emitted by the PDF text layer
fn split_pdf_pages(text: &str, source: &str) -> Vec<Page> {
    let text = text.strip_suffix('\u{c}').unwrap_or(text);
    text.split('\u{c}')
        .enumerate()
        .map(|(index, page_text)| {
            let mut metadata = source_metadata(source);
            metadata.insert(PAGE_KEY.to_string(), index.to_string());
            Page::new(page_text, metadata)
        })
        .collect()
}

fn source_metadata(source: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), source.to_string());
    metadata
}

fn extraction_error(path: &str, message: String) -> DocsError {
    DocsError::Extraction {
        path: path.to_string(),
        message,
    }
}

fn extract_docx_text(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| e.to_string())?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err("word/document.xml exceeds size limit".to_string());
    }

    paragraphs_from_document_xml(&doc_xml)
}

/// Collects `w:t` runs, ending each `w:p` with a blank line so paragraph breaks survive
fn paragraphs_from_document_xml(xml: &[u8]) -> std::result::Result<String, String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
