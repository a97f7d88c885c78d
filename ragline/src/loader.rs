//! Document loaders.
//!
//! A [`DocumentLoader`] turns a file on disk into one or more [`TextUnit`]s.
//! [`PdfLoader`] extracts PDF text with `pdf-extract`; [`TextLoader`] reads
//! UTF-8 files as-is.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::document::TextUnit;
use crate::error::{RagError, Result};

/// Reads a source document into text units.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the document at `source`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Load`] if the file is missing, unreadable or unparsable.
    async fn load(&self, source: &Path) -> Result<Vec<TextUnit>>;
}

fn load_error(source: &Path, message: impl Into<String>) -> RagError {
    RagError::Load { source_ref: source.display().to_string(), message: message.into() }
}

async fn read_bytes(source: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(source).await.map_err(|e| {
        error!(source = %source.display(), error = %e, "failed to read source");
        load_error(source, e.to_string())
    })
}

/// Extracts text from PDF files.
///
/// By default the whole document becomes a single [`TextUnit`] with pages
/// separated by a blank line. Enable [`split_pages`](PdfLoader::split_pages)
/// to get one unit per page instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader {
    split_pages: bool,
}

impl PdfLoader {
    /// Create a loader that returns one unit per document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return one unit per page (`true`) or per document (`false`).
    pub fn split_pages(mut self, split_pages: bool) -> Self {
        self.split_pages = split_pages;
        self
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, source: &Path) -> Result<Vec<TextUnit>> {
        let bytes = read_bytes(source).await?;
        let split_pages = self.split_pages;

        // pdf-extract is CPU-bound and synchronous.
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .map_err(|e| load_error(source, format!("extraction task failed: {e}")))?
        .map_err(|e| {
            error!(source = %source.display(), error = %e, "failed to parse pdf");
            load_error(source, format!("failed to parse pdf: {e}"))
        })?;

        let name = source.display().to_string();
        let units: Vec<TextUnit> = if split_pages {
            pages
                .iter()
                .enumerate()
                .map(|(i, text)| TextUnit::page(name.clone(), i + 1, text.trim()))
                .collect()
        } else {
            // Page breaks become paragraph breaks so words never fuse across pages.
            let text = pages
                .iter()
                .map(|page| page.trim())
                .filter(|page| !page.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n");
            vec![TextUnit::new(name.clone(), text)]
        };

        info!(source = %name, unit_count = units.len(), split_pages, "loaded pdf");
        Ok(units)
    }
}

/// Reads plain UTF-8 text files as a single unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, source: &Path) -> Result<Vec<TextUnit>> {
        let bytes = read_bytes(source).await?;
        let text = String::from_utf8(bytes)
            .map_err(|e| load_error(source, format!("not valid UTF-8: {e}")))?;
        debug!(source = %source.display(), text_len = text.len(), "loaded text file");
        Ok(vec![TextUnit::new(source.display().to_string(), text)])
    }
}

/// Pick a loader by file extension: `.pdf` gets a [`PdfLoader`], anything else a [`TextLoader`].
pub fn loader_for_path(path: &Path, split_pages: bool) -> Box<dyn DocumentLoader> {
    let is_pdf =
        path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        Box::new(PdfLoader::new().split_pages(split_pages))
    } else {
        Box::new(TextLoader)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ErrorKind;

    /// A minimal uncompressed PDF with one Helvetica text line per page.
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (i, text) in pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                5 + 2 * i
            ));
            let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
            objects.push(format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()));
        }

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
        }
        let xref_at = pdf.len();
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            tail.push_str(&format!("{offset:010} 00000 n \n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        ));
        pdf.extend_from_slice(tail.as_bytes());
        pdf
    }

    fn three_page_pdf() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(&pdf_with_pages(&["Alpha page one", "Beta page two", "Gamma page three"]))
            .unwrap();
        file
    }

    #[tokio::test]
    async fn whole_pdf_keeps_page_breaks() {
        let file = three_page_pdf();
        let units = PdfLoader::new().load(file.path()).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].page, None);
        assert_eq!(units[0].text, "Alpha page one\n\nBeta page two\n\nGamma page three");
        assert_eq!(units[0].source_ref(), file.path().display().to_string());
    }

    #[tokio::test]
    async fn split_pdf_yields_one_unit_per_page() {
        let file = three_page_pdf();
        let units = PdfLoader::new().split_pages(true).load(file.path()).await.unwrap();
        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, ["Alpha page one", "Beta page two", "Gamma page three"]);
        for (i, unit) in units.iter().enumerate() {
            assert_eq!(unit.page, Some(i + 1));
            assert!(unit.source_ref().ends_with(&format!("#page={}", i + 1)));
        }
    }

    #[tokio::test]
    async fn missing_pdf_is_a_load_error() {
        let err = PdfLoader::new().load(Path::new("/nonexistent/doc.pdf")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
    }

    #[tokio::test]
    async fn garbage_pdf_is_a_load_error() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"this is not a pdf").unwrap();
        let err = PdfLoader::new().load(file.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
    }

    #[tokio::test]
    async fn text_loader_reads_whole_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first line\nsecond line").unwrap();
        let units = TextLoader.load(file.path()).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "first line\nsecond line");
        assert_eq!(units[0].page, None);
    }

    #[tokio::test]
    async fn markdown_goes_through_text_loader() {
        let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        write!(file, "# Title").unwrap();
        let units = loader_for_path(file.path(), true).load(file.path()).await.unwrap();
        assert_eq!(units[0].text, "# Title");
    }
}
