use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};
use tracing::{debug, info};

mod command;
mod extract;
mod raster;

pub use extract::{parse_mutool_stext, parse_pdftotext_bbox};

pub const PDF_MIME: &str = "application/pdf";

/// One extracted word and its rectangle in page coordinates (points).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub text: String,
}

impl Token {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32, text: impl Into<String>) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            text: text.into(),
        }
    }
}

/// Words of a single page, in extraction order.
#[derive(Debug, Clone, Default)]
pub struct PageText {
    pub width: f32,
    pub height: f32,
    pub words: Vec<Token>,
}

/// Anything that can hand out per-page words and a rasterized page.
pub trait PageSource {
    fn page_count(&self) -> usize;
    fn words(&self, page: usize) -> Result<Vec<Token>>;
    fn rasterize(&self, page: usize, zoom: f32) -> Result<RgbaImage>;
}

impl<S: PageSource + ?Sized> PageSource for &S {
    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn words(&self, page: usize) -> Result<Vec<Token>> {
        (**self).words(page)
    }

    fn rasterize(&self, page: usize, zoom: f32) -> Result<RgbaImage> {
        (**self).rasterize(page, zoom)
    }
}

/// A PDF opened through the poppler/MuPDF command line tools.
///
/// Text is extracted for every page when the document is opened; pages are
/// rasterized on demand from a private copy of the file.
pub struct PdfDocument {
    _dir: TempDir,
    path: PathBuf,
    pages: Vec<PageText>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read pdf: {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure_pdf(bytes)?;
        let dir = tempdir().with_context(|| "failed to create temp dir for pdf")?;
        let path = dir.path().join("input.pdf");
        fs::write(&path, bytes).with_context(|| "failed to write temp pdf")?;

        let pages = extract::extract_pages(&path)?;
        if pages.is_empty() {
            return Err(anyhow!("no pages found in pdf"));
        }
        info!(
            "opened pdf with {} page(s), {} word(s)",
            pages.len(),
            pages.iter().map(|page| page.words.len()).sum::<usize>()
        );
        Ok(Self {
            _dir: dir,
            path,
            pages,
        })
    }

    pub fn page(&self, index: usize) -> Option<&PageText> {
        self.pages.get(index)
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn words(&self, page: usize) -> Result<Vec<Token>> {
        self.pages
            .get(page)
            .map(|page| page.words.clone())
            .ok_or_else(|| anyhow!("page {} out of range ({} pages)", page, self.pages.len()))
    }

    fn rasterize(&self, page: usize, zoom: f32) -> Result<RgbaImage> {
        if page >= self.pages.len() {
            return Err(anyhow!(
                "page {} out of range ({} pages)",
                page,
                self.pages.len()
            ));
        }
        debug!("rasterizing page {} at zoom {}", page + 1, zoom);
        raster::render_page(&self.path, page, zoom)
    }
}

fn ensure_pdf(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(anyhow!("pdf input is empty"));
    }
    match infer::get(bytes) {
        Some(kind) if kind.mime_type() == PDF_MIME => Ok(()),
        Some(kind) => Err(anyhow!(
            "input is not a pdf (detected {})",
            kind.mime_type()
        )),
        None => Err(anyhow!("input is not a pdf (unknown content)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = PdfDocument::from_bytes(b"\x89PNG\r\n\x1a\n0000").err().unwrap();
        assert!(err.to_string().contains("not a pdf"));
    }

    #[test]
    fn rejects_empty_input() {
        let err = PdfDocument::from_bytes(b"").err().unwrap();
        assert_eq!(err.to_string(), "pdf input is empty");
    }

    #[test]
    fn pdf_header_is_accepted_by_sniffer() {
        assert!(ensure_pdf(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n").is_ok());
    }
}
