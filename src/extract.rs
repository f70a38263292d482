//! Document conversion into page-tagged text blocks.
//!
//! | Extension | Blocks | Page numbers |
//! |-----------|--------|--------------|
//! | `.pdf` | paragraphs of each page | form-feed page breaks |
//! | `.docx` | `w:p` paragraphs | explicit `w:br w:type="page"` breaks |
//! | `.pptx` | `a:p` paragraphs of each slide | slide number |
//! | `.md`, `.markdown`, `.txt` | blank-line paragraphs | always 1 |
//!
//! Conversion is a black box behind [`DocumentConverter`]; the indexer only
//! sees [`RawBlock`]s. [`extract_blocks`] then applies the size policy
//! (oversized split, minimum length) and [`category_for_path`] derives the
//! access category from the file's location under the sync root.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use quick_xml::events::Event;
use thiserror::Error;

use crate::chunk::{split_oversized, split_paragraphs};
use crate::config::IndexingConfig;
use crate::models::{Block, EXTERNAL, UNCATEGORIZED};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// A block as produced by a converter, before the size policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub text: String,
    pub page_no: Option<u32>,
}

impl RawBlock {
    fn new(text: impl Into<String>, page_no: Option<u32>) -> Self {
        Self {
            text: text.into(),
            page_no,
        }
    }
}

/// Turns a file on disk into text blocks.
pub trait DocumentConverter: Send + Sync {
    fn convert(&self, path: &Path) -> Result<Vec<RawBlock>, ExtractError>;
}

/// Converter for the built-in formats listed in the module docs.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinConverter;

impl DocumentConverter for BuiltinConverter {
    fn convert(&self, path: &Path) -> Result<Vec<RawBlock>, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => convert_pdf(&std::fs::read(path)?),
            "docx" => convert_docx(&std::fs::read(path)?),
            "pptx" => convert_pptx(&std::fs::read(path)?),
            "md" | "markdown" | "txt" => {
                let bytes = std::fs::read(path)?;
                Ok(convert_text(&String::from_utf8_lossy(&bytes)))
            }
            _ => Err(ExtractError::Unsupported(path.display().to_string())),
        }
    }
}

/// Convert `path` and apply the size policy: blocks are trimmed, oversized
/// blocks split to `max_block_chars`, and anything shorter than
/// `min_content_chars` dropped. Missing page numbers default to 1.
pub fn extract_blocks(
    converter: &dyn DocumentConverter,
    path: &Path,
    config: &IndexingConfig,
) -> Result<Vec<Block>, ExtractError> {
    let raw = converter.convert(path)?;
    let mut blocks = Vec::new();

    for block in raw {
        let page_no = block.page_no.unwrap_or(1).max(1);
        for piece in split_oversized(&block.text, config.max_block_chars) {
            if piece.chars().count() < config.min_content_chars {
                continue;
            }
            blocks.push(Block {
                text: piece,
                page_no,
            });
        }
    }

    Ok(blocks)
}

/// Derive the access category of `path` from its parent folder relative
/// to `root`, joined with `/`.
///
/// ```rust
/// use std::path::Path;
/// use scoped_rag::extract::category_for_path;
///
/// let root = Path::new("downloads");
/// assert_eq!(category_for_path(Path::new("downloads/HR/Policies/x.pdf"), root), "HR/Policies");
/// assert_eq!(category_for_path(Path::new("downloads/x.pdf"), root), "Uncategorized");
/// assert_eq!(category_for_path(Path::new("elsewhere/x.pdf"), root), "External");
/// ```
pub fn category_for_path(path: &Path, root: &Path) -> String {
    let path = lexical(path);
    let root = lexical(root);

    let relative = match path.strip_prefix(&root) {
        Ok(rel) => rel,
        Err(_) => return EXTERNAL.to_string(),
    };

    let parts: Vec<String> = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    if parts.is_empty() {
        UNCATEGORIZED.to_string()
    } else {
        parts.join("/")
    }
}

/// Drop `.` components so `./downloads/x` and `downloads/x` compare equal.
pub(crate) fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn convert_text(text: &str) -> Vec<RawBlock> {
    split_paragraphs(text)
        .into_iter()
        .map(|p| RawBlock::new(p, None))
        .collect()
}

fn convert_pdf(bytes: &[u8]) -> Result<Vec<RawBlock>, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut blocks = Vec::new();
    for (index, page) in text.split('\u{0C}').enumerate() {
        let page_no = index as u32 + 1;
        blocks.extend(
            split_paragraphs(page)
                .into_iter()
                .map(|p| RawBlock::new(p, Some(page_no))),
        );
    }
    Ok(blocks)
}

type ZipReader<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_zip(bytes: &[u8]) -> Result<ZipReader<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut ZipReader<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn convert_docx(bytes: &[u8]) -> Result<Vec<RawBlock>, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    let paragraphs = ooxml_paragraphs(&xml, true)?;
    Ok(paragraphs
        .into_iter()
        .map(|(text, page)| RawBlock::new(text, Some(page)))
        .collect())
}

fn convert_pptx(bytes: &[u8]) -> Result<Vec<RawBlock>, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .filter_map(|n| {
            n.trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .ok()
                .map(|num| (num, n.to_string()))
        })
        .collect();
    slides.sort();

    let mut blocks = Vec::new();
    for (slide_no, name) in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        for (text, _) in ooxml_paragraphs(&xml, false)? {
            blocks.push(RawBlock::new(text, Some(slide_no)));
        }
    }
    Ok(blocks)
}

/// Collect the text of every `<*:p>` paragraph from its `<*:t>` runs.
///
/// With `track_pages`, explicit page breaks advance the page counter; the
/// returned page is the one the paragraph starts on.
fn ooxml_paragraphs(xml: &[u8], track_pages: bool) -> Result<Vec<(String, u32)>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut paragraph_page = 1u32;
    let mut page = 1u32;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    current.clear();
                    paragraph_page = page;
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if track_pages && name.as_ref() == b"br" && is_page_break(&e) {
                    page += 1;
                } else if matches!(name.as_ref(), b"br" | b"tab") && !current.is_empty() {
                    current.push(' ');
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push((text.to_string(), paragraph_page));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn is_page_break(e: &quick_xml::events::BytesStart<'_>) -> bool {
    e.attributes().flatten().any(|a| {
        a.key.local_name().as_ref() == b"type" && a.value.as_ref() == b"page"
    })
}
