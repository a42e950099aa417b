//! Page/block model for layout-analyzed documents, and the ingestor that
//! builds it from the analyzer's JSON output.
//!
//! The analyzer emits a top-level object with a `pdf_info` array; each page
//! carries a 0-based `page_idx` and a `para_blocks` array of typed blocks
//! whose text lives in `lines[].spans[].content` (optionally nested one
//! level under `blocks`). Parsing is a pure function: no I/O, no partial
//! state on failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("invalid layout input: {0}")]
    InvalidLayoutInput(String),
}

/// Block categories emitted by the layout analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Title,
    Text,
    Table,
    Figure,
}

impl BlockKind {
    fn from_analyzer(kind: &str) -> Self {
        match kind {
            "title" => BlockKind::Title,
            "table" => BlockKind::Table,
            "figure" | "image" => BlockKind::Figure,
            // Unknown analyzer types degrade to plain text.
            _ => BlockKind::Text,
        }
    }
}

/// A single layout block with its assembled text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub bbox: [f64; 4],
    pub text: String,
    pub level: Option<i32>,
}

/// One page of the analyzed document. `page_index` is 0-based; callers
/// present pages 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutPage {
    pub page_index: usize,
    pub blocks: Vec<Block>,
}

impl LayoutPage {
    /// 1-based page number.
    pub fn page_number(&self) -> u32 {
        self.page_index as u32 + 1
    }
}

/// The full analyzed document, pages in reading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub total_pages: usize,
    pub pages: Vec<LayoutPage>,
}

impl LayoutDocument {
    pub fn total_pages(&self) -> u32 {
        self.total_pages as u32
    }
}

#[derive(Deserialize)]
struct RawSpan {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawLine {
    #[serde(default)]
    spans: Vec<RawSpan>,
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    bbox: Option<[f64; 4]>,
    #[serde(default)]
    lines: Vec<RawLine>,
    #[serde(default)]
    blocks: Vec<RawBlock>,
    #[serde(default)]
    level: Option<i32>,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    page_idx: Option<i64>,
    #[serde(default)]
    para_blocks: Vec<RawBlock>,
}

#[derive(Deserialize)]
struct RawLayout {
    #[serde(default)]
    pdf_info: Option<Vec<RawPage>>,
}

fn assemble_text(block: &RawBlock) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for line in &block.lines {
        for span in &line.spans {
            if let Some(content) = &span.content {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
            }
        }
    }
    for nested in &block.blocks {
        for line in &nested.lines {
            for span in &line.spans {
                if let Some(content) = &span.content {
                    let trimmed = content.trim();
                    if !trimmed.is_empty() {
                        parts.push(trimmed);
                    }
                }
            }
        }
    }
    parts.join(" ")
}

/// Parse analyzer JSON into a [`LayoutDocument`].
///
/// Blocks whose assembled text is empty (figures, decorative rules) are
/// dropped. A missing `pdf_info` array, an empty page list, or a page
/// without `page_idx` fails with [`LayoutError::InvalidLayoutInput`].
pub fn parse_layout(raw: &str) -> Result<LayoutDocument, LayoutError> {
    let parsed: RawLayout = serde_json::from_str(raw)
        .map_err(|e| LayoutError::InvalidLayoutInput(format!("malformed JSON: {e}")))?;

    let raw_pages = parsed
        .pdf_info
        .ok_or_else(|| LayoutError::InvalidLayoutInput("missing 'pdf_info' array".into()))?;

    if raw_pages.is_empty() {
        return Err(LayoutError::InvalidLayoutInput(
            "'pdf_info' contains no pages".into(),
        ));
    }

    let mut pages = Vec::with_capacity(raw_pages.len());
    for (position, raw_page) in raw_pages.iter().enumerate() {
        let page_idx = raw_page.page_idx.ok_or_else(|| {
            LayoutError::InvalidLayoutInput(format!("page at position {position} missing 'page_idx'"))
        })?;
        if page_idx < 0 {
            return Err(LayoutError::InvalidLayoutInput(format!(
                "page at position {position} has negative 'page_idx'"
            )));
        }

        let mut blocks = Vec::new();
        for raw_block in &raw_page.para_blocks {
            let text = assemble_text(raw_block);
            if text.is_empty() {
                continue;
            }
            blocks.push(Block {
                kind: BlockKind::from_analyzer(raw_block.kind.as_deref().unwrap_or("text")),
                bbox: raw_block.bbox.unwrap_or([0.0, 0.0, 0.0, 0.0]),
                text,
                level: raw_block.level,
            });
        }
        pages.push(LayoutPage {
            page_index: page_idx as usize,
            blocks,
        });
    }

    Ok(LayoutDocument {
        total_pages: pages.len(),
        pages,
    })
}
