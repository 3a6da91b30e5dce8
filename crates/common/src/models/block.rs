//! Content blocks produced by the upstream parser

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::OnceLock;

/// Kind of a parsed block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Header,
    Paragraph,
    List,
    Table,
    Caption,
    #[serde(rename = "image-ref", alias = "image_ref", alias = "image")]
    ImageRef,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Header => "header",
            BlockKind::Paragraph => "paragraph",
            BlockKind::List => "list",
            BlockKind::Table => "table",
            BlockKind::Caption => "caption",
            BlockKind::ImageRef => "image-ref",
        }
    }
}

/// One unit from the upstream parser. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    pub kind: BlockKind,
    #[serde(default)]
    pub text: String,
    pub page_number: u32,
    /// Only meaningful for headers; anything outside 1..=255 is malformed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_refs: Vec<String>,
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"\[IMAGE:\s*([^\]\s][^\]]*?)\s*\]").expect("image marker pattern is valid")
    })
}

/// Extract image identifiers from `[IMAGE: id]` markers, in order of appearance
pub fn image_markers(text: &str) -> Vec<String> {
    marker_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

impl ContentBlock {
    pub fn header(id: impl Into<String>, title: impl Into<String>, level: i32, page: u32) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::Header,
            text: title.into(),
            page_number: page,
            header_level: Some(level),
            image_refs: Vec::new(),
        }
    }

    pub fn paragraph(id: impl Into<String>, text: impl Into<String>, page: u32) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::Paragraph,
            text: text.into(),
            page_number: page,
            header_level: None,
            image_refs: Vec::new(),
        }
    }

    pub fn image_ref(id: impl Into<String>, image_id: impl Into<String>, page: u32) -> Self {
        Self {
            id: id.into(),
            kind: BlockKind::ImageRef,
            text: String::new(),
            page_number: page,
            header_level: None,
            image_refs: vec![image_id.into()],
        }
    }

    pub fn with_image_refs(mut self, refs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.image_refs = refs.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_header(&self) -> bool {
        self.kind == BlockKind::Header
    }

    /// Every image this block refers to: explicit refs first, then text markers
    pub fn image_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.image_refs.len());
        for id in self.image_refs.iter().cloned().chain(image_markers(&self.text)) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Text this block contributes to its section's working string.
    ///
    /// Image-ref blocks without text render one marker per referenced image.
    pub fn chunk_text(&self) -> Cow<'_, str> {
        if self.kind == BlockKind::ImageRef && self.text.trim().is_empty() {
            let markers: Vec<String> = self
                .image_refs
                .iter()
                .map(|id| format!("[IMAGE: {}]", id))
                .collect();
            Cow::Owned(markers.join("\n"))
        } else {
            Cow::Borrowed(self.text.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_markers() {
        let text = "See [IMAGE: img-1] and [IMAGE:img-2 ] but not [IMAGE: ].";
        assert_eq!(image_markers(text), vec!["img-1", "img-2"]);
        assert!(image_markers("no markers here").is_empty());
    }

    #[test]
    fn test_image_ids_union_without_duplicates() {
        let block = ContentBlock::paragraph("b1", "Chart [IMAGE: a] next to [IMAGE: b]", 2)
            .with_image_refs(["b", "c"]);
        assert_eq!(block.image_ids(), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_empty_image_ref_renders_marker() {
        let block = ContentBlock::image_ref("b9", "img-9", 4);
        assert_eq!(block.chunk_text(), "[IMAGE: img-9]");
        assert_eq!(block.image_ids(), vec!["img-9"]);
    }

    #[test]
    fn test_kind_serde_names() {
        let block: ContentBlock = serde_json::from_str(
            r#"{"id": "x", "kind": "image-ref", "page_number": 1, "image_refs": ["i"]}"#,
        )
        .unwrap();
        assert_eq!(block.kind, BlockKind::ImageRef);
        assert_eq!(block.text, "");

        let header: ContentBlock = serde_json::from_str(
            r#"{"id": "h", "kind": "header", "text": "Intro", "page_number": 1, "header_level": 2}"#,
        )
        .unwrap();
        assert!(header.is_header());
        assert_eq!(header.header_level, Some(2));
    }
}
