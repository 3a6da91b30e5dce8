//! Section hierarchy
//!
//! A [`SectionTree`] owns the nested [`SectionNode`]s. Parent links are
//! identifiers resolved through a document-scoped index, never pointers.

use super::{ContentBlock, SectionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Title of the synthetic root section
pub const ROOT_TITLE: &str = "Root";

/// One heading-delimited region of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionNode {
    pub id: SectionId,
    pub title: String,
    /// 0 for the synthetic root, 1 for top-level headers
    pub level: u8,
    pub parent_id: Option<SectionId>,
    /// Header block that opened this section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_block_id: Option<String>,
    pub page_start: u32,
    pub page_end: u32,
    #[serde(default)]
    pub children: Vec<SectionNode>,
    /// Blocks owned directly by this section, excluding descendants' blocks
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
}

impl SectionNode {
    /// Create the synthetic root
    pub fn root() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: ROOT_TITLE.to_string(),
            level: 0,
            parent_id: None,
            header_block_id: None,
            page_start: 1,
            page_end: 1,
            children: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn new(title: impl Into<String>, level: u8, parent_id: SectionId, page: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            level,
            parent_id: Some(parent_id),
            header_block_id: None,
            page_start: page,
            page_end: page,
            children: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Widen the page range to include `page`
    pub fn extend_pages(&mut self, page: u32) {
        self.page_start = self.page_start.min(page);
        self.page_end = self.page_end.max(page);
    }

    pub fn push_block(&mut self, block: ContentBlock) {
        self.extend_pages(block.page_number);
        self.blocks.push(block);
    }

    /// Attach a finished child, widening this section's page range
    pub fn push_child(&mut self, child: SectionNode) {
        self.extend_pages(child.page_start);
        self.extend_pages(child.page_end);
        self.children.push(child);
    }

    /// Whether any owned block carries non-whitespace text
    pub fn has_text(&self) -> bool {
        self.blocks.iter().any(|b| !b.chunk_text().trim().is_empty())
    }
}

/// Wire form of a tree; the index is rebuilt on load
#[derive(Deserialize)]
struct SectionTreeRepr {
    root: SectionNode,
}

impl From<SectionTreeRepr> for SectionTree {
    fn from(repr: SectionTreeRepr) -> Self {
        SectionTree::new(repr.root)
    }
}

/// Built once per document, immutable afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "SectionTreeRepr")]
pub struct SectionTree {
    root: SectionNode,
    /// Child-index path from the root to every section
    #[serde(skip)]
    index: HashMap<SectionId, Vec<usize>>,
}

impl PartialEq for SectionTree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl SectionTree {
    pub fn new(root: SectionNode) -> Self {
        let mut index = HashMap::new();
        let mut pending: Vec<(&SectionNode, Vec<usize>)> = vec![(&root, Vec::new())];
        while let Some((node, path)) = pending.pop() {
            for (i, child) in node.children.iter().enumerate() {
                let mut child_path = path.clone();
                child_path.push(i);
                pending.push((child, child_path));
            }
            index.insert(node.id, path);
        }
        Self { root, index }
    }

    pub fn root(&self) -> &SectionNode {
        &self.root
    }

    pub fn contains(&self, id: &SectionId) -> bool {
        self.index.contains_key(id)
    }

    pub fn find(&self, id: &SectionId) -> Option<&SectionNode> {
        let path = self.index.get(id)?;
        let mut node = &self.root;
        for &i in path {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    pub fn parent_of(&self, id: &SectionId) -> Option<&SectionNode> {
        let parent_id = self.find(id)?.parent_id?;
        self.find(&parent_id)
    }

    /// Ancestors from the direct parent up to the root
    pub fn ancestors(&self, id: &SectionId) -> Vec<&SectionNode> {
        let mut out = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(node) = current {
            out.push(node);
            current = node.parent_id.and_then(|pid| self.find(&pid));
        }
        out
    }

    /// Depth-first, parent before children, document order among siblings
    pub fn iter(&self) -> SectionIter<'_> {
        SectionIter {
            stack: vec![&self.root],
        }
    }

    pub fn section_count(&self) -> usize {
        self.index.len()
    }

    pub fn block_count(&self) -> usize {
        self.iter().map(|s| s.blocks.len()).sum()
    }

    /// Highest page seen anywhere in the tree
    pub fn last_page(&self) -> u32 {
        self.root.page_end
    }
}

/// Pre-order iterator over a [`SectionTree`]
pub struct SectionIter<'a> {
    stack: Vec<&'a SectionNode>,
}

impl<'a> Iterator for SectionIter<'a> {
    type Item = &'a SectionNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
