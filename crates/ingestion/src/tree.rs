//! Section tree construction
//!
//! Turns the parser's flat block stream into nested sections with a single
//! top-to-bottom pass over an explicit stack of open sections.

use paperlink_common::config::{PreamblePolicy, TreeConfig};
use paperlink_common::models::{BlockKind, ContentBlock, SectionNode, SectionTree, StructuralAnomaly};
use tracing::debug;

/// Title of the synthetic section holding pre-header content
pub const PREAMBLE_TITLE: &str = "Preamble";

const UNTITLED: &str = "Untitled";

/// Result of building a tree: the tree plus everything that was absorbed
#[derive(Debug, Clone)]
pub struct TreeBuild {
    pub tree: SectionTree,
    pub anomalies: Vec<StructuralAnomaly>,
}

enum Classified {
    Header { level: u8, block: ContentBlock },
    Body(ContentBlock),
}

/// Headers without a usable level (missing, below 1 or above 255) are
/// demoted to paragraphs
fn classify(mut block: ContentBlock, anomalies: &mut Vec<StructuralAnomaly>) -> Classified {
    if !block.is_header() {
        return Classified::Body(block);
    }

    match block.header_level.map(|raw| (raw, u8::try_from(raw))) {
        Some((_, Ok(level))) if level >= 1 => Classified::Header { level, block },
        Some((level, _)) => {
            anomalies.push(StructuralAnomaly::InvalidHeaderLevel {
                block_id: block.id.clone(),
                level,
            });
            block.kind = BlockKind::Paragraph;
            block.header_level = None;
            Classified::Body(block)
        }
        None => {
            anomalies.push(StructuralAnomaly::MissingHeaderLevel {
                block_id: block.id.clone(),
            });
            block.kind = BlockKind::Paragraph;
            Classified::Body(block)
        }
    }
}

fn clean_title(raw: &str, max_chars: usize) -> String {
    let title: String = raw.trim().chars().take(max_chars).collect();
    let title = title.trim_end().to_string();
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

/// Root plus the chain of currently open sections, innermost last
struct OpenSections {
    root: SectionNode,
    open: Vec<SectionNode>,
}

impl OpenSections {
    fn new() -> Self {
        Self {
            root: SectionNode::root(),
            open: Vec::new(),
        }
    }

    fn current(&mut self) -> &mut SectionNode {
        match self.open.last_mut() {
            Some(section) => section,
            None => &mut self.root,
        }
    }

    fn close_innermost(&mut self, anomalies: &mut Vec<StructuralAnomaly>) {
        let Some(done) = self.open.pop() else {
            return;
        };
        if done.blocks.is_empty() && done.children.is_empty() {
            anomalies.push(StructuralAnomaly::EmptySection {
                section_id: done.id,
                title: done.title.clone(),
            });
        }
        self.current().push_child(done);
    }

    /// Pop every open section at `level` or deeper, then open a new one
    fn open_section(
        &mut self,
        level: u8,
        title: String,
        header_block_id: Option<String>,
        page: u32,
        anomalies: &mut Vec<StructuralAnomaly>,
    ) {
        while self.open.last().is_some_and(|s| s.level >= level) {
            self.close_innermost(anomalies);
        }
        let parent_id = self.current().id;
        let mut section = SectionNode::new(title, level, parent_id, page);
        section.header_block_id = header_block_id;
        self.open.push(section);
    }

    fn finish(mut self, anomalies: &mut Vec<StructuralAnomaly>) -> SectionNode {
        while !self.open.is_empty() {
            self.close_innermost(anomalies);
        }
        self.root
    }
}

/// Build the section tree for one document.
///
/// Every kept block ends up in exactly one section. Header levels are used
/// as given, skipped levels included.
pub fn build_tree(blocks: Vec<ContentBlock>, config: &TreeConfig) -> TreeBuild {
    let mut anomalies = Vec::new();

    if blocks.is_empty() {
        anomalies.push(StructuralAnomaly::EmptyDocument);
        return TreeBuild {
            tree: SectionTree::new(SectionNode::root()),
            anomalies,
        };
    }

    let classified: Vec<Classified> = blocks
        .into_iter()
        .map(|b| classify(b, &mut anomalies))
        .collect();
    let has_headers = classified
        .iter()
        .any(|c| matches!(c, Classified::Header { .. }));

    let mut sections = OpenSections::new();
    let mut seen_header = false;
    let mut dropped = 0usize;

    for item in classified {
        match item {
            Classified::Header { level, block } => {
                // Preamble holds only what precedes the first header
                if !seen_header && !sections.open.is_empty() {
                    sections.close_innermost(&mut anomalies);
                }
                seen_header = true;
                let title = clean_title(&block.text, config.max_title_chars);
                sections.open_section(level, title, Some(block.id), block.page_number, &mut anomalies);
            }
            Classified::Body(block) if seen_header || !has_headers => {
                sections.current().push_block(block);
            }
            Classified::Body(block) => match config.preamble {
                PreamblePolicy::Root => sections.current().push_block(block),
                PreamblePolicy::Section => {
                    if sections.open.is_empty() {
                        sections.open_section(
                            1,
                            PREAMBLE_TITLE.to_string(),
                            None,
                            block.page_number,
                            &mut anomalies,
                        );
                    }
                    sections.current().push_block(block);
                }
                PreamblePolicy::Drop => dropped += 1,
            },
        }
    }

    if dropped > 0 {
        anomalies.push(StructuralAnomaly::DroppedPreamble {
            block_count: dropped,
        });
    }

    let tree = SectionTree::new(sections.finish(&mut anomalies));
    debug!(
        sections = tree.section_count(),
        blocks = tree.block_count(),
        anomalies = anomalies.len(),
        "Section tree built"
    );

    TreeBuild { tree, anomalies }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperlink_common::models::ROOT_TITLE;

    fn para(id: &str, page: u32) -> ContentBlock {
        ContentBlock::paragraph(id, format!("text of {}", id), page)
    }

    fn titles(tree: &SectionTree) -> Vec<(String, u8)> {
        tree.iter().map(|s| (s.title.clone(), s.level)).collect()
    }

    #[test]
    fn test_blocks_partitioned_across_sections() {
        let blocks = vec![
            ContentBlock::header("h1", "Introduction", 1, 1),
            para("p1", 1),
            ContentBlock::header("h2", "Background", 2, 1),
            para("p2", 2),
            para("p3", 2),
            ContentBlock::header("h3", "Method", 1, 3),
            para("p4", 3),
        ];
        let build = build_tree(blocks, &TreeConfig::default());
        assert!(build.anomalies.is_empty());

        let mut owned: Vec<String> = build
            .tree
            .iter()
            .flat_map(|s| s.blocks.iter().map(|b| b.id.clone()))
            .collect();
        owned.sort();
        assert_eq!(owned, vec!["p1", "p2", "p3", "p4"]);

        let intro = build.tree.root().children[0].clone();
        assert_eq!(intro.header_block_id.as_deref(), Some("h1"));
        assert_eq!(intro.children[0].title, "Background");
        assert_eq!(intro.page_end, 2);
    }

    #[test]
    fn test_deeper_then_shallower_header_attaches_to_nearest_lesser_level() {
        let blocks = vec![
            ContentBlock::header("h1", "One", 1, 1),
            para("p1", 1),
            ContentBlock::header("h3", "Three", 3, 1),
            para("p2", 1),
            ContentBlock::header("h2", "Two", 2, 2),
            para("p3", 2),
        ];
        let build = build_tree(blocks, &TreeConfig::default());
        let one = &build.tree.root().children[0];
        let children: Vec<(&str, u8)> = one
            .children
            .iter()
            .map(|c| (c.title.as_str(), c.level))
            .collect();
        assert_eq!(children, vec![("Three", 3), ("Two", 2)]);
        assert!(one.children[0].children.is_empty());
    }

    #[test]
    fn test_skipped_levels_kept_as_is() {
        let blocks = vec![
            ContentBlock::header("h1", "Top", 1, 1),
            ContentBlock::header("h4", "Deep", 4, 1),
            para("p1", 1),
        ];
        let build = build_tree(blocks, &TreeConfig::default());
        let deep = &build.tree.root().children[0].children[0];
        assert_eq!(deep.level, 4);
        assert_eq!(deep.blocks.len(), 1);
    }

    #[test]
    fn test_zero_headers_keep_everything_in_root() {
        let config = TreeConfig {
            preamble: PreamblePolicy::Drop,
            ..TreeConfig::default()
        };
        let build = build_tree(vec![para("p1", 1), para("p2", 2)], &config);
        assert_eq!(build.tree.section_count(), 1);
        assert_eq!(build.tree.root().blocks.len(), 2);
        assert!(build.anomalies.is_empty());
    }

    #[test]
    fn test_preamble_policies() {
        let blocks = || {
            vec![
                para("p0", 1),
                ContentBlock::header("h1", "Abstract", 1, 1),
                para("p1", 1),
            ]
        };

        let root = build_tree(blocks(), &TreeConfig::default());
        assert_eq!(root.tree.root().blocks[0].id, "p0");

        let section = build_tree(
            blocks(),
            &TreeConfig {
                preamble: PreamblePolicy::Section,
                ..TreeConfig::default()
            },
        );
        assert_eq!(
            titles(&section.tree),
            vec![
                (ROOT_TITLE.to_string(), 0),
                (PREAMBLE_TITLE.to_string(), 1),
                ("Abstract".to_string(), 1)
            ]
        );
        assert!(section.tree.root().blocks.is_empty());

        let dropped = build_tree(
            blocks(),
            &TreeConfig {
                preamble: PreamblePolicy::Drop,
                ..TreeConfig::default()
            },
        );
        assert_eq!(dropped.tree.block_count(), 1);
        assert_eq!(
            dropped.anomalies,
            vec![StructuralAnomaly::DroppedPreamble { block_count: 1 }]
        );
    }

    #[test]
    fn test_preamble_section_does_not_adopt_deeper_first_header() {
        let blocks = vec![
            para("p0", 1),
            ContentBlock::header("h2", "Introduction", 2, 1),
            para("p1", 1),
            ContentBlock::header("h3", "Scope", 3, 2),
            para("p2", 2),
        ];
        let build = build_tree(
            blocks,
            &TreeConfig {
                preamble: PreamblePolicy::Section,
                ..TreeConfig::default()
            },
        );

        let top: Vec<&str> = build
            .tree
            .root()
            .children
            .iter()
            .map(|c| c.title.as_str())
            .collect();
        assert_eq!(top, vec![PREAMBLE_TITLE, "Introduction"]);

        let preamble = &build.tree.root().children[0];
        assert!(preamble.children.is_empty());
        assert_eq!(preamble.blocks[0].id, "p0");
        assert_eq!(build.tree.root().children[1].children[0].title, "Scope");
        assert!(build.anomalies.is_empty());
    }

    #[test]
    fn test_malformed_headers_become_paragraphs() {
        let mut missing = ContentBlock::header("hx", "Orphan heading", 1, 1);
        missing.header_level = None;
        let blocks = vec![
            ContentBlock::header("h1", "Intro", 1, 1),
            missing,
            ContentBlock::header("h0", "Zero", 0, 1),
            ContentBlock::header("h300", "Too deep", 300, 1),
        ];
        let build = build_tree(blocks, &TreeConfig::default());

        let intro = &build.tree.root().children[0];
        assert!(intro.children.is_empty());
        assert_eq!(intro.blocks.len(), 3);
        assert!(intro.blocks.iter().all(|b| b.kind == BlockKind::Paragraph));
        assert_eq!(
            build.anomalies,
            vec![
                StructuralAnomaly::MissingHeaderLevel { block_id: "hx".into() },
                StructuralAnomaly::InvalidHeaderLevel { block_id: "h0".into(), level: 0 },
                StructuralAnomaly::InvalidHeaderLevel { block_id: "h300".into(), level: 300 },
            ]
        );
    }

    #[test]
    fn test_empty_sections_and_documents_reported() {
        let blocks = vec![
            ContentBlock::header("h1", "Empty", 1, 1),
            ContentBlock::header("h2", "Full", 1, 2),
            para("p1", 2),
        ];
        let build = build_tree(blocks, &TreeConfig::default());
        assert!(matches!(
            build.anomalies.as_slice(),
            [StructuralAnomaly::EmptySection { title, .. }] if title == "Empty"
        ));

        let empty = build_tree(Vec::new(), &TreeConfig::default());
        assert_eq!(empty.anomalies, vec![StructuralAnomaly::EmptyDocument]);
        assert_eq!(empty.tree.section_count(), 1);
    }

    #[test]
    fn test_titles_trimmed_and_truncated() {
        let long = format!("  {}  ", "x".repeat(300));
        let build = build_tree(
            vec![ContentBlock::header("h1", long, 1, 1), para("p1", 1)],
            &TreeConfig::default(),
        );
        assert_eq!(build.tree.root().children[0].title.chars().count(), 200);
    }
}
