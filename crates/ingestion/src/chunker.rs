//! Hierarchical chunking
//!
//! Every section is chunked on its own: its blocks are joined into a working
//! string, split on progressively finer boundaries (paragraph, line,
//! sentence, hard cut) and turned into overlapping windows. Each window keeps
//! the ids of the blocks it was cut from, and through them the images those
//! blocks reference.

use crate::errors::IngestionError;
use paperlink_common::config::ChunkingConfig;
use paperlink_common::models::{ContentBlock, FineChunk, SectionNode, SectionTree};
use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

/// Placed between consecutive blocks of a working string
pub const BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
}

/// Coarsest first; a hard cut follows the last one
const BOUNDARIES: [Boundary; 3] = [Boundary::Paragraph, Boundary::Line, Boundary::Sentence];

impl Boundary {
    /// Matches a separator together with the whitespace run that follows it
    fn pattern(self) -> &'static Regex {
        static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
        static LINE: OnceLock<Regex> = OnceLock::new();
        static SENTENCE: OnceLock<Regex> = OnceLock::new();
        match self {
            Boundary::Paragraph => PARAGRAPH
                .get_or_init(|| Regex::new(r"\n[ \t]*\n\s*").expect("paragraph pattern is valid")),
            Boundary::Line => LINE.get_or_init(|| Regex::new(r"\n\s*").expect("line pattern is valid")),
            Boundary::Sentence => SENTENCE
                .get_or_init(|| Regex::new(r"[.!?]\s+").expect("sentence pattern is valid")),
        }
    }

    /// Byte offsets inside `text` where a new part starts. Separators stay
    /// with the part they terminate, so no part is whitespace alone.
    fn cut_points(self, text: &str) -> Vec<usize> {
        self.pattern()
            .find_iter(text)
            .map(|m| m.end())
            .filter(|&p| p > 0 && p < text.len())
            .collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Character span of one block inside a working string
struct BlockSpan<'a> {
    block: &'a ContentBlock,
    start: usize,
    end: usize,
}

/// A section's own blocks joined into one string
struct WorkingText<'a> {
    text: String,
    spans: Vec<BlockSpan<'a>>,
}

impl<'a> WorkingText<'a> {
    fn build(blocks: &'a [ContentBlock]) -> Self {
        let separator_len = char_len(BLOCK_SEPARATOR);
        let mut text = String::new();
        let mut spans = Vec::with_capacity(blocks.len());
        let mut offset = 0;

        for block in blocks {
            let piece = block.chunk_text();
            if piece.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push_str(BLOCK_SEPARATOR);
                offset += separator_len;
            }
            let len = char_len(&piece);
            text.push_str(&piece);
            spans.push(BlockSpan {
                block,
                start: offset,
                end: offset + len,
            });
            offset += len;
        }

        Self { text, spans }
    }

    /// Byte position of every char, plus the total length
    fn char_offsets(&self) -> Vec<usize> {
        self.text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(self.text.len()))
            .collect()
    }
}

/// Split `text[start..end]` into contiguous byte ranges of at most `budget`
/// characters, preferring the coarsest boundary that works.
fn split_recursive(
    text: &str,
    start: usize,
    end: usize,
    depth: usize,
    budget: usize,
    out: &mut Vec<(usize, usize)>,
) {
    if char_len(&text[start..end]) <= budget {
        out.push((start, end));
        return;
    }

    let Some(boundary) = BOUNDARIES.get(depth) else {
        hard_cut(text, start, end, budget, out);
        return;
    };

    let cuts = boundary.cut_points(&text[start..end]);
    if cuts.is_empty() {
        split_recursive(text, start, end, depth + 1, budget, out);
        return;
    }

    // Merge adjacent parts greedily while they fit
    let mut part_start = start;
    let mut pending: Option<(usize, usize)> = None;
    for part_end in cuts.into_iter().map(|c| start + c).chain(std::iter::once(end)) {
        let part = (part_start, part_end);
        part_start = part_end;
        pending = match pending {
            Some((s, _)) if char_len(&text[s..part_end]) <= budget => Some((s, part_end)),
            Some((s, e)) => {
                split_recursive(text, s, e, depth + 1, budget, out);
                Some(part)
            }
            None => Some(part),
        };
    }
    if let Some((s, e)) = pending {
        split_recursive(text, s, e, depth + 1, budget, out);
    }
}

fn hard_cut(text: &str, start: usize, end: usize, budget: usize, out: &mut Vec<(usize, usize)>) {
    let budget = budget.max(1);
    let mut cut = start;
    for (count, (i, _)) in text[start..end].char_indices().enumerate() {
        if count > 0 && count % budget == 0 {
            out.push((cut, start + i));
            cut = start + i;
        }
    }
    out.push((cut, end));
}

/// Chunk one section's own blocks. Descendants are not included.
pub fn chunk_section(
    section: &SectionNode,
    config: &ChunkingConfig,
    first_index: usize,
) -> Result<Vec<FineChunk>, IngestionError> {
    let working = WorkingText::build(&section.blocks);
    if working.text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let budget = config.piece_budget();
    let overlap = config
        .chunk_overlap
        .min(config.chunk_size.saturating_sub(budget));

    let mut pieces = Vec::new();
    split_recursive(&working.text, 0, working.text.len(), 0, budget, &mut pieces);

    let offsets = working.char_offsets();
    let to_char = |byte: usize| offsets.binary_search(&byte).unwrap_or_else(|i| i);
    let owned: HashSet<&str> = section.blocks.iter().map(|b| b.id.as_str()).collect();

    let mut chunks = Vec::with_capacity(pieces.len());
    let mut previous_start: Option<usize> = None;

    for (byte_start, byte_end) in pieces {
        if working.text[byte_start..byte_end].trim().is_empty() {
            continue;
        }

        let piece_start = to_char(byte_start);
        let char_end = to_char(byte_end);
        let char_start = match previous_start {
            Some(prev) => piece_start.saturating_sub(overlap).max(prev),
            None => piece_start,
        };
        previous_start = Some(char_start);

        let sources: Vec<&BlockSpan> = working
            .spans
            .iter()
            .filter(|span| span.start < char_end && span.end > char_start)
            .collect();

        let mut source_block_ids = Vec::with_capacity(sources.len());
        let mut direct_image_ids: Vec<String> = Vec::new();
        for span in &sources {
            if !owned.contains(span.block.id.as_str()) {
                return Err(IngestionError::ContainmentViolation {
                    section_id: section.id,
                    block_id: span.block.id.clone(),
                });
            }
            source_block_ids.push(span.block.id.clone());
            for image_id in span.block.image_ids() {
                if !direct_image_ids.contains(&image_id) {
                    direct_image_ids.push(image_id);
                }
            }
        }

        let page_number = sources
            .iter()
            .map(|s| s.block.page_number)
            .min()
            .unwrap_or(section.page_start);
        let page_end = sources
            .iter()
            .map(|s| s.block.page_number)
            .max()
            .unwrap_or(page_number);

        chunks.push(FineChunk {
            id: Uuid::new_v4(),
            index: first_index + chunks.len(),
            section_id: section.id,
            content: working.text[offsets[char_start]..offsets[char_end]].to_string(),
            char_start,
            char_end,
            source_block_ids,
            image_ids: direct_image_ids.clone(),
            direct_image_ids,
            linked_image_ids: Vec::new(),
            page_number,
            page_end,
            embedding_text: None,
            embedding_matching: None,
        });
    }

    Ok(chunks)
}

/// Chunk every section of a tree, depth-first with parents before children
pub fn create_chunks(
    tree: &SectionTree,
    config: &ChunkingConfig,
) -> Result<Vec<FineChunk>, IngestionError> {
    let mut chunks = Vec::new();
    for section in tree.iter() {
        let section_chunks = chunk_section(section, config, chunks.len())?;
        debug!(
            section_id = %section.id,
            title = %section.title,
            chunk_count = section_chunks.len(),
            "Section chunked"
        );
        chunks.extend(section_chunks);
    }

    debug!(
        sections = tree.section_count(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Document chunked"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperlink_common::config::TreeConfig;
    use crate::tree::build_tree;

    /// Text with no whitespace or punctuation, so only hard cuts apply
    fn unbroken(len: usize) -> String {
        "abcdefghijklmnopqrstuvwxyz".chars().cycle().take(len).collect()
    }

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence {} reports the measured accuracy on the held-out split.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn tree_of(blocks: Vec<ContentBlock>) -> SectionTree {
        build_tree(blocks, &TreeConfig::default()).tree
    }

    fn first_chars(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }

    fn last_chars(s: &str, n: usize) -> String {
        let len = s.chars().count();
        s.chars().skip(len.saturating_sub(n)).collect()
    }

    #[test]
    fn test_short_section_is_one_chunk() {
        let tree = tree_of(vec![
            ContentBlock::header("h1", "Intro", 1, 1),
            ContentBlock::paragraph("p1", "Transformers replaced recurrence.", 1),
            ContentBlock::paragraph("p2", "Attention is computed in parallel.", 2),
        ]);
        let chunks = create_chunks(&tree, &ChunkingConfig::default()).unwrap();

        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(
            chunk.content,
            "Transformers replaced recurrence.\n\nAttention is computed in parallel."
        );
        assert_eq!(chunk.source_block_ids, vec!["p1", "p2"]);
        assert_eq!((chunk.page_number, chunk.page_end), (1, 2));
        assert_eq!(chunk.section_id, tree.root().children[0].id);
    }

    #[test]
    fn test_hard_cut_windows() {
        let tree = tree_of(vec![ContentBlock::paragraph("p1", unbroken(1000), 1)]);
        let chunks = create_chunks(&tree, &ChunkingConfig::default()).unwrap();

        let windows: Vec<(usize, usize)> = chunks.iter().map(|c| (c.char_start, c.char_end)).collect();
        assert_eq!(windows, vec![(0, 400), (300, 800), (700, 1000)]);
        assert!(chunks.iter().all(|c| c.char_len() <= 500));
    }

    #[test]
    fn test_adjacent_chunks_share_overlap() {
        let tree = tree_of(vec![
            ContentBlock::header("h1", "Results", 1, 1),
            ContentBlock::paragraph("p1", prose(20), 1),
            ContentBlock::paragraph("p2", prose(12), 2),
        ]);
        let chunks = create_chunks(&tree, &ChunkingConfig::default()).unwrap();
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            assert!(pair[0].content.chars().count() <= 500);
            assert_eq!(last_chars(&pair[0].content, 100), first_chars(&pair[1].content, 100));
        }
    }

    #[test]
    fn test_chunks_stay_inside_their_section() {
        let tree = tree_of(vec![
            ContentBlock::header("h1", "Alpha", 1, 1),
            ContentBlock::paragraph("a1", prose(10), 1),
            ContentBlock::header("h2", "Beta", 2, 2),
            ContentBlock::paragraph("b1", unbroken(700), 2),
            ContentBlock::header("h3", "Gamma", 1, 3),
            ContentBlock::paragraph("g1", prose(3), 3),
        ]);
        let chunks = create_chunks(&tree, &ChunkingConfig::default()).unwrap();

        for chunk in &chunks {
            let section = tree.find(&chunk.section_id).unwrap();
            for block_id in &chunk.source_block_ids {
                assert!(section.blocks.iter().any(|b| &b.id == block_id));
            }
        }

        // Parent chunks precede the child's, indices follow document order
        let titles: Vec<&str> = chunks
            .iter()
            .map(|c| tree.find(&c.section_id).unwrap().title.as_str())
            .collect();
        let first_beta = titles.iter().position(|t| *t == "Beta").unwrap();
        assert!(titles[..first_beta].iter().all(|t| *t == "Alpha"));
        assert_eq!(titles.last(), Some(&"Gamma"));
        assert!(chunks.iter().enumerate().all(|(i, c)| c.index == i));
    }

    #[test]
    fn test_image_ids_are_union_of_source_block_references() {
        let mut long = String::from("[IMAGE: img-1] ");
        long.push_str(&prose(12));
        let tree = tree_of(vec![
            ContentBlock::header("h1", "Figures", 1, 3),
            ContentBlock::paragraph("p1", long, 3),
            ContentBlock::image_ref("i2", "img-2", 3),
            ContentBlock::paragraph("p3", "The loss plateaus early.", 4)
                .with_image_refs(["img-3"]),
        ]);
        let section = &tree.root().children[0];
        let chunks = create_chunks(&tree, &ChunkingConfig::default()).unwrap();
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            let mut expected: Vec<String> = Vec::new();
            for block_id in &chunk.source_block_ids {
                let block = section.blocks.iter().find(|b| &b.id == block_id).unwrap();
                for id in block.image_ids() {
                    if !expected.contains(&id) {
                        expected.push(id);
                    }
                }
            }
            assert_eq!(chunk.image_ids, expected);
            assert_eq!(chunk.direct_image_ids, expected);
            assert!(chunk.linked_image_ids.is_empty());
        }

        assert!(chunks[0].image_ids.contains(&"img-1".to_string()));
        // The last window overlaps back into p1
        let last = chunks.last().unwrap();
        assert!(last.content.contains("[IMAGE: img-2]"));
        assert_eq!(last.source_block_ids, vec!["p1", "i2", "p3"]);
        assert_eq!(last.image_ids, vec!["img-1", "img-2", "img-3"]);
    }

    #[test]
    fn test_three_sections_chunk_count() {
        let lengths = [1000usize, 400, 401];
        let mut blocks = Vec::new();
        for (i, len) in lengths.iter().enumerate() {
            blocks.push(ContentBlock::header(format!("h{}", i), format!("Section {}", i), 1, 1));
            blocks.push(ContentBlock::paragraph(format!("p{}", i), unbroken(*len), 1));
        }
        let tree = tree_of(blocks);
        let chunks = create_chunks(&tree, &ChunkingConfig::default()).unwrap();

        let expected: usize = lengths.iter().map(|l| l.div_ceil(400)).sum();
        assert_eq!(chunks.len(), expected);

        let ids: Vec<_> = tree.root().children.iter().map(|s| s.id).collect();
        for chunk in &chunks {
            assert_eq!(chunk.source_block_ids.len(), 1);
            assert!(ids.contains(&chunk.section_id));
        }
    }

    #[test]
    fn test_blank_and_empty_sections_emit_nothing() {
        let tree = tree_of(vec![
            ContentBlock::header("h1", "Empty", 1, 1),
            ContentBlock::header("h2", "Blank", 1, 1),
            ContentBlock::paragraph("p1", "   \n  ", 1),
        ]);
        assert!(create_chunks(&tree, &ChunkingConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_lengths_count_characters_not_bytes() {
        let text: String = "é".repeat(450);
        let tree = tree_of(vec![ContentBlock::paragraph("p1", text, 1)]);
        let chunks = create_chunks(&tree, &ChunkingConfig::default()).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.chars().count(), 400);
        assert_eq!((chunks[1].char_start, chunks[1].char_end), (300, 450));
        assert_eq!(chunks[1].content.chars().count(), 150);
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let para = |id: &str| ContentBlock::paragraph(id, unbroken(150), 1);
        let tree = tree_of(vec![para("p1"), para("p2"), para("p3"), para("p4")]);
        let chunks = create_chunks(&tree, &ChunkingConfig::default()).unwrap();

        // p1 + p2 fit one piece, p3 + p4 the next
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_block_ids, vec!["p1", "p2"]);
        assert!(chunks[1].content.ends_with(&unbroken(150)));
        assert_eq!(chunks[1].source_block_ids, vec!["p2", "p3", "p4"]);
    }
}
