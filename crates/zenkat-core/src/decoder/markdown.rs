//! Block-level markdown decoder.
//!
//! Recognizes ATX headings, list blocks, thematic breaks and paragraphs.
//! Inline markup is left untouched in the block text.

use std::sync::LazyLock;

use regex::Regex;

use super::{Block, ContentDecoder, DecodeError, Document, ListItem};

// `#tag` is a tag, not a heading: the hashes must be followed by a space
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})[ \t]+(.*?)[ \t]*$").expect("valid regex"));

static THEMATIC_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$").expect("valid regex")
});

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([ \t]*)([-*+]|\d{1,9}[.)])[ \t]+(.*)$").expect("valid regex"));

/// Width of leading whitespace, tabs counted as four columns.
fn indent_width(whitespace: &str) -> usize {
    whitespace.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum()
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    paragraph: Vec<String>,
    list: Option<(bool, Vec<ListItem>)>,
}

impl BlockBuilder {
    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let text = self.paragraph.join("\n");
            self.paragraph.clear();
            self.blocks.push(Block::Paragraph { text });
        }
    }

    fn flush_list(&mut self) {
        if let Some((ordered, items)) = self.list.take() {
            self.blocks.push(Block::List { ordered, items });
        }
    }

    fn flush(&mut self) {
        self.flush_paragraph();
        self.flush_list();
    }

    fn push_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            self.flush();
            return;
        }

        if THEMATIC_BREAK.is_match(line) {
            self.flush();
            self.blocks.push(Block::ThematicBreak);
            return;
        }

        if let Some(caps) = HEADING.captures(line) {
            let text = caps[2].trim_end_matches('#').trim_end();
            if !text.is_empty() {
                self.flush();
                self.blocks.push(Block::Heading {
                    level: caps[1].len() as u8,
                    text: text.to_string(),
                });
                return;
            }
        }

        if let Some(caps) = LIST_ITEM.captures(line) {
            let ordered = caps[2].starts_with(|c: char| c.is_ascii_digit());
            let item = ListItem {
                indent: indent_width(&caps[1]),
                text: caps[3].to_string(),
            };
            self.flush_paragraph();
            match &mut self.list {
                Some((kind, items)) if *kind == ordered => items.push(item),
                _ => {
                    self.flush_list();
                    self.list = Some((ordered, vec![item]));
                }
            }
            return;
        }

        // Indented continuation of the last list item
        if let Some((_, items)) = &mut self.list {
            if line.starts_with([' ', '\t']) {
                if let Some(last) = items.last_mut() {
                    last.text.push(' ');
                    last.text.push_str(line.trim());
                    return;
                }
            }
            self.flush_list();
        }

        self.paragraph.push(line.trim_end().to_string());
    }

    fn finish(mut self) -> Document {
        self.flush();
        Document {
            blocks: self.blocks,
        }
    }
}

/// Markdown decoder producing [`Block`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownDecoder;

impl MarkdownDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> Document {
        let mut builder = BlockBuilder::default();
        for line in text.lines() {
            builder.push_line(line);
        }
        builder.finish()
    }
}

impl ContentDecoder for MarkdownDecoder {
    fn name(&self) -> &str {
        "markdown"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Option<Document>, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })?;
        Ok(Some(self.parse(text)))
    }
}
