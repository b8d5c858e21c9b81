//! Markdown chunking with token budgets, sliding overlap and header carry-over.
//!
//! A document is split into blank-line separated paragraphs which are packed
//! greedily into chunks of at most `chunk_size` tokens. When a chunk is
//! flushed, its trailing units (up to `chunk_overlap` tokens, less whatever
//! the next unit needs to fit) seed the next one. Paragraphs that alone
//! exceed the budget are re-split by line.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::TokenCounter;
use crate::types::{ChunkKind, ChunkRecord};

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("paragraph break pattern is valid"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,3} .+").expect("heading pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 50 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Returns the heading line (level 1-3) a paragraph starts with, if any.
pub fn heading_line(paragraph: &str) -> Option<&str> {
    if HEADING.is_match(paragraph) {
        paragraph.lines().next()
    } else {
        None
    }
}

/// Section header state carried across chunk boundaries.
///
/// `last_seen` follows the document as paragraphs are read; `active` is the
/// header that was current when the chunk being accumulated started, and is
/// what gets prefixed to that chunk on emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderContext {
    last_seen: String,
    active: String,
}

impl HeaderContext {
    /// Records `paragraph` as the latest header if it starts with a heading line.
    pub fn observe(&mut self, paragraph: &str) -> bool {
        match heading_line(paragraph) {
            Some(line) => {
                self.last_seen = line.to_string();
                true
            }
            None => false,
        }
    }

    /// Marks the start of a new chunk.
    pub fn capture(&mut self) {
        self.active.clone_from(&self.last_seen);
    }

    pub fn last_seen(&self) -> &str { &self.last_seen }

    pub fn active(&self) -> &str { &self.active }

    /// Prefixes `body` with the active header unless it already starts with it.
    pub fn apply(&self, body: &str) -> String {
        if self.active.is_empty() || body.starts_with(&self.active) {
            body.trim().to_string()
        } else {
            format!("{}\n\n{}", self.active, body).trim().to_string()
        }
    }
}

struct Unit {
    text: String,
    tokens: usize,
}

/// Buffer of paragraphs/lines for the chunk under construction.
struct Accumulator {
    config: ChunkingConfig,
    units: Vec<Unit>,
    tokens: usize,
    headers: HeaderContext,
    emitted: Vec<String>,
}

impl Accumulator {
    fn new(config: ChunkingConfig) -> Self {
        Self { config, units: Vec::new(), tokens: 0, headers: HeaderContext::default(), emitted: Vec::new() }
    }

    fn is_empty(&self) -> bool { self.units.is_empty() }

    fn overflows_with(&self, tokens: usize) -> bool { self.tokens + tokens > self.config.chunk_size }

    fn push(&mut self, text: String, tokens: usize) {
        self.units.push(Unit { text, tokens });
        self.tokens += tokens;
    }

    /// Emits the buffer and rolls its tail over into the next chunk.
    ///
    /// `incoming` is the size of the unit about to be pushed; the carried tail
    /// leaves room for it so the next chunk stays within `chunk_size`.
    fn flush(&mut self, incoming: usize) {
        self.emit();
        self.roll_over(incoming);
        self.headers.capture();
    }

    fn emit(&mut self) {
        if self.units.is_empty() {
            return;
        }
        let body = self.units.iter().map(|u| u.text.as_str()).collect::<Vec<_>>().join("\n\n");
        let text = self.headers.apply(&body);
        if !text.is_empty() {
            self.emitted.push(text);
        }
    }

    fn roll_over(&mut self, incoming: usize) {
        let budget = self.config.chunk_overlap.min(self.config.chunk_size.saturating_sub(incoming));
        let mut kept = 0usize;
        let mut kept_tokens = 0usize;
        for unit in self.units.iter().rev() {
            if kept_tokens + unit.tokens > budget {
                break;
            }
            kept += 1;
            kept_tokens += unit.tokens;
        }
        self.units.drain(..self.units.len() - kept);
        self.tokens = kept_tokens;
    }

    fn finish(mut self) -> Vec<String> {
        self.emit();
        self.emitted
    }
}

/// Splits markdown documents into [`ChunkRecord`]s.
pub struct MarkdownChunker<'a> {
    config: ChunkingConfig,
    counter: &'a dyn TokenCounter,
}

impl<'a> MarkdownChunker<'a> {
    pub fn new(config: ChunkingConfig, counter: &'a dyn TokenCounter) -> Self { Self { config, counter } }

    /// Returns the chunk texts for one document, in order.
    pub fn split(&self, content: &str) -> Vec<String> {
        let content = content.replace("\r\n", "\n");
        let size = self.config.chunk_size;
        let mut acc = Accumulator::new(self.config);

        for paragraph in PARAGRAPH_BREAK.split(&content).map(str::trim).filter(|p| !p.is_empty()) {
            acc.headers.observe(paragraph);
            let tokens = self.counter.count(paragraph);

            if tokens > size {
                // Too big on its own (long code block, table...): pack it line by line.
                let lines: Vec<(&str, usize)> = paragraph
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(|l| (l, self.counter.count(l)))
                    .collect();
                if !acc.is_empty() {
                    if let Some(&(_, first)) = lines.first() {
                        acc.flush(first);
                    }
                }
                for (line, line_tokens) in lines {
                    if acc.overflows_with(line_tokens) && !acc.is_empty() {
                        acc.flush(line_tokens);
                    }
                    acc.push(line.to_string(), line_tokens);
                }
                continue;
            }

            if acc.overflows_with(tokens) && !acc.is_empty() {
                acc.flush(tokens);
            }
            acc.push(paragraph.to_string(), tokens);
        }

        acc.finish()
    }

    pub fn chunk_document(&self, content: &str, source_file: &str, collection: &str) -> Vec<ChunkRecord> {
        self.split(content)
            .into_iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord::new(text, source_file, collection, i, ChunkKind::Markdown))
            .collect()
    }

    /// Reads and chunks one file. The collection is the name of its parent folder.
    pub fn chunk_file(&self, path: &Path) -> Result<Vec<ChunkRecord>> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let content = String::from_utf8(bytes).map_err(|e| Error::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        let source_file = file_name(path)?;
        let collection = path.parent().and_then(|p| p.file_name()).map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let chunks = self.chunk_document(&content, &source_file, &collection);
        debug!(file = %path.display(), chunks = chunks.len(), "chunked markdown");
        Ok(chunks)
    }
}

pub(crate) fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::NotFound(format!("no file name in {}", path.display())))
}
