//! Markdown runbook chunking into bounded, metadata-tagged excerpts.
//!
//! Documents may open with a YAML header block (`---` delimited) declaring
//! `title`, `tags` and `applicable_shapes`. The body is cut at heading
//! boundaries, small sections are merged forward, and oversized sections are
//! split at sub-headings, then paragraphs, then sentences. Fenced code blocks
//! are never split.

use std::collections::BTreeSet;
use std::path::Path;

use serde_yaml::Value;

use crate::embeddings::RunbookChunk;

/// Chunk size policy (in characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Sections at or below this size are merged with their successors.
    pub min_chunk_chars: usize,
    /// Sections above this size are split further.
    pub max_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: 200,
            max_chunk_chars: 1500,
        }
    }
}

/// Metadata parsed from a document's header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunbookHeader {
    /// Declared document title.
    pub title: Option<String>,
    /// Declared tags.
    pub tags: BTreeSet<String>,
    /// Declared host shape globs.
    pub applicable_shapes: Vec<String>,
}

impl RunbookHeader {
    /// Parses YAML header text. Malformed or non-mapping content yields defaults.
    pub fn parse(yaml: &str, source_path: &str) -> Self {
        let value: Value = match serde_yaml::from_str(yaml) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(source_path, error = %err, "ignoring malformed runbook header");
                return Self::default();
            }
        };
        let Value::Mapping(map) = value else {
            if !matches!(value, Value::Null) {
                tracing::warn!(source_path, "runbook header is not a mapping; ignoring");
            }
            return Self::default();
        };

        let lookup = |keys: &[&str]| keys.iter().find_map(|key| map.get(*key));
        let title = lookup(&["title"])
            .and_then(scalar_string)
            .filter(|title| !title.is_empty());
        let tags = lookup(&["tags"])
            .map(string_list)
            .unwrap_or_default()
            .into_iter()
            .collect();
        let applicable_shapes = lookup(&["applicable_shapes", "applicableShapes", "shapes"])
            .map(string_list)
            .unwrap_or_default();

        Self {
            title,
            tags,
            applicable_shapes,
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        Value::String(text) => text.split(',').map(str::to_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    };
    raw.into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Stateless runbook chunker.
#[derive(Debug, Clone, Default)]
pub struct DocumentChunker {
    config: ChunkerConfig,
}

impl DocumentChunker {
    /// Builds a chunker with the provided size policy.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Returns the underlying config reference.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Splits `text` into chunks tagged with `source_path` and the header metadata.
    ///
    /// Returned chunks carry no embedding yet.
    pub fn chunk(&self, text: &str, source_path: &str) -> Vec<RunbookChunk> {
        let (header_text, body) = split_header(text);
        let header = header_text
            .map(|yaml| RunbookHeader::parse(yaml, source_path))
            .unwrap_or_default();
        if body.trim().is_empty() {
            return Vec::new();
        }

        let body = close_dangling_fence(body);
        let lines = scan_lines(&body);
        let fallback_title = header
            .title
            .clone()
            .or_else(|| title_heading(&lines).map(|heading| heading.title.clone()))
            .unwrap_or_else(|| file_stem(source_path));

        let sections = split_sections(&lines, &fallback_title);
        let max = self.config.max_chunk_chars.max(1);
        let refined: Vec<Section> = sections
            .into_iter()
            .flat_map(|section| section.split_sub_sections(max))
            .collect();
        let merged = merge_small(refined, self.config.min_chunk_chars);

        let mut chunks = Vec::new();
        for unit in merged {
            for content in split_oversized(&unit.content, max) {
                let index = chunks.len();
                chunks.push(RunbookChunk {
                    id: chunk_id(source_path, index, &content),
                    source_path: source_path.to_string(),
                    section_title: unit.title.clone(),
                    content,
                    tags: header.tags.clone(),
                    applicable_shape_patterns: header.applicable_shapes.clone(),
                    embedding: Vec::new(),
                });
            }
        }
        tracing::debug!(source_path, chunks = chunks.len(), "chunked runbook");
        chunks
    }
}

fn chunk_id(source_path: &str, index: usize, content: &str) -> String {
    format!(
        "{}#{}-{:08x}",
        source_path,
        index,
        crc32fast::hash(content.as_bytes())
    )
}

fn file_stem(source_path: &str) -> String {
    Path::new(source_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(source_path)
        .to_string()
}

/// Separates a leading `---` delimited header from the body.
fn split_header(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return (None, text);
    };
    if first.trim_end() != "---" {
        return (None, text);
    }
    let header_start = first.len();
    let mut offset = header_start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let header = &text[header_start..offset];
            if !is_front_matter(header) {
                return (None, text);
            }
            let body = &text[offset + line.len()..];
            return (Some(header), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Text that parses as a YAML scalar or sequence is a body opening with a
/// thematic break, not a header. Malformed YAML still counts as a header.
fn is_front_matter(block: &str) -> bool {
    !matches!(
        serde_yaml::from_str::<Value>(block),
        Ok(Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Sequence(_))
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    fn open(line: &str) -> Option<Self> {
        let trimmed = line.trim_start();
        let marker = trimmed.chars().next()?;
        if marker != '`' && marker != '~' {
            return None;
        }
        let len = trimmed.chars().take_while(|ch| *ch == marker).count();
        if len < 3 {
            return None;
        }
        // Backtick fences may not carry backticks in their info string.
        let info = &trimmed[len..];
        if marker == '`' && info.contains('`') {
            return None;
        }
        Some(Self { marker, len })
    }

    fn closes(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let run = trimmed.chars().take_while(|ch| *ch == self.marker).count();
        run >= self.len && trimmed.chars().count() == run
    }

    fn closing_line(&self) -> String {
        std::iter::repeat(self.marker).take(self.len).collect()
    }
}

/// Appends a closing fence when the body ends inside a code block.
fn close_dangling_fence(body: &str) -> String {
    let mut open: Option<Fence> = None;
    for line in body.lines() {
        match open {
            Some(fence) if fence.closes(line) => open = None,
            Some(_) => {}
            None => open = Fence::open(line),
        }
    }
    let mut owned = body.to_string();
    if let Some(fence) = open {
        if !owned.ends_with('\n') {
            owned.push('\n');
        }
        owned.push_str(&fence.closing_line());
        owned.push('\n');
    }
    owned
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Heading {
    level: u8,
    title: String,
}

fn parse_heading(line: &str) -> Option<Heading> {
    let level = line.chars().take_while(|ch| *ch == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    if title.is_empty() {
        return None;
    }
    Some(Heading {
        level: level as u8,
        title: title.to_string(),
    })
}

#[derive(Debug, Clone)]
struct MdLine<'a> {
    text: &'a str,
    /// Only set for headings outside fenced blocks.
    heading: Option<Heading>,
}

fn scan_lines(body: &str) -> Vec<MdLine<'_>> {
    let mut open: Option<Fence> = None;
    let mut lines = Vec::new();
    for text in body.lines() {
        let heading = match open {
            Some(fence) => {
                if fence.closes(text) {
                    open = None;
                }
                None
            }
            None => {
                open = Fence::open(text);
                if open.is_some() {
                    None
                } else {
                    parse_heading(text)
                }
            }
        };
        lines.push(MdLine { text, heading });
    }
    lines
}

/// A sole leading level-1 heading names the document rather than a section.
fn title_heading<'l>(lines: &'l [MdLine<'_>]) -> Option<&'l Heading> {
    let mut headings = lines.iter().filter_map(|line| line.heading.as_ref());
    let first = headings.next()?;
    let another_h1 = headings.any(|heading| heading.level == 1);
    (first.level == 1 && !another_h1).then_some(first)
}

#[derive(Debug, Clone)]
struct Section<'a> {
    title: String,
    lines: Vec<MdLine<'a>>,
}

impl<'a> Section<'a> {
    fn content(&self) -> String {
        join_trimmed(self.lines.iter().map(|line| line.text))
    }

    /// Splits an oversized section at the next heading level down.
    fn split_sub_sections(self, max_chars: usize) -> Vec<Section<'a>> {
        if char_len(&self.content()) <= max_chars {
            return vec![self];
        }
        let own_level = self
            .lines
            .first()
            .and_then(|line| line.heading.as_ref())
            .map(|heading| heading.level);
        let sub_level = match own_level {
            Some(level) => level + 1,
            None => match self
                .lines
                .iter()
                .filter_map(|line| line.heading.as_ref())
                .map(|heading| heading.level)
                .min()
            {
                Some(level) => level,
                None => return vec![self],
            },
        };

        let mut parts: Vec<Section<'a>> = Vec::new();
        let mut current = Section {
            title: self.title.clone(),
            lines: Vec::new(),
        };
        for line in self.lines {
            let starts_sub = line
                .heading
                .as_ref()
                .is_some_and(|heading| heading.level == sub_level);
            if starts_sub && !current.lines.is_empty() {
                let title = line
                    .heading
                    .as_ref()
                    .map(|heading| format!("{} > {}", self.title, heading.title))
                    .unwrap_or_else(|| self.title.clone());
                parts.push(std::mem::replace(
                    &mut current,
                    Section {
                        title,
                        lines: Vec::new(),
                    },
                ));
            }
            current.lines.push(line);
        }
        parts.push(current);
        parts
            .into_iter()
            .filter(|part| !part.content().is_empty())
            .collect()
    }
}

fn split_sections<'a>(lines: &[MdLine<'a>], fallback_title: &str) -> Vec<Section<'a>> {
    let title_line = title_heading(lines).cloned();
    let is_title = |heading: &Heading| title_line.as_ref() == Some(heading);
    let primary = lines
        .iter()
        .filter_map(|line| line.heading.as_ref())
        .filter(|heading| !is_title(heading))
        .map(|heading| heading.level)
        .min();

    let mut sections = Vec::new();
    let mut current = Section {
        title: fallback_title.to_string(),
        lines: Vec::new(),
    };
    for line in lines {
        let boundary = match (&line.heading, primary) {
            (Some(heading), Some(level)) => heading.level == level && !is_title(heading),
            _ => false,
        };
        if boundary {
            let title = line
                .heading
                .as_ref()
                .map(|heading| heading.title.clone())
                .unwrap_or_default();
            let finished = std::mem::replace(
                &mut current,
                Section {
                    title,
                    lines: Vec::new(),
                },
            );
            sections.push(finished);
        }
        current.lines.push(line.clone());
    }
    sections.push(current);
    sections
        .into_iter()
        .filter(|section| !section.content().is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Unit {
    title: String,
    content: String,
}

/// Merges adjacent sections, in order, until each unit exceeds `min_chars`.
fn merge_small(sections: Vec<Section<'_>>, min_chars: usize) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut pending: Option<Unit> = None;
    for section in sections {
        let content = section.content();
        let unit = match pending.take() {
            Some(mut unit) => {
                unit.content.push_str("\n\n");
                unit.content.push_str(&content);
                unit
            }
            None => Unit {
                title: section.title,
                content,
            },
        };
        if char_len(&unit.content) > min_chars {
            units.push(unit);
        } else {
            pending = Some(unit);
        }
    }
    units.extend(pending);
    units
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    text: String,
    fenced: bool,
}

/// Paragraph blocks; a fenced code block is always a single block.
fn split_blocks(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut open: Option<Fence> = None;

    for line in content.lines() {
        match open {
            Some(fence) => {
                current.push(line);
                if fence.closes(line) {
                    open = None;
                    flush_block(&mut current, &mut blocks, true);
                }
            }
            None => {
                if let Some(fence) = Fence::open(line) {
                    flush_block(&mut current, &mut blocks, false);
                    open = Some(fence);
                    current.push(line);
                } else if line.trim().is_empty() {
                    flush_block(&mut current, &mut blocks, false);
                } else {
                    current.push(line);
                }
            }
        }
    }
    let fenced = open.is_some();
    flush_block(&mut current, &mut blocks, fenced);
    blocks
}

fn flush_block(current: &mut Vec<&str>, blocks: &mut Vec<Block>, fenced: bool) {
    let text = join_trimmed(current.drain(..));
    if !text.is_empty() {
        blocks.push(Block { text, fenced });
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_idx, next)) = chars.peek() {
            if next.is_whitespace() {
                let sentence = text[start..next_idx].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = next_idx;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn split_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && char_len(&current) + 1 + char_len(word) > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Splits content above `max_chars` at paragraph, then sentence, then word
/// boundaries. Fenced blocks stay whole even when they alone exceed the limit.
fn split_oversized(content: &str, max_chars: usize) -> Vec<String> {
    if char_len(content) <= max_chars {
        return vec![content.to_string()];
    }

    let mut pieces: Vec<(String, &'static str)> = Vec::new();
    for block in split_blocks(content) {
        if block.fenced || char_len(&block.text) <= max_chars {
            pieces.push((block.text, "\n\n"));
            continue;
        }
        let mut first = true;
        for sentence in split_sentences(&block.text) {
            let parts = if char_len(&sentence) > max_chars {
                split_words(&sentence, max_chars)
            } else {
                vec![sentence]
            };
            for part in parts {
                pieces.push((part, if first { "\n\n" } else { " " }));
                first = false;
            }
        }
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for (piece, separator) in pieces {
        if !current.is_empty()
            && char_len(&current) + char_len(separator) + char_len(&piece) > max_chars
        {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str(separator);
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn join_trimmed<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let joined = lines.collect::<Vec<_>>().join("\n");
    joined
        .trim_start_matches(['\n', '\r'])
        .trim_end()
        .to_string()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fences_balanced(content: &str) -> bool {
        let mut open: Option<Fence> = None;
        for line in content.lines() {
            match open {
                Some(fence) if fence.closes(line) => open = None,
                Some(_) => {}
                None => open = Fence::open(line),
            }
        }
        open.is_none()
    }

    fn tiny() -> DocumentChunker {
        DocumentChunker::new(ChunkerConfig {
            min_chunk_chars: 0,
            max_chunk_chars: 10_000,
        })
    }

    const RUNBOOK: &str = "---\n\
title: High CPU\n\
tags: [cpu, compute]\n\
applicable_shapes:\n  - VM.Standard*\n  - BM.*\n\
---\n\
# High CPU\n\
\n\
Intro text.\n\
\n\
## Diagnose\n\
\n\
Run top.\n\
\n\
## Mitigate\n\
\n\
Restart the worker.\n";

    #[test]
    fn parses_header_and_sections() {
        let chunks = tiny().chunk(RUNBOOK, "compute/high-cpu.md");
        let titles: Vec<&str> = chunks.iter().map(|c| c.section_title.as_str()).collect();
        assert_eq!(titles, vec!["High CPU", "Diagnose", "Mitigate"]);
        let first = &chunks[0];
        assert!(first.tags.contains("cpu") && first.tags.contains("compute"));
        assert_eq!(
            first.applicable_shape_patterns,
            vec!["VM.Standard*".to_string(), "BM.*".to_string()]
        );
        assert!(chunks[1].content.starts_with("## Diagnose"));
        assert!(chunks.iter().all(|c| c.source_path == "compute/high-cpu.md"));
    }

    #[test]
    fn missing_header_uses_defaults() {
        let chunks = tiny().chunk("## Only\n\nBody text.", "plain.md");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].tags.is_empty());
        assert!(chunks[0].applicable_shape_patterns.is_empty());
        assert_eq!(chunks[0].section_title, "Only");
    }

    #[test]
    fn malformed_header_is_ignored() {
        let doc = "---\ntags: [unclosed\n---\n## Steps\n\nDo the thing.\n";
        let chunks = tiny().chunk(doc, "broken.md");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].tags.is_empty());
        assert_eq!(chunks[0].section_title, "Steps");
    }

    #[test]
    fn leading_thematic_break_keeps_body() {
        let doc = "---\nRestart the collector before paging anyone.\n---\n## Escalate\n\nPage the on-call.\n";
        let chunks = tiny().chunk(doc, "collector.md");
        let joined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert!(joined.contains("Restart the collector before paging anyone."));
        assert!(joined.contains("Page the on-call."));
        assert!(chunks.iter().all(|c| c.tags.is_empty()));
    }

    #[test]
    fn comma_separated_tags_are_split() {
        let header = RunbookHeader::parse("tags: disk, io ,  \nshapes: VM.*", "x.md");
        assert_eq!(
            header.tags.into_iter().collect::<Vec<_>>(),
            vec!["disk".to_string(), "io".to_string()]
        );
        assert_eq!(header.applicable_shapes, vec!["VM.*".to_string()]);
    }

    #[test]
    fn empty_and_header_only_inputs_yield_nothing() {
        let chunker = DocumentChunker::default();
        assert!(chunker.chunk("", "a.md").is_empty());
        assert!(chunker.chunk("   \n\n", "a.md").is_empty());
        assert!(chunker.chunk("---\ntitle: x\n---\n", "a.md").is_empty());
    }

    #[test]
    fn headings_inside_fences_do_not_split() {
        let doc = "## Shell\n\n```bash\n# not a heading\necho hi\n```\n\n## Next\n\ntext";
        let chunks = tiny().chunk(doc, "f.md");
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.contains("# not a heading"));
    }

    #[test]
    fn small_sections_merge_forward() {
        let chunker = DocumentChunker::new(ChunkerConfig {
            min_chunk_chars: 40,
            max_chunk_chars: 1000,
        });
        let doc = "## A\n\nshort\n\n## B\n\nthis one carries enough words to pass\n\n## C\n\nthis section is long enough to stand alone easily.";
        let chunks = chunker.chunk(doc, "m.md");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_title, "A");
        assert!(chunks[0].content.contains("## B"));
        assert_eq!(chunks[1].section_title, "C");
    }

    #[test]
    fn trailing_small_section_is_kept() {
        let chunker = DocumentChunker::new(ChunkerConfig {
            min_chunk_chars: 30,
            max_chunk_chars: 1000,
        });
        let doc = "## A\n\nthis first section is comfortably long.\n\n## B\n\ntiny";
        let chunks = chunker.chunk(doc, "t.md");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].content, "## B\n\ntiny");
    }

    #[test]
    fn oversized_sections_split_at_sub_headings() {
        let chunker = DocumentChunker::new(ChunkerConfig {
            min_chunk_chars: 0,
            max_chunk_chars: 60,
        });
        let doc = "## Disk\n\n### Check usage\n\nRun df -h on the host.\n\n### Clean up\n\nRemove old logs from var.";
        let chunks = chunker.chunk(doc, "d.md");
        let titles: Vec<&str> = chunks.iter().map(|c| c.section_title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Disk", "Disk > Check usage", "Disk > Clean up"]
        );
    }

    #[test]
    fn oversized_paragraphs_split_at_sentences() {
        let chunker = DocumentChunker::new(ChunkerConfig {
            min_chunk_chars: 0,
            max_chunk_chars: 50,
        });
        let doc = "## Notes\n\nFirst sentence is here. Second sentence follows it. Third one closes the paragraph.";
        let chunks = chunker.chunk(doc, "n.md");
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 50));
        assert!(chunks.iter().all(|c| c.section_title == "Notes"));
    }

    #[test]
    fn fences_are_never_split() {
        let mut doc = String::from("## Big\n\nIntro paragraph.\n\n```sh\n");
        for idx in 0..40 {
            doc.push_str(&format!("echo line {idx}\n"));
        }
        doc.push_str("```\n\nAfter the fence there is a closing paragraph of text.");
        let chunker = DocumentChunker::new(ChunkerConfig {
            min_chunk_chars: 0,
            max_chunk_chars: 80,
        });
        let chunks = chunker.chunk(&doc, "big.md");
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| fences_balanced(&c.content)));
        assert!(chunks.iter().any(|c| c.content.contains("echo line 0")
            && c.content.contains("echo line 39")));
    }

    #[test]
    fn inline_backtick_run_is_not_a_fence() {
        assert_eq!(Fence::open("```echo hi```"), None);
        assert!(Fence::open("```bash").is_some());
        assert!(Fence::open("~~~ with `ticks`").is_some());

        let doc = "## First\n\n```echo hi``` prints a greeting.\n\n## Second\n\nMore text.\n";
        let chunks = tiny().chunk(doc, "inline.md");
        let titles: Vec<&str> = chunks.iter().map(|c| c.section_title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
        assert!(chunks.iter().all(|c| !c.content.ends_with("```\n```")));
    }

    #[test]
    fn dangling_fence_is_closed() {
        let doc = "## Broken\n\n```\nrm -rf /tmp/cache\n";
        let chunks = tiny().chunk(doc, "b.md");
        assert_eq!(chunks.len(), 1);
        assert!(fences_balanced(&chunks[0].content));
        assert!(chunks[0].content.ends_with("```"));
    }

    #[test]
    fn chunking_is_deterministic() {
        let a = DocumentChunker::default().chunk(RUNBOOK, "compute/high-cpu.md");
        let b = DocumentChunker::default().chunk(RUNBOOK, "compute/high-cpu.md");
        assert_eq!(a, b);
        assert!(a[0].id.starts_with("compute/high-cpu.md#0-"));
    }

    #[test]
    fn untitled_preamble_uses_file_stem() {
        let chunks = tiny().chunk("Just some notes without headings.", "ops/notes.md");
        assert_eq!(chunks[0].section_title, "notes");
    }
}
