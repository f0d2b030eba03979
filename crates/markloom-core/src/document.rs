use std::io::{Read, Write};

use crate::block::parse_document;
use crate::emit::{emit_html, sanitize_html};
use crate::error::{DocumentError, Result};
use crate::highlight::{Highlighter, PlainHighlighter};
use crate::inline::resolve_spans;
use crate::link_table::LinkTable;
use crate::reader::{Line, LineReader};
use crate::token::{ContainerKind, Text, Token};

/// Settings that affect how input is read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Options {
    /// Tab stop width used when expanding tabs to spaces.
    pub spaces_per_tab: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { spaces_per_tab: 4 }
    }
}

/// A Markdown document.
///
/// Input is accumulated with [`Document::read`] until the first call that
/// renders or dumps it. That call runs the block and span passes once; from
/// then on the document is immutable, further reads fail with
/// [`DocumentError::AlreadyProcessed`], and [`Document::render`] can be called
/// from any number of threads.
pub struct Document {
    reader: LineReader,
    lines: Vec<Token>,
    root: Option<Token>,
    links: LinkTable,
    highlighter: Box<dyn Highlighter>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            reader: LineReader::new(options.spaces_per_tab),
            lines: Vec::new(),
            root: None,
            links: LinkTable::new(),
            highlighter: Box::new(PlainHighlighter),
        }
    }

    /// Replaces the collaborator that renders fenced code with a language.
    pub fn with_highlighter(mut self, highlighter: impl Highlighter + 'static) -> Self {
        self.highlighter = Box::new(highlighter);
        self
    }

    /// Appends the lines of `text`.
    pub fn read(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;
        let lines = self.reader.split(text);
        self.append(lines);
        Ok(())
    }

    /// Appends every line of `input`. Invalid UTF-8 is replaced, not rejected.
    pub fn read_from<R: Read>(&mut self, input: R) -> Result<()> {
        self.ensure_open()?;
        let lines = self.reader.read(input)?;
        self.append(lines);
        Ok(())
    }

    pub fn is_processed(&self) -> bool {
        self.root.is_some()
    }

    /// Reference definitions seen so far. Complete once the document is
    /// processed.
    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// The token tree, once processed.
    pub fn root(&self) -> Option<&Token> {
        self.root.as_ref()
    }

    /// Renders a processed document; `None` before the first render.
    pub fn render(&self) -> Option<String> {
        let Some(Token::Container(root)) = &self.root else {
            return None;
        };
        Some(emit_html(&root.children, self.highlighter.as_ref()))
    }

    /// Processes the document if needed and writes its HTML to `out`.
    pub fn write<W: Write>(&mut self, mut out: W) -> Result<()> {
        let html = self.to_html();
        out.write_all(html.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    pub fn to_html(&mut self) -> String {
        self.process();
        self.render().unwrap_or_default()
    }

    /// HTML cleaned against an allow-list; raw HTML passed through from the
    /// source loses scripts, event handlers and unknown tags.
    pub fn to_html_sanitized(&mut self) -> String {
        sanitize_html(&self.to_html())
    }

    /// Writes an indented description of the processed token tree.
    pub fn write_tokens<W: Write>(&mut self, mut out: W) -> Result<()> {
        self.process();
        let mut dump = String::new();
        if let Some(root) = &self.root {
            root.dump(0, &mut dump);
        }
        out.write_all(dump.as_bytes())?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_processed() {
            return Err(DocumentError::AlreadyProcessed);
        }
        Ok(())
    }

    fn append(&mut self, lines: Vec<Line>) {
        self.lines.extend(lines.into_iter().map(|line| {
            if line.blank {
                Token::BlankLine(line.text)
            } else {
                Token::Text(Text::line(line.text))
            }
        }));
    }

    fn process(&mut self) {
        if self.root.is_some() {
            return;
        }
        let lines = std::mem::take(&mut self.lines);
        log::debug!("processing {} lines", lines.len());
        let blocks = parse_document(lines, &mut self.links);
        log::debug!(
            "{} top-level blocks, {} link references",
            blocks.len(),
            self.links.len()
        );
        let blocks = resolve_spans(blocks, &self.links);
        self.root = Some(Token::container(ContainerKind::Root, blocks));
    }
}

/// Converts Markdown text to HTML with the default options and no
/// highlighting.
pub fn markdown_to_html(source: &str) -> String {
    let mut document = Document::new();
    match document.read(source) {
        Ok(()) => document.to_html(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Document, Options, markdown_to_html};
    use crate::error::DocumentError;

    #[test]
    fn reads_append_until_processed() {
        let mut doc = Document::new();
        doc.read("one\n").unwrap();
        doc.read("two\n").unwrap();
        assert_eq!(doc.to_html(), "<p>one\ntwo</p>\n");
        assert!(matches!(
            doc.read("three"),
            Err(DocumentError::AlreadyProcessed)
        ));
        assert_eq!(doc.to_html(), "<p>one\ntwo</p>\n");
    }

    #[test]
    fn render_needs_processing() {
        let mut doc = Document::new();
        doc.read("x").unwrap();
        assert!(doc.render().is_none());
        doc.to_html();
        assert_eq!(doc.render().as_deref(), Some("<p>x</p>\n"));
    }

    #[test]
    fn tab_stop_is_configurable() {
        let mut doc = Document::with_options(Options { spaces_per_tab: 2 });
        doc.read("a\tb\n\n\tcode").unwrap();
        // Leading tabs always count as four columns.
        assert_eq!(
            doc.to_html(),
            "<p>a b</p>\n<pre><code>code\n</code></pre>\n"
        );
    }

    #[test]
    fn empty_input_renders_a_newline() {
        assert_eq!(markdown_to_html(""), "\n");
    }

    #[test]
    fn token_dump_lists_the_tree() {
        let mut doc = Document::new();
        doc.read("# Title").unwrap();
        let mut out = Vec::new();
        doc.write_tokens(&mut out).unwrap();
        let dump = String::from_utf8(out).unwrap();
        assert!(dump.starts_with("Root\n"));
        assert!(dump.contains("Header(1)"));
    }
}
