use std::collections::HashSet;
use std::ops::Range;

use once_cell::sync::Lazy;

use crate::token::Token;

const INLINE_TAG_NAMES: &[&str] = &[
    "title", "link", "script", "style", "object", "meta", "em", "strong", "q", "cite", "dfn",
    "abbr", "acronym", "code", "samp", "kbd", "var", "sub", "sup", "del", "ins", "isindex", "a",
    "img", "br", "map", "area", "param", "applet", "span",
];

const BLOCK_TAG_NAMES: &[&str] = &[
    "address", "article", "aside", "base", "basefont", "blockquote", "body", "caption",
    "center", "col", "colgroup", "dd", "details", "dir", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hr", "html", "iframe", "legend", "li", "link", "main", "menu",
    "menuitem", "meta", "nav", "noframes", "ol", "optgroup", "option", "p", "param", "section",
    "source", "summary", "table", "tbody", "tr", "th", "td", "thead", "tfoot", "title", "track",
    "ul",
];

static INLINE_TAGS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| INLINE_TAG_NAMES.iter().copied().collect());
static BLOCK_TAGS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| BLOCK_TAG_NAMES.iter().copied().collect());

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TagClass {
    Inline,
    Block,
}

/// Looks a tag name up, preferring the block table for names in both.
pub(crate) fn classify_tag(name: &str) -> Option<TagClass> {
    let lowered = name.to_ascii_lowercase();
    if BLOCK_TAGS.contains(lowered.as_str()) {
        Some(TagClass::Block)
    } else if INLINE_TAGS.contains(lowered.as_str()) {
        Some(TagClass::Inline)
    } else {
        None
    }
}

/// True only for names that are block-level and never inline (`link`,
/// `meta`, `param` and `title` appear in both tables).
pub(crate) fn is_block_only_tag(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    BLOCK_TAGS.contains(lowered.as_str()) && !INLINE_TAGS.contains(lowered.as_str())
}

/// A syntactically complete `<name attr="value" ...>` tag.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TagMatch<'a> {
    pub name: &'a str,
    pub closing: bool,
    pub attributes: usize,
    /// Byte ranges of each `="value"` part, quotes included.
    pub values: Vec<Range<usize>>,
    /// Index just past the closing `>`.
    pub end: usize,
}

/// Parses a tag starting at `pos`, which must hold `<`.
pub(crate) fn parse_tag_at(text: &str, pos: usize) -> Option<TagMatch<'_>> {
    let bytes = text.as_bytes();
    let (name, closing, attrs_start) = scan_tag_name(bytes, pos)?;
    let mut values = Vec::new();
    let (after_attrs, attributes) = scan_attributes(bytes, attrs_start, &mut values);
    let idx = scan_tag_tail(bytes, after_attrs);
    if bytes.get(idx) != Some(&b'>') {
        return None;
    }
    Some(TagMatch {
        name: &text[name],
        closing,
        attributes,
        values,
        end: idx + 1,
    })
}

/// The whole line is exactly one tag.
pub(crate) fn is_lone_tag(line: &str) -> bool {
    line.starts_with('<') && parse_tag_at(line, 0).is_some_and(|tag| tag.end == line.len())
}

/// `<name attr="v"` running to the end of the line without a `>`.
pub(crate) fn is_unterminated_tag_open(line: &str) -> bool {
    let bytes = line.as_bytes();
    let Some((_, _, attrs_start)) = scan_tag_name(bytes, 0) else {
        return false;
    };
    let mut values = Vec::new();
    let (after_attrs, _) = scan_attributes(bytes, attrs_start, &mut values);
    scan_tag_tail(bytes, after_attrs) == bytes.len()
}

/// Attributes followed by `>` ending the line, the rest of a tag opened on the
/// previous line.
pub(crate) fn completes_tag(line: &str) -> bool {
    let padded = format!(" {}", line.trim_start_matches(' '));
    let bytes = padded.as_bytes();
    let mut values = Vec::new();
    let (after_attrs, _) = scan_attributes(bytes, 0, &mut values);
    let idx = scan_tag_tail(bytes, after_attrs);
    idx + 1 == bytes.len() && bytes[idx] == b'>'
}

/// Splits one line of an HTML block into tag tokens and the text between
/// them. The final piece carries the line's newline.
pub(crate) fn split_html_line(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut copied = 0usize;
    let mut idx = 0usize;
    while let Some(offset) = line[idx..].find('<') {
        let start = idx + offset;
        match parse_tag_at(line, start) {
            Some(tag) => {
                if start > copied {
                    tokens.push(Token::InlineHtml(line[copied..start].to_string()));
                }
                tokens.push(Token::HtmlTag(line[start + 1..tag.end - 1].to_string()));
                copied = tag.end;
                idx = tag.end;
            }
            None => idx = start + 1,
        }
    }
    let mut rest = line[copied..].to_string();
    rest.push('\n');
    tokens.push(Token::InlineHtml(rest));
    tokens
}

fn scan_tag_name(bytes: &[u8], pos: usize) -> Option<(Range<usize>, bool, usize)> {
    if bytes.get(pos) != Some(&b'<') {
        return None;
    }
    let mut idx = pos + 1;
    let closing = bytes.get(idx) == Some(&b'/');
    if closing {
        idx += 1;
    }
    let name_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_alphanumeric() {
        idx += 1;
    }
    if idx == name_start {
        return None;
    }
    Some((name_start..idx, closing, idx))
}

fn scan_attributes(bytes: &[u8], mut idx: usize, values: &mut Vec<Range<usize>>) -> (usize, usize) {
    let mut count = 0usize;
    loop {
        let mut pos = idx;
        while pos < bytes.len() && bytes[pos] == b' ' {
            pos += 1;
        }
        if pos == idx {
            break;
        }
        let name_start = pos;
        while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'-') {
            pos += 1;
        }
        if pos == name_start {
            break;
        }
        if let Some(value) = scan_attribute_value(bytes, pos) {
            pos = value.end;
            values.push(value);
        }
        idx = pos;
        count += 1;
    }
    (idx, count)
}

// ` ?= ?` followed by a quoted value; the returned range starts at `=`.
fn scan_attribute_value(bytes: &[u8], mut pos: usize) -> Option<Range<usize>> {
    if bytes.get(pos) == Some(&b' ') {
        pos += 1;
    }
    if bytes.get(pos) != Some(&b'=') {
        return None;
    }
    let start = pos;
    pos += 1;
    if bytes.get(pos) == Some(&b' ') {
        pos += 1;
    }
    let quote = *bytes.get(pos)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let close = bytes[pos + 1..].iter().position(|&b| b == quote)?;
    Some(start..pos + 1 + close + 1)
}

// ` */? *`
fn scan_tag_tail(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx] == b' ' {
        idx += 1;
    }
    if bytes.get(idx) == Some(&b'/') {
        idx += 1;
    }
    while idx < bytes.len() && bytes[idx] == b' ' {
        idx += 1;
    }
    idx
}
