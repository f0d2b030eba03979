use std::collections::{HashMap, HashSet};

use ammonia::Builder;

use crate::highlight::Highlighter;
use crate::token::{Container, ContainerKind, Encoding, Marker, Token};

/// Renders the children of a document root. The result ends with a newline.
pub(crate) fn emit_html(blocks: &[Token], highlighter: &dyn Highlighter) -> String {
    let mut writer = HtmlWriter::new(highlighter);
    let mut out = writer.blocks(blocks);
    out.push('\n');
    out
}

/// Cleans rendered HTML against an allow-list of the tags and attributes the
/// renderer itself produces.
pub(crate) fn sanitize_html(html: &str) -> String {
    let tags: HashSet<&'static str> = [
        "a",
        "abbr",
        "b",
        "blockquote",
        "br",
        "cite",
        "code",
        "dd",
        "del",
        "div",
        "dl",
        "dt",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "i",
        "img",
        "ins",
        "kbd",
        "li",
        "ol",
        "p",
        "pre",
        "q",
        "samp",
        "span",
        "strong",
        "sub",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "ul",
        "var",
    ]
    .iter()
    .copied()
    .collect();

    let mut generic_attributes: HashSet<&'static str> = HashSet::new();
    generic_attributes.insert("title");

    let mut tag_attributes = HashMap::new();
    tag_attributes.insert("a", ["href"].iter().copied().collect());
    tag_attributes.insert("img", ["alt", "src"].iter().copied().collect());
    tag_attributes.insert("ol", ["start"].iter().copied().collect());
    // Highlighters emit classed or styled spans inside code.
    tag_attributes.insert("code", ["class"].iter().copied().collect());
    tag_attributes.insert("span", ["class", "style"].iter().copied().collect());

    Builder::new()
        .tags(tags)
        .generic_attributes(generic_attributes)
        .tag_attributes(tag_attributes)
        .clean(html)
        .to_string()
}

/// Escapes the characters selected by `encoding`.
pub fn encode(text: &str, encoding: Encoding) -> String {
    let mut out = String::with_capacity(text.len());
    for (idx, ch) in text.char_indices() {
        match ch {
            '&' if encoding.contains(Encoding::DOUBLE_AMPS) => out.push_str("&amp;"),
            '&' if encoding.contains(Encoding::AMPS) && !starts_entity(&text[idx..]) => {
                out.push_str("&amp;")
            }
            '<' if encoding.contains(Encoding::ANGLES) => out.push_str("&lt;"),
            '>' if encoding.contains(Encoding::ANGLES) => out.push_str("&gt;"),
            '"' if encoding.contains(Encoding::QUOTES) => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

// `&amp;`, `&#NNN;` or `&#xHH;` at the start of `text`.
fn starts_entity(text: &str) -> bool {
    if text.starts_with("&amp;") {
        return true;
    }
    let Some(rest) = text.strip_prefix("&#") else {
        return false;
    };
    let (digits, max, is_digit): (&str, usize, fn(&u8) -> bool) =
        match rest.strip_prefix(['x', 'X']) {
            Some(hex) => (hex, 2, u8::is_ascii_hexdigit),
            None => (rest, 3, u8::is_ascii_digit),
        };
    let len = digits.bytes().take_while(|b| is_digit(b)).count();
    (1..=max).contains(&len) && digits.as_bytes().get(len) == Some(&b';')
}

struct HtmlWriter<'a> {
    highlighter: &'a dyn Highlighter,
}

impl<'a> HtmlWriter<'a> {
    fn new(highlighter: &'a dyn Highlighter) -> Self {
        Self { highlighter }
    }

    /// Block-level children, one per line. Empty blank lines vanish; a blank
    /// line that carried a comment keeps it.
    fn blocks(&mut self, tokens: &[Token]) -> String {
        let mut parts = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token {
                Token::BlankLine(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        parts.push(text.to_string());
                    }
                }
                _ => parts.push(self.token(token)),
            }
        }
        parts.join("\n")
    }

    // Lines of a paragraph; a hard break closes the line before it.
    fn lines(&mut self, tokens: &[Token]) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token {
                Token::LineBreak => match lines.last_mut() {
                    Some(last) => last.push_str("<br />"),
                    None => lines.push("<br />".to_string()),
                },
                _ => lines.push(self.token(token)),
            }
        }
        lines.join("\n")
    }

    fn inline(&mut self, tokens: &[Token]) -> String {
        let mut out = String::new();
        for token in tokens {
            out.push_str(&self.token(token));
        }
        out
    }

    fn token(&mut self, token: &Token) -> String {
        match token {
            Token::Text(text) => encode(&text.text, text.encoding),
            Token::BlankLine(text) => text.trim().to_string(),
            Token::CodeBlock(code) => code_block(None, &encode_code(code)),
            Token::FencedCode(fenced) => match fenced.language() {
                Some(language) => {
                    let mut body = String::new();
                    self.highlighter.highlight(&fenced.code, language, &mut body);
                    code_block(Some(language), &body)
                }
                None => code_block(None, &encode_code(&fenced.code)),
            },
            Token::HtmlTag(text) => format!("<{}>", encode(text, Encoding::AMPS | Encoding::ANGLES)),
            Token::InlineHtml(text) => encode(text, Encoding::AMPS | Encoding::ANGLES),
            Token::InlineHtmlComment(text) => text.clone(),
            Token::CodeSpan(text) => format!(
                "<code>{}</code>",
                encode(
                    text,
                    Encoding::DOUBLE_AMPS | Encoding::ANGLES | Encoding::QUOTES
                )
            ),
            Token::Escaped(ch) => encode(ch.encode_utf8(&mut [0; 4]), Encoding::AMPS | Encoding::ANGLES),
            Token::Marker(marker) => marker_html(marker),
            Token::Image(image) => {
                let mut out = format!(
                    "<img src=\"{}\" alt=\"{}\"",
                    attribute(&image.url),
                    attribute(&image.alt)
                );
                if !image.title.is_empty() {
                    out.push_str(&format!(" title=\"{}\"", attribute(&image.title)));
                }
                out.push_str(" />");
                out
            }
            Token::Anchor(anchor) => {
                let mut out = format!("<a href=\"{}\"", attribute(&anchor.url));
                if !anchor.title.is_empty() {
                    out.push_str(&format!(" title=\"{}\"", attribute(&anchor.title)));
                }
                out.push('>');
                out
            }
            Token::LineBreak => "<br />".to_string(),
            Token::Container(container) => self.container(container),
        }
    }

    fn container(&mut self, container: &Container) -> String {
        let children = &container.children;
        match container.kind {
            ContainerKind::Root => self.blocks(children),
            ContainerKind::Group => self.inline(children),
            ContainerKind::Plain => self.lines(children),
            ContainerKind::Paragraph => format!("<p>{}</p>", self.lines(children)),
            ContainerKind::Header(level) => {
                format!("<h{}>{}</h{}>", level, self.inline(children), level)
            }
            ContainerKind::BlockQuote => {
                let body = self.blocks(children);
                if body.is_empty() {
                    "<blockquote>\n</blockquote>".to_string()
                } else {
                    format!("<blockquote>\n{}\n</blockquote>", body)
                }
            }
            ContainerKind::UnorderedList => format!("<ul>\n{}\n</ul>", self.blocks(children)),
            ContainerKind::OrderedList { start } => {
                let body = self.blocks(children);
                if start == 1 {
                    format!("<ol>\n{}\n</ol>", body)
                } else {
                    format!("<ol start=\"{}\">\n{}\n</ol>", start, body)
                }
            }
            ContainerKind::ListItem { .. } => format!("<li>{}</li>", self.blocks(children)),
            ContainerKind::HtmlBlock => {
                let mut out = self.inline(children);
                if out.ends_with('\n') {
                    out.pop();
                }
                out
            }
        }
    }
}

fn encode_code(code: &str) -> String {
    encode(code, Encoding::DOUBLE_AMPS | Encoding::ANGLES)
}

fn attribute(text: &str) -> String {
    encode(text, Encoding::AMPS | Encoding::QUOTES)
}

fn code_block(language: Option<&str>, body: &str) -> String {
    match language {
        Some(language) => format!(
            "<pre><code class=\"language-{}\">{}</code></pre>",
            attribute(language),
            body
        ),
        None => format!("<pre><code>{}</code></pre>", body),
    }
}

fn marker_html(marker: &Marker) -> String {
    if marker.disabled {
        return String::new();
    }
    if marker.pair.is_none() {
        return marker.ch.to_string().repeat(marker.len);
    }
    let tag = match (marker.len, marker.open) {
        (1, true) => "<em>",
        (2, true) => "<strong>",
        (_, true) => "<strong><em>",
        (1, false) => "</em>",
        (2, false) => "</strong>",
        (_, false) => "</em></strong>",
    };
    tag.to_string()
}

#[cfg(test)]
mod tests {
    use super::{emit_html, encode, sanitize_html};
    use crate::highlight::PlainHighlighter;
    use crate::token::{Anchor, ContainerKind, Encoding, Marker, Text, Token};

    fn render(tokens: Vec<Token>) -> String {
        emit_html(&tokens, &PlainHighlighter)
    }

    #[test]
    fn amps_keep_numeric_entities() {
        let enc = Encoding::AMPS | Encoding::ANGLES;
        assert_eq!(encode("&amp; &#169; &#x4; &", enc), "&amp; &#169; &#x4; &amp;");
        assert_eq!(encode("&#1234; &#x123;", enc), "&amp;#1234; &amp;#x123;");
        assert_eq!(encode("&copy;", enc), "&amp;copy;");
        assert_eq!(encode("&amp;", Encoding::DOUBLE_AMPS), "&amp;amp;");
    }

    #[test]
    fn empty_quote_has_no_inner_line() {
        let quote = Token::container(
            ContainerKind::BlockQuote,
            vec![Token::BlankLine(String::new())],
        );
        assert_eq!(render(vec![quote]), "<blockquote>\n</blockquote>\n");
    }

    #[test]
    fn quotes_only_when_asked() {
        assert_eq!(encode("\"<\"", Encoding::QUOTES), "&quot;<&quot;");
        assert_eq!(encode("\"<\"", Encoding::ANGLES), "\"&lt;\"");
    }

    #[test]
    fn paragraphs_join_lines_and_breaks() {
        let para = Token::container(
            ContainerKind::Paragraph,
            vec![
                Token::Text(Text::literal("one")),
                Token::LineBreak,
                Token::Text(Text::literal("two")),
            ],
        );
        assert_eq!(render(vec![para]), "<p>one<br />\ntwo</p>\n");
    }

    #[test]
    fn blank_lines_drop_unless_commented() {
        let tokens = vec![
            Token::HtmlTag("hr /".to_string()),
            Token::BlankLine("   ".to_string()),
            Token::BlankLine("<!-- c --> ".to_string()),
        ];
        assert_eq!(render(tokens), "<hr />\n<!-- c -->\n");
    }

    #[test]
    fn ordered_lists_carry_their_start() {
        let item = |text: &str| {
            Token::container(
                ContainerKind::ListItem { paragraphs: false },
                vec![Token::Text(Text::literal(text))],
            )
        };
        let list = Token::container(ContainerKind::OrderedList { start: 3 }, vec![item("c")]);
        assert_eq!(render(vec![list]), "<ol start=\"3\">\n<li>c</li>\n</ol>\n");
    }

    #[test]
    fn markers_render_by_state() {
        let mut open = Marker::new('*', 3, true);
        open.pair = Some(0);
        let mut close = Marker::new('*', 3, false);
        close.pair = Some(0);
        let mut split = Marker::new('_', 3, true);
        split.disabled = true;
        let group = Token::container(
            ContainerKind::Group,
            vec![
                Token::Marker(open),
                Token::Marker(split),
                Token::Marker(Marker::new('_', 2, true)),
                Token::Marker(close),
            ],
        );
        assert_eq!(render(vec![group]), "<strong><em>__</em></strong>\n");
    }

    #[test]
    fn anchor_attributes_escape_quotes() {
        let anchor = Token::Anchor(Anchor {
            url: "/a?x=1&y=\"2\"".to_string(),
            title: "t".to_string(),
        });
        assert_eq!(
            render(vec![anchor]),
            "<a href=\"/a?x=1&amp;y=&quot;2&quot;\" title=\"t\">\n"
        );
    }

    #[test]
    fn sanitizer_strips_scripts() {
        let html = "<p onclick=\"x()\">a<script>alert(1)</script></p>";
        assert_eq!(sanitize_html(html), "<p>a</p>");
    }
}
