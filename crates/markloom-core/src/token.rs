use std::ops::BitOr;

/// Characters escaped when a text token is rendered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Encoding(u8);

impl Encoding {
    pub const NONE: Encoding = Encoding(0);
    /// `&` unless it already starts a valid entity.
    pub const AMPS: Encoding = Encoding(1);
    /// Every `&`.
    pub const DOUBLE_AMPS: Encoding = Encoding(1 << 1);
    pub const ANGLES: Encoding = Encoding(1 << 2);
    pub const QUOTES: Encoding = Encoding(1 << 3);

    pub const fn contains(self, other: Encoding) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Encoding {
    type Output = Encoding;

    fn bitor(self, rhs: Encoding) -> Encoding {
        Encoding(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Text(Text),
    /// A blank line; keeps its text so comment-only lines survive.
    BlankLine(String),
    CodeBlock(String),
    FencedCode(FencedCode),
    /// Tag contents without the surrounding `<` and `>`.
    HtmlTag(String),
    InlineHtml(String),
    InlineHtmlComment(String),
    CodeSpan(String),
    Escaped(char),
    Marker(Marker),
    Image(Image),
    Anchor(Anchor),
    LineBreak,
    Container(Container),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Text {
    pub text: String,
    pub markup: bool,
    pub encoding: Encoding,
}

impl Text {
    /// A raw input line that still has to go through span resolution.
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: true,
            encoding: Encoding::AMPS | Encoding::ANGLES,
        }
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: false,
            encoding: Encoding::AMPS | Encoding::ANGLES,
        }
    }

    pub fn with_encoding(text: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            text: text.into(),
            markup: false,
            encoding,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FencedCode {
    pub code: String,
    pub info: String,
}

impl FencedCode {
    /// First whitespace-delimited word of the info string.
    pub fn language(&self) -> Option<&str> {
        self.info.split_whitespace().next()
    }
}

/// An emphasis delimiter run of `*` or `_`.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub ch: char,
    pub len: usize,
    pub open: bool,
    pub pair: Option<usize>,
    /// Set when the run was split into two smaller runs.
    pub disabled: bool,
}

impl Marker {
    pub fn new(ch: char, len: usize, open: bool) -> Self {
        Self {
            ch,
            len,
            open,
            pair: None,
            disabled: false,
        }
    }

    pub(crate) fn is_unmatched_open(&self) -> bool {
        self.open && self.pair.is_none() && !self.disabled
    }

    pub(crate) fn is_unmatched_close(&self) -> bool {
        !self.open && self.pair.is_none() && !self.disabled
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub url: String,
    pub alt: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Anchor {
    pub url: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Container {
    pub kind: ContainerKind,
    pub children: Vec<Token>,
}

impl Container {
    pub fn new(kind: ContainerKind, children: Vec<Token>) -> Self {
        Self { kind, children }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerKind {
    Root,
    /// Inline tokens produced from one line, rendered back to back.
    Group,
    /// Lines of a paragraph-inhibited container, without a wrapper.
    Plain,
    Paragraph,
    Header(u8),
    BlockQuote,
    UnorderedList,
    OrderedList { start: u64 },
    ListItem { paragraphs: bool },
    HtmlBlock,
}

impl Token {
    pub fn container(kind: ContainerKind, children: Vec<Token>) -> Token {
        Token::Container(Container::new(kind, children))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Token::Container(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Token::Text(text) => Some(&text.text),
            Token::BlankLine(text)
            | Token::CodeBlock(text)
            | Token::HtmlTag(text)
            | Token::InlineHtml(text)
            | Token::InlineHtmlComment(text)
            | Token::CodeSpan(text) => Some(text),
            Token::FencedCode(code) => Some(&code.code),
            _ => None,
        }
    }

    pub fn can_contain_markup(&self) -> bool {
        matches!(self, Token::Text(text) if text.markup)
    }

    pub fn inhibits_paragraphs(&self) -> bool {
        match self {
            Token::Container(container) => match container.kind {
                ContainerKind::ListItem { paragraphs } => !paragraphs,
                ContainerKind::Group
                | ContainerKind::Plain
                | ContainerKind::Paragraph
                | ContainerKind::Header(_)
                | ContainerKind::HtmlBlock => true,
                ContainerKind::Root
                | ContainerKind::BlockQuote
                | ContainerKind::UnorderedList
                | ContainerKind::OrderedList { .. } => false,
            },
            _ => false,
        }
    }

    pub fn is_blank_line(&self) -> bool {
        matches!(self, Token::BlankLine(_))
    }

    /// Raw markup line text, if this token is still an unprocessed line.
    pub(crate) fn markup_line(&self) -> Option<&str> {
        match self {
            Token::Text(text) if text.markup => Some(&text.text),
            _ => None,
        }
    }

    /// Appends the source text this token was built from.
    pub fn write_original(&self, out: &mut String) {
        match self {
            Token::Text(text) => out.push_str(&text.text),
            Token::BlankLine(text)
            | Token::CodeBlock(text)
            | Token::InlineHtml(text)
            | Token::InlineHtmlComment(text) => out.push_str(text),
            Token::FencedCode(code) => out.push_str(&code.code),
            Token::HtmlTag(text) => {
                out.push('<');
                out.push_str(text);
                out.push('>');
            }
            Token::CodeSpan(text) => {
                out.push('`');
                out.push_str(text);
                out.push('`');
            }
            Token::Escaped(ch) => {
                out.push('\\');
                out.push(*ch);
            }
            Token::Marker(marker) => {
                for _ in 0..marker.len {
                    out.push(marker.ch);
                }
            }
            Token::Image(_) | Token::Anchor(_) | Token::LineBreak => {}
            Token::Container(container) => {
                for child in &container.children {
                    child.write_original(out);
                }
            }
        }
    }

    /// Indented one-token-per-line description of the tree.
    pub fn dump(&self, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        let line = match self {
            Token::Text(text) if text.markup => format!("Line {:?}", text.text),
            Token::Text(text) => format!("Text {:?}", text.text),
            Token::BlankLine(text) => format!("BlankLine {:?}", text),
            Token::CodeBlock(text) => format!("CodeBlock {:?}", text),
            Token::FencedCode(code) => {
                format!("FencedCode info={:?} {:?}", code.info, code.code)
            }
            Token::HtmlTag(text) => format!("HtmlTag {:?}", text),
            Token::InlineHtml(text) => format!("InlineHtml {:?}", text),
            Token::InlineHtmlComment(text) => format!("InlineHtmlComment {:?}", text),
            Token::CodeSpan(text) => format!("CodeSpan {:?}", text),
            Token::Escaped(ch) => format!("Escaped {:?}", ch),
            Token::Marker(marker) => format!(
                "Marker {:?}x{} {} pair={:?}{}",
                marker.ch,
                marker.len,
                if marker.open { "open" } else { "close" },
                marker.pair,
                if marker.disabled { " disabled" } else { "" }
            ),
            Token::Image(image) => format!("Image {:?} alt={:?}", image.url, image.alt),
            Token::Anchor(anchor) => format!("Anchor {:?}", anchor.url),
            Token::LineBreak => "LineBreak".to_string(),
            Token::Container(container) => format!("{:?}", container.kind),
        };
        out.push_str(&line);
        out.push('\n');
        if let Token::Container(container) = self {
            for child in &container.children {
                child.dump(depth + 1, out);
            }
        }
    }
}
