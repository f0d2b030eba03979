use crate::emphasis::{CharClass, Piece, delimiter_role, match_markers};
use crate::html::{classify_tag, parse_tag_at};
use crate::label::{implicit_link_id, parse_link_title};
use crate::link_table::LinkTable;
use crate::token::{Anchor, ContainerKind, Encoding, Image, Marker, Text, Token};

const ESCAPABLE: &str = "\\`*_{}[]()#+-.!>";
const URL_PREFIXES: &[&str] = &[
    "http://", "https://", "ftp://", "ftps://", "file://", "www.", "ftp.",
];

/// Resolves the inline markup of every line still marked as markup, walking
/// into containers.
pub(crate) fn resolve_spans(tokens: Vec<Token>, links: &LinkTable) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Text(text) if text.markup => {
                let mut inline = resolve_line(&text.text, links);
                match inline.len() {
                    0 => {}
                    1 => out.extend(inline.pop()),
                    _ => out.push(Token::container(ContainerKind::Group, inline)),
                }
            }
            Token::Container(container) => out.push(Token::container(
                container.kind,
                resolve_spans(container.children, links),
            )),
            other => out.push(other),
        }
    }
    out
}

/// Turns one line of text into inline tokens.
pub(crate) fn resolve_line(text: &str, links: &LinkTable) -> Vec<Token> {
    let mut resolver = SpanResolver {
        links,
        slots: Vec::new(),
    };
    let atoms = resolver.protect_attributes(text);
    let atoms = resolver.code_spans(&atoms);
    let atoms = resolver.escapes(&atoms);
    let atoms = resolver.links_and_tags(&atoms, true);
    resolver.assemble(&atoms)
}

/// A character still open to interpretation, or a reference to a token that
/// an earlier step has already built.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Atom {
    Char(char),
    Slot(usize),
}

struct SpanResolver<'a> {
    links: &'a LinkTable,
    slots: Vec<Option<Token>>,
}

impl SpanResolver<'_> {
    fn slot(&mut self, token: Token) -> Atom {
        self.slots.push(Some(token));
        Atom::Slot(self.slots.len() - 1)
    }

    /// Source text of the atoms, with resolved tokens written back as the
    /// markup they came from.
    fn original(&self, atoms: &[Atom]) -> String {
        let mut out = String::new();
        for atom in atoms {
            match *atom {
                Atom::Char(ch) => out.push(ch),
                Atom::Slot(idx) => {
                    if let Some(token) = self.slots.get(idx).and_then(Option::as_ref) {
                        token.write_original(&mut out);
                    }
                }
            }
        }
        out
    }

    // Like `original`, but escaped characters lose their backslash.
    fn plain(&self, atoms: &[Atom]) -> String {
        let mut out = String::new();
        for atom in atoms {
            match *atom {
                Atom::Char(ch) => out.push(ch),
                Atom::Slot(idx) => match self.slots.get(idx).and_then(Option::as_ref) {
                    Some(Token::Escaped(ch)) => out.push(*ch),
                    Some(token) => token.write_original(&mut out),
                    None => {}
                },
            }
        }
        out
    }

    fn protect_attributes(&mut self, text: &str) -> Vec<Atom> {
        let mut atoms = Vec::with_capacity(text.len());
        let mut copied = 0usize;
        let mut idx = 0usize;
        while let Some(offset) = text[idx..].find('<') {
            let start = idx + offset;
            let tag = parse_tag_at(text, start).filter(|tag| {
                !tag.closing && tag.attributes > 0 && classify_tag(tag.name).is_some()
            });
            let Some(tag) = tag else {
                idx = start + 1;
                continue;
            };
            for value in &tag.values {
                atoms.extend(text[copied..value.start].chars().map(Atom::Char));
                let protected = Text::with_encoding(
                    &text[value.clone()],
                    Encoding::AMPS | Encoding::ANGLES,
                );
                atoms.push(self.slot(Token::Text(protected)));
                copied = value.end;
            }
            idx = tag.end;
        }
        atoms.extend(text[copied..].chars().map(Atom::Char));
        atoms
    }

    fn code_spans(&mut self, atoms: &[Atom]) -> Vec<Atom> {
        let mut out = Vec::with_capacity(atoms.len());
        let mut idx = 0usize;
        while idx < atoms.len() {
            if atoms[idx] != Atom::Char('`') {
                out.push(atoms[idx]);
                idx += 1;
                continue;
            }
            let run = backtick_run(atoms, idx);
            match find_code_span_close(atoms, idx + run, run) {
                Some(close) => {
                    let content = self.original(&atoms[idx + run..close]);
                    let content = content.strip_prefix(' ').unwrap_or(&content);
                    let content = content.strip_suffix(' ').unwrap_or(content);
                    let span = Token::CodeSpan(content.to_string());
                    out.push(self.slot(span));
                    idx = close + run;
                }
                None => {
                    out.extend(&atoms[idx..idx + run]);
                    idx += run;
                }
            }
        }
        out
    }

    fn escapes(&mut self, atoms: &[Atom]) -> Vec<Atom> {
        let mut out = Vec::with_capacity(atoms.len());
        let mut idx = 0usize;
        while idx < atoms.len() {
            match (atoms[idx], atoms.get(idx + 1)) {
                (Atom::Char('\\'), Some(&Atom::Char(ch))) if ESCAPABLE.contains(ch) => {
                    out.push(self.slot(Token::Escaped(ch)));
                    idx += 2;
                }
                (atom, _) => {
                    out.push(atom);
                    idx += 1;
                }
            }
        }
        out
    }

    /// Links and images (when `allow_links`), autolinks and literal HTML tags.
    fn links_and_tags(&mut self, atoms: &[Atom], allow_links: bool) -> Vec<Atom> {
        let mut out = Vec::with_capacity(atoms.len());
        let mut idx = 0usize;
        while idx < atoms.len() {
            let resolved = match atoms[idx] {
                Atom::Char('!') if allow_links && atoms.get(idx + 1) == Some(&Atom::Char('[')) => {
                    self.link(atoms, idx + 1, true)
                }
                Atom::Char('[') if allow_links => self.link(atoms, idx, false),
                Atom::Char('<') => self.tag_or_autolink(atoms, idx, allow_links),
                _ => None,
            };
            match resolved {
                Some((replacement, next)) => {
                    out.extend(replacement);
                    idx = next;
                }
                // Unresolved syntax keeps only its first character; the rest
                // is scanned again.
                None => {
                    out.push(atoms[idx]);
                    idx += 1;
                }
            }
        }
        out
    }

    fn link(&mut self, atoms: &[Atom], open: usize, image: bool) -> Option<(Vec<Atom>, usize)> {
        let close = matching_delimiter(atoms, open, '[', ']')?;
        let text = &atoms[open + 1..close];

        if atoms.get(close + 1) == Some(&Atom::Char('(')) {
            let paren_close = matching_delimiter(atoms, close + 1, '(', ')')?;
            let destination = self.plain(&atoms[close + 2..paren_close]);
            let (url, title) = parse_destination(&destination)?;
            let replacement = self.build_link(text, url.to_string(), title.to_string(), image);
            return Some((replacement, paren_close + 1));
        }

        if text.is_empty() {
            return None;
        }
        let mut next = close + 1;
        let mut probe = next;
        while atoms.get(probe) == Some(&Atom::Char(' ')) {
            probe += 1;
        }
        let mut id = String::new();
        if atoms.get(probe) == Some(&Atom::Char('[')) {
            let id_close = (probe + 1..atoms.len()).find(|&i| atoms[i] == Atom::Char(']'))?;
            id = self.plain(&atoms[probe + 1..id_close]);
            next = id_close + 1;
        }
        if id.is_empty() {
            id = implicit_link_id(&self.plain(text));
        }
        let target = self.links.find(&id)?;
        let (url, title) = (target.url.clone(), target.title.clone());
        log::trace!("reference link [{}] -> {}", id, url);
        Some((self.build_link(text, url, title, image), next))
    }

    fn build_link(&mut self, text: &[Atom], url: String, title: String, image: bool) -> Vec<Atom> {
        if image {
            let alt = self.plain(text);
            return vec![self.slot(Token::Image(Image { url, alt, title }))];
        }
        let mut atoms = vec![self.slot(Token::Anchor(Anchor { url, title }))];
        atoms.extend(self.links_and_tags(text, false));
        atoms.push(self.slot(Token::HtmlTag("/a".to_string())));
        atoms
    }

    fn tag_or_autolink(
        &mut self,
        atoms: &[Atom],
        open: usize,
        allow_links: bool,
    ) -> Option<(Vec<Atom>, usize)> {
        let mut pos = open + 1;
        if atoms.get(pos) == Some(&Atom::Char('/')) {
            pos += 1;
        }
        let name_start = pos;
        let mut name = String::new();
        while let Some(&Atom::Char(ch)) = atoms.get(pos) {
            if !ch.is_ascii_alphanumeric() {
                break;
            }
            name.push(ch);
            pos += 1;
        }
        if pos == name_start {
            return None;
        }
        let close = (pos..atoms.len()).find(|&i| atoms[i] == Atom::Char('>'))?;
        let contents = self.original(&atoms[open + 1..close]);

        let token = if allow_links && looks_like_url(&contents) {
            autolink(contents.clone(), contents)
        } else if allow_links && looks_like_email(&contents) {
            autolink(
                encode_email(&format!("mailto:{}", contents)),
                encode_email(&contents),
            )
        } else if classify_tag(&name).is_some() {
            Token::HtmlTag(contents)
        } else {
            Token::Text(Text::literal(self.original(&atoms[open..=close])))
        };
        Some((vec![self.slot(token)], close + 1))
    }

    /// Builds the final tokens, pairing emphasis delimiters on the way.
    fn assemble(&mut self, atoms: &[Atom]) -> Vec<Token> {
        let mut pieces: Vec<Piece<Token>> = Vec::new();
        let mut text = String::new();
        let mut idx = 0usize;
        while idx < atoms.len() {
            match atoms[idx] {
                Atom::Char(ch @ ('*' | '_')) => {
                    let run = atoms[idx..]
                        .iter()
                        .take_while(|&&atom| atom == Atom::Char(ch))
                        .count();
                    let before = idx.checked_sub(1).map(|i| atoms[i]);
                    let after = atoms.get(idx + run).copied();
                    let between_alphanumerics = is_alphanumeric(before) && is_alphanumeric(after);
                    let prev = before.map_or(CharClass::Other, atom_class);
                    let next = after.map_or(CharClass::Space, atom_class);
                    match delimiter_role(ch, run, prev, next, between_alphanumerics) {
                        Some(open) => {
                            flush_text(&mut text, &mut pieces);
                            pieces.push(Piece::Marker(Marker::new(ch, run, open)));
                        }
                        None => text.extend(std::iter::repeat_n(ch, run)),
                    }
                    idx += run;
                }
                Atom::Char(ch) => {
                    text.push(ch);
                    idx += 1;
                }
                Atom::Slot(slot) => {
                    flush_text(&mut text, &mut pieces);
                    if let Some(token) = self.slots.get_mut(slot).and_then(Option::take) {
                        pieces.push(Piece::Item(token));
                    }
                    idx += 1;
                }
            }
        }
        flush_text(&mut text, &mut pieces);

        match_markers(&mut pieces);
        pieces
            .into_iter()
            .map(|piece| match piece {
                Piece::Text(text) => Token::Text(Text::literal(text)),
                Piece::Marker(marker) => Token::Marker(marker),
                Piece::Item(token) => token,
            })
            .collect()
    }
}

fn flush_text(text: &mut String, pieces: &mut Vec<Piece<Token>>) {
    if !text.is_empty() {
        pieces.push(Piece::Text(std::mem::take(text)));
    }
}

fn atom_class(atom: Atom) -> CharClass {
    match atom {
        Atom::Char(ch) => CharClass::of(ch),
        Atom::Slot(_) => CharClass::Other,
    }
}

fn is_alphanumeric(atom: Option<Atom>) -> bool {
    matches!(atom, Some(Atom::Char(ch)) if ch.is_alphanumeric())
}

fn backtick_run(atoms: &[Atom], idx: usize) -> usize {
    atoms[idx..]
        .iter()
        .take_while(|&&atom| atom == Atom::Char('`'))
        .count()
}

// Next run of exactly `run` backticks with some non-space content before it.
fn find_code_span_close(atoms: &[Atom], start: usize, run: usize) -> Option<usize> {
    let mut idx = start;
    while idx < atoms.len() {
        if atoms[idx] != Atom::Char('`') {
            idx += 1;
            continue;
        }
        let len = backtick_run(atoms, idx);
        let has_content = atoms[start..idx]
            .iter()
            .any(|&atom| atom != Atom::Char(' '));
        if len == run && has_content {
            return Some(idx);
        }
        idx += len;
    }
    None
}

fn matching_delimiter(atoms: &[Atom], open: usize, left: char, right: char) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, atom) in atoms.iter().enumerate().skip(open) {
        match *atom {
            Atom::Char(ch) if ch == left => depth += 1,
            Atom::Char(ch) if ch == right => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

// `<?url>?` with an optional quoted or parenthesized title.
fn parse_destination(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_matches(' ');
    let body = text.strip_prefix('<').unwrap_or(text);
    let url_len = body.find([' ', '>']).unwrap_or(body.len());
    let url = &body[..url_len];
    let rest = &body[url_len..];
    let rest = rest.strip_prefix('>').unwrap_or(rest).trim_matches(' ');
    if rest.is_empty() {
        return Some((url, ""));
    }
    parse_link_title(rest).map(|title| (url, title))
}

fn autolink(url: String, text: String) -> Token {
    Token::container(
        ContainerKind::Group,
        vec![
            Token::Anchor(Anchor {
                url,
                title: String::new(),
            }),
            Token::Text(Text::literal(text)),
            Token::HtmlTag("/a".to_string()),
        ],
    )
}

fn looks_like_url(text: &str) -> bool {
    URL_PREFIXES.iter().any(|prefix| {
        text.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

fn looks_like_email(text: &str) -> bool {
    let Some((name, site)) = text.split_once('@') else {
        return false;
    };
    let name_ok = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "._%+-".contains(ch));
    let site_ok = site
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || "._%-".contains(ch) || !ch.is_ascii());
    let Some((host, tld)) = site.rsplit_once('.') else {
        return false;
    };
    name_ok
        && site_ok
        && !host.is_empty()
        && (2..=4).contains(&tld.len())
        && tld.chars().all(|ch| ch.is_ascii_alphabetic())
}

/// Writes ASCII characters as alternating decimal and hexadecimal character
/// references.
fn encode_email(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 6);
    let mut hex = false;
    for ch in text.chars() {
        if !ch.is_ascii() {
            out.push(ch);
            continue;
        }
        if hex {
            out.push_str(&format!("&#x{:x};", ch as u32));
        } else {
            out.push_str(&format!("&#{};", ch as u32));
        }
        hex = !hex;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{encode_email, looks_like_email, looks_like_url, resolve_line};
    use crate::link_table::LinkTable;
    use crate::token::{Anchor, ContainerKind, Token};

    fn resolve(text: &str) -> Vec<Token> {
        resolve_line(text, &LinkTable::new())
    }

    fn literal(text: &str) -> Token {
        Token::Text(crate::token::Text::literal(text))
    }

    #[test]
    fn code_spans_protect_their_content() {
        assert_eq!(
            resolve("a `*b*` c"),
            vec![literal("a "), Token::CodeSpan("*b*".to_string()), literal(" c")]
        );
        assert_eq!(
            resolve("`` a ` b ``"),
            vec![Token::CodeSpan("a ` b".to_string())]
        );
    }

    #[test]
    fn unmatched_backticks_stay_literal() {
        assert_eq!(resolve("``a`"), vec![literal("``a`")]);
    }

    #[test]
    fn escapes_become_tokens() {
        assert_eq!(
            resolve("\\*a\\q"),
            vec![Token::Escaped('*'), literal("a\\q")]
        );
    }

    #[test]
    fn inline_link_wraps_text() {
        let tokens = resolve("[go](/x \"T\")");
        assert_eq!(
            tokens,
            vec![
                Token::Anchor(Anchor {
                    url: "/x".to_string(),
                    title: "T".to_string()
                }),
                literal("go"),
                Token::HtmlTag("/a".to_string()),
            ]
        );
    }

    #[test]
    fn destination_may_nest_parentheses() {
        let tokens = resolve("[w](http://e.test/a_(b))");
        assert!(matches!(&tokens[0], Token::Anchor(a) if a.url == "http://e.test/a_(b)"));
    }

    #[test]
    fn reference_links_use_the_table() {
        let mut links = LinkTable::new();
        links.add("Ref", "/r", "");
        let tokens = resolve_line("[x][ref] and [Ref]", &links);
        let anchors = tokens
            .iter()
            .filter(|t| matches!(t, Token::Anchor(a) if a.url == "/r"))
            .count();
        assert_eq!(anchors, 2);
    }

    #[test]
    fn unresolved_reference_is_literal() {
        assert_eq!(resolve("[link][nope]"), vec![literal("[link][nope]")]);
    }

    #[test]
    fn images_keep_plain_alt_text() {
        let tokens = resolve("![a \\* b](/i.png)");
        match &tokens[0] {
            Token::Image(image) => {
                assert_eq!(image.alt, "a * b");
                assert_eq!(image.url, "/i.png");
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn angle_brackets_resolve_in_order() {
        let url = resolve("<http://e.test>");
        assert!(matches!(&url[0], Token::Container(c) if c.kind == ContainerKind::Group));
        assert_eq!(resolve("<em>"), vec![Token::HtmlTag("em".to_string())]);
        assert_eq!(resolve("<blink>"), vec![literal("<blink>")]);
        assert_eq!(resolve("a < b"), vec![literal("a < b")]);
    }

    #[test]
    fn attribute_values_may_hold_angle_brackets() {
        assert_eq!(
            resolve("<span title=\"a>b\">"),
            vec![Token::HtmlTag("span title=\"a>b\"".to_string())]
        );
    }

    #[test]
    fn url_and_email_detection() {
        assert!(looks_like_url("https://e.test"));
        assert!(looks_like_url("www.e.test"));
        assert!(!looks_like_url("mailto:x"));
        assert!(looks_like_email("first.last+tag@example.org"));
        assert!(!looks_like_email("x@localhost"));
        assert!(!looks_like_email("x@e.toolong"));
        assert!(!looks_like_email("a b@e.com"));
        assert!(looks_like_email("x@mail%relay.example.com"));
    }

    #[test]
    fn email_encoding_alternates_forms() {
        assert_eq!(encode_email("ab"), "&#97;&#x62;");
    }

    #[test]
    fn strong_emphasis_pairs() {
        let tokens = resolve("**a**");
        assert!(matches!(&tokens[0], Token::Marker(m) if m.len == 2 && m.pair.is_some()));
        assert!(matches!(&tokens[2], Token::Marker(m) if m.len == 2 && !m.open));
    }

    #[test]
    fn intraword_underscores_are_text() {
        assert_eq!(resolve("snake_case_name"), vec![literal("snake_case_name")]);
    }
}
