use std::mem;

use crate::html::{
    TagClass, classify_tag, completes_tag, is_block_only_tag, is_lone_tag,
    is_unterminated_tag_open, parse_tag_at, split_html_line,
};
use crate::label::parse_link_title;
use crate::link_table::LinkTable;
use crate::reader::{is_blank_line, leading_spaces, strip_spaces_up_to};
use crate::token::{Container, ContainerKind, FencedCode, Text, Token};

/// Runs every block pass over the document's lines and returns the children
/// of the root container. Reference definitions are moved into `links`.
pub(crate) fn parse_document(lines: Vec<Token>, links: &mut LinkTable) -> Vec<Token> {
    log::debug!("block passes over {} lines", lines.len());
    let tokens = extract_fenced_code(lines);
    let tokens = merge_multiline_tags(tokens);
    let tokens = extract_html_and_references(tokens, links);
    let tokens = parse_block_items(tokens, false);
    group_paragraphs(tokens, false)
}

// Markup lines and blank lines; everything else has already been claimed by
// an earlier pass.
fn line_text(token: &Token) -> Option<&str> {
    match token {
        Token::Text(text) if text.markup => Some(&text.text),
        Token::BlankLine(text) => Some(text),
        _ => None,
    }
}

fn line_token(content: &str) -> Token {
    if is_blank_line(content) {
        Token::BlankLine(content.to_string())
    } else {
        Token::Text(Text::line(content))
    }
}

/// Top-level fences. Lines that a list item would absorb are left for the
/// item's own block pass.
fn extract_fenced_code(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut item: Option<OpenItem<'_>> = None;
    let mut idx = 0usize;
    while idx < tokens.len() {
        let token = &tokens[idx];
        if item.as_mut().is_some_and(|open| open.absorbs(token)) {
            out.push(token.clone());
            idx += 1;
            continue;
        }
        item = None;
        if let Some((fence, next)) = parse_fenced_code(&tokens, idx) {
            out.push(fence);
            idx = next;
            continue;
        }
        item = token.markup_line().and_then(parse_list_marker).map(|marker| OpenItem {
            first: marker,
            current: marker,
            pending_blank: false,
        });
        out.push(token.clone());
        idx += 1;
    }
    out
}

// Follows the extent of a list the way `parse_list` will see it.
struct OpenItem<'a> {
    first: ListMarker<'a>,
    current: ListMarker<'a>,
    pending_blank: bool,
}

impl<'a> OpenItem<'a> {
    fn absorbs(&mut self, token: &'a Token) -> bool {
        if token.is_blank_line() {
            if self.pending_blank {
                return false;
            }
            self.pending_blank = true;
            return true;
        }
        let Some(line) = token.markup_line() else {
            return false;
        };
        self.pending_blank = false;
        if item_continuation(line, &self.current).is_some() {
            return true;
        }
        match scan_list_marker(line) {
            Some(marker) if marker.same_list(&self.first) => {
                self.current = marker;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FenceOpen<'a> {
    indent: usize,
    ch: u8,
    len: usize,
    info: &'a str,
}

fn parse_fence_open(line: &str) -> Option<FenceOpen<'_>> {
    let indent = leading_spaces(line);
    if indent > 3 {
        return None;
    }
    let bytes = line.as_bytes();
    let ch = *bytes.get(indent)?;
    if ch != b'`' && ch != b'~' {
        return None;
    }
    let len = bytes[indent..].iter().take_while(|&&b| b == ch).count();
    if len < 3 {
        return None;
    }
    let info = line[indent + len..].trim();
    if info.contains('`') {
        return None;
    }
    Some(FenceOpen {
        indent,
        ch,
        len,
        info,
    })
}

fn is_fence_close(line: &str, fence: &FenceOpen<'_>) -> bool {
    let indent = leading_spaces(line);
    if indent > fence.indent + 3 {
        return false;
    }
    let rest = &line.as_bytes()[indent..];
    let len = rest.iter().take_while(|&&b| b == fence.ch).count();
    len >= fence.len && rest[len..].iter().all(|b| b.is_ascii_whitespace())
}

fn parse_fenced_code(tokens: &[Token], idx: usize) -> Option<(Token, usize)> {
    let fence = parse_fence_open(tokens[idx].markup_line()?)?;
    let mut code = String::new();
    let mut next = idx + 1;
    while let Some(text) = tokens.get(next).and_then(line_text) {
        next += 1;
        if is_fence_close(text, &fence) {
            break;
        }
        code.push_str(strip_spaces_up_to(text, fence.indent));
        code.push('\n');
    }
    log::trace!("fenced code at {} ({} lines)", idx, next - idx);
    let token = Token::FencedCode(FencedCode {
        code,
        info: fence.info.to_string(),
    });
    Some((token, next))
}

fn merge_multiline_tags(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        let merged = match (token.markup_line(), iter.peek().and_then(Token::markup_line)) {
            (Some(first), Some(second))
                if is_unterminated_tag_open(first) && completes_tag(second) =>
            {
                Some(format!("{} {}", first, second))
            }
            _ => None,
        };
        match merged {
            Some(line) => {
                iter.next();
                out.push(Token::Text(Text::line(line)));
            }
            None => out.push(token),
        }
    }
    out
}

fn extract_html_and_references(tokens: Vec<Token>, links: &mut LinkTable) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut idx = 0usize;
    while idx < tokens.len() {
        if tokens[idx].markup_line().is_some() {
            let at_block_start = out.last().is_none_or(Token::is_blank_line);
            if at_block_start {
                if let Some((block, next)) = parse_html_block(&tokens, idx) {
                    out.push(block);
                    idx = next;
                    continue;
                }
            }
            if let Some(next) = parse_reference(&tokens, idx, links) {
                idx = next;
                continue;
            }
        }
        out.push(tokens[idx].clone());
        idx += 1;
    }
    out
}

enum HtmlBlockStart<'a> {
    Tag(&'a str),
    Comment,
}

fn parse_html_block(tokens: &[Token], idx: usize) -> Option<(Token, usize)> {
    let first = tokens[idx].markup_line()?;
    let start = match parse_tag_at(first, 0) {
        Some(tag) if classify_tag(tag.name) == Some(TagClass::Block) => HtmlBlockStart::Tag(tag.name),
        _ if first.starts_with("<!--") => HtmlBlockStart::Comment,
        _ => return None,
    };

    let mut children = Vec::new();
    let mut next = idx;
    loop {
        let token = &tokens[next];
        let text = line_text(token);
        match (text, &start) {
            (Some(text), HtmlBlockStart::Tag(_)) => children.extend(split_html_line(text)),
            (Some(text), HtmlBlockStart::Comment) => {
                children.push(Token::InlineHtmlComment(format!("{}\n", text)))
            }
            (None, _) => children.push(token.clone()),
        }
        next += 1;
        if next >= tokens.len() {
            break;
        }
        if !tokens[next].is_blank_line() {
            continue;
        }
        let Some(prev) = text else {
            continue;
        };
        let finished = next - 1 == idx
            || match start {
                HtmlBlockStart::Tag(_) => is_lone_tag(prev),
                HtmlBlockStart::Comment => ends_comment(prev),
            };
        if finished {
            break;
        }
    }

    if let HtmlBlockStart::Tag(name) = start {
        if next - idx == 1 && !is_block_only_tag(name) {
            return None;
        }
    }
    log::trace!("html block at {} ({} lines)", idx, next - idx);
    Some((Token::container(ContainerKind::HtmlBlock, children), next))
}

fn ends_comment(line: &str) -> bool {
    line.trim_end_matches(' ')
        .strip_suffix('>')
        .is_some_and(|rest| rest.trim_end_matches(' ').ends_with("--"))
}

#[derive(Debug, PartialEq)]
struct ReferenceLine<'a> {
    id: &'a str,
    url: &'a str,
    title: Option<&'a str>,
}

fn parse_reference(tokens: &[Token], idx: usize, links: &mut LinkTable) -> Option<usize> {
    let reference = parse_reference_line(tokens[idx].markup_line()?)?;
    let mut next = idx + 1;
    let title = match reference.title {
        Some(title) => title,
        None => match tokens
            .get(next)
            .and_then(Token::markup_line)
            .and_then(parse_title_line)
        {
            Some(title) => {
                next += 1;
                title
            }
            None => "",
        },
    };
    log::trace!("reference [{}] -> {}", reference.id, reference.url);
    links.add(reference.id, reference.url, title);
    Some(next)
}

fn parse_reference_line(line: &str) -> Option<ReferenceLine<'_>> {
    let rest = strip_spaces_up_to(line, 3).strip_prefix('[')?;
    let candidates: Vec<usize> = rest.match_indices("]:").map(|(pos, _)| pos).collect();
    for &pos in candidates.iter().rev() {
        if pos == 0 {
            continue;
        }
        let after = &rest[pos + 2..];
        if !after.starts_with(' ') {
            continue;
        }
        if let Some((url, title)) = parse_reference_target(after.trim_start_matches(' ')) {
            return Some(ReferenceLine {
                id: &rest[..pos],
                url,
                title,
            });
        }
    }
    None
}

// `<?url>?` optionally followed by a title covering the rest of the line.
fn parse_reference_target(text: &str) -> Option<(&str, Option<&str>)> {
    let body = text.strip_prefix('<').unwrap_or(text);
    let url_len = body.find([' ', '>']).unwrap_or(body.len());
    if url_len == 0 {
        return None;
    }
    let url = &body[..url_len];
    let rest = &body[url_len..];
    let rest = rest.strip_prefix('>').unwrap_or(rest).trim_matches(' ');
    if rest.is_empty() {
        return Some((url, None));
    }
    parse_link_title(rest).map(|title| (url, Some(title)))
}

fn parse_title_line(line: &str) -> Option<&str> {
    parse_link_title(line.trim_matches(' '))
}

/// Recognizes block constructs line by line. `in_item` is set while parsing
/// the contents of a list item.
fn parse_block_items(tokens: Vec<Token>, in_item: bool) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut quote: Vec<Token> = Vec::new();
    let mut prev_quote = false;
    let mut prev_paragraph = false;
    let mut idx = 0usize;

    while idx < tokens.len() {
        if line_text(&tokens[idx]).is_none() {
            flush_quote(&mut quote, &mut out);
            out.push(match &tokens[idx] {
                Token::Container(container) => Token::Container(parse_container(container.clone())),
                other => other.clone(),
            });
            prev_quote = false;
            prev_paragraph = false;
            idx += 1;
            continue;
        }

        if let Some((lines, next)) = parse_block_quote(&tokens, idx) {
            log::trace!("block quote lines {}..{}", idx, next);
            quote.extend(lines);
            prev_quote = true;
            prev_paragraph = false;
            idx = next;
            continue;
        }

        let after_paragraph = prev_paragraph && !in_item;
        let construct = parse_fenced_code(&tokens, idx)
            .or_else(|| parse_horizontal_rule(&tokens, idx))
            .or_else(|| parse_list(&tokens, idx, after_paragraph))
            .or_else(|| parse_header(&tokens, idx))
            .or_else(|| {
                if prev_paragraph {
                    None
                } else {
                    parse_code_block(&tokens, idx)
                }
            });

        if let Some((token, next)) = construct {
            flush_quote(&mut quote, &mut out);
            out.push(token);
            prev_quote = false;
            prev_paragraph = false;
            idx = next;
            continue;
        }

        let token = &tokens[idx];
        if prev_quote {
            if token.is_blank_line() {
                flush_quote(&mut quote, &mut out);
                out.push(token.clone());
                prev_quote = false;
            } else {
                quote.push(token.clone());
                prev_quote = true;
            }
            prev_paragraph = false;
        } else {
            out.push(token.clone());
            prev_paragraph = !token.is_blank_line();
        }
        idx += 1;
    }

    flush_quote(&mut quote, &mut out);
    out
}

fn parse_container(container: Container) -> Container {
    match container.kind {
        ContainerKind::Root | ContainerKind::BlockQuote => Container::new(
            container.kind,
            parse_block_items(container.children, false),
        ),
        ContainerKind::UnorderedList | ContainerKind::OrderedList { .. } => Container::new(
            container.kind,
            container
                .children
                .into_iter()
                .map(|child| match child {
                    Token::Container(item) => Token::Container(parse_container(item)),
                    other => other,
                })
                .collect(),
        ),
        ContainerKind::ListItem { .. } => {
            Container::new(container.kind, parse_block_items(container.children, true))
        }
        _ => container,
    }
}

fn flush_quote(quote: &mut Vec<Token>, out: &mut Vec<Token>) {
    if quote.is_empty() {
        return;
    }
    let lines = mem::take(quote);
    out.push(Token::container(
        ContainerKind::BlockQuote,
        parse_block_items(lines, false),
    ));
}

fn parse_block_quote(tokens: &[Token], idx: usize) -> Option<(Vec<Token>, usize)> {
    let (level, content) = split_quote_prefix(tokens[idx].markup_line()?, None)?;
    let mut lines = vec![line_token(content)];
    let mut next = idx + 1;
    while let Some(line) = tokens.get(next).and_then(Token::markup_line) {
        let Some((_, content)) = split_quote_prefix(line, Some(level)) else {
            break;
        };
        lines.push(line_token(content));
        next += 1;
    }
    Some((lines, next))
}

// Strips `( {0,3}>)` prefixes, all of them or exactly `level`, then one
// optional space.
fn split_quote_prefix(line: &str, level: Option<usize>) -> Option<(usize, &str)> {
    let mut rest = line;
    let mut count = 0usize;
    while level.is_none_or(|level| count < level) {
        match strip_spaces_up_to(rest, 3).strip_prefix('>') {
            Some(after) => {
                rest = after;
                count += 1;
            }
            None => break,
        }
    }
    if count == 0 || level.is_some_and(|level| count != level) {
        return None;
    }
    Some((count, rest.strip_prefix(' ').unwrap_or(rest)))
}

fn parse_horizontal_rule(tokens: &[Token], idx: usize) -> Option<(Token, usize)> {
    let line = strip_spaces_up_to(tokens[idx].markup_line()?, 3);
    let ch = line.chars().next()?;
    if !matches!(ch, '*' | '-' | '_') {
        return None;
    }
    let mut count = 0usize;
    for c in line.chars() {
        if c == ch {
            count += 1;
        } else if c != ' ' {
            return None;
        }
    }
    (count >= 3).then(|| (Token::HtmlTag("hr /".to_string()), idx + 1))
}

fn parse_header(tokens: &[Token], idx: usize) -> Option<(Token, usize)> {
    let line = tokens[idx].markup_line()?;
    if let Some((level, title)) = parse_atx_heading(line) {
        let header = Token::container(
            ContainerKind::Header(level),
            vec![Token::Text(Text::line(title))],
        );
        return Some((header, idx + 1));
    }
    let underline = tokens.get(idx + 1).and_then(Token::markup_line)?;
    let level = setext_underline_level(underline)?;
    let header = Token::container(
        ContainerKind::Header(level),
        vec![Token::Text(Text::line(line.trim_matches(' ')))],
    );
    Some((header, idx + 2))
}

fn parse_atx_heading(line: &str) -> Option<(u8, &str)> {
    let rest = strip_spaces_up_to(line, 3);
    let level = rest.bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let after = &rest[level..];
    if !after.starts_with(' ') {
        return None;
    }
    let title = after.trim_matches(' ');
    let without_hashes = title.trim_end_matches('#');
    if without_hashes.len() < title.len() && without_hashes.ends_with(' ') {
        return Some((level as u8, without_hashes.trim_end_matches(' ')));
    }
    Some((level as u8, title))
}

fn setext_underline_level(line: &str) -> Option<u8> {
    let rest = strip_spaces_up_to(line, 3).trim_end_matches(' ');
    let level = match rest.as_bytes().first()? {
        b'=' => 1,
        b'-' => 2,
        _ => return None,
    };
    let ch = rest.as_bytes()[0];
    rest.bytes().all(|b| b == ch).then_some(level)
}

fn code_line(line: &str) -> Option<&str> {
    (leading_spaces(line) >= 4).then(|| &line[4..])
}

fn parse_code_block(tokens: &[Token], idx: usize) -> Option<(Token, usize)> {
    let first = code_line(tokens[idx].markup_line()?)?;
    let mut code = format!("{}\n", first);
    let mut next = idx + 1;
    loop {
        if let Some(content) = tokens.get(next).and_then(Token::markup_line).and_then(code_line) {
            code.push_str(content);
            code.push('\n');
            next += 1;
            continue;
        }
        let blanks = tokens[next.min(tokens.len())..]
            .iter()
            .take_while(|token| token.is_blank_line())
            .count();
        if blanks == 0 {
            break;
        }
        let resumes = tokens
            .get(next + blanks)
            .and_then(Token::markup_line)
            .and_then(code_line)
            .is_some();
        if !resumes {
            break;
        }
        for _ in 0..blanks {
            code.push('\n');
        }
        next += blanks;
    }
    Some((Token::CodeBlock(code), next))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ListMarkerKind {
    Bullet(u8),
    Ordered { delimiter: u8, number: u64 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ListMarker<'a> {
    indent: usize,
    kind: ListMarkerKind,
    content_column: usize,
    content: &'a str,
}

impl ListMarker<'_> {
    fn same_list(&self, other: &ListMarker<'_>) -> bool {
        match (self.kind, other.kind) {
            (ListMarkerKind::Bullet(a), ListMarkerKind::Bullet(b)) => a == b,
            (
                ListMarkerKind::Ordered { delimiter: a, .. },
                ListMarkerKind::Ordered { delimiter: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Marker that opens a list. A bullet must be followed by content that
/// does not itself start with `*` or `-`.
fn parse_list_marker(line: &str) -> Option<ListMarker<'_>> {
    let marker = scan_list_marker(line)?;
    if let ListMarkerKind::Bullet(_) = marker.kind {
        if marker.content.is_empty() || marker.content.starts_with(['*', '-']) {
            return None;
        }
    }
    Some(marker)
}

// Marker of any item, content unrestricted.
fn scan_list_marker(line: &str) -> Option<ListMarker<'_>> {
    let indent = leading_spaces(line);
    if indent > 3 {
        return None;
    }
    let bytes = line.as_bytes();
    let first = *bytes.get(indent)?;
    let (kind, marker_end) = match first {
        b'*' | b'+' | b'-' => (ListMarkerKind::Bullet(first), indent + 1),
        b'0'..=b'9' => {
            let digits = bytes[indent..].iter().take_while(|b| b.is_ascii_digit()).count();
            let delimiter = *bytes.get(indent + digits)?;
            if delimiter != b'.' && delimiter != b')' {
                return None;
            }
            let number = line[indent..indent + digits].parse().unwrap_or(1);
            (
                ListMarkerKind::Ordered { delimiter, number },
                indent + digits + 1,
            )
        }
        _ => return None,
    };
    let spaces = leading_spaces(&line[marker_end..]);
    if spaces == 0 {
        return None;
    }
    let content_column = marker_end + spaces;
    let content = &line[content_column..];
    Some(ListMarker {
        indent,
        kind,
        content_column,
        content,
    })
}

// Content of a continuation line of the current item, if it is one.
fn item_continuation<'a>(line: &'a str, item: &ListMarker<'_>) -> Option<&'a str> {
    let spaces = leading_spaces(line);
    if spaces >= item.content_column {
        return Some(&line[item.content_column..]);
    }
    if spaces > item.indent && scan_list_marker(&line[spaces..]).is_some() {
        return Some(&line[spaces..]);
    }
    None
}

fn parse_list(tokens: &[Token], idx: usize, after_paragraph: bool) -> Option<(Token, usize)> {
    let first = parse_list_marker(tokens[idx].markup_line()?)?;
    let mut item = first;
    let mut items: Vec<Vec<Token>> = Vec::new();
    let mut current = vec![Token::Text(Text::line(first.content))];
    let mut loose = false;
    let mut pending_blank = false;
    let mut next = idx + 1;

    while next < tokens.len() {
        let token = &tokens[next];
        if token.is_blank_line() {
            if pending_blank || tokens.get(next + 1).is_none_or(Token::is_blank_line) {
                break;
            }
            pending_blank = true;
            next += 1;
            continue;
        }
        let Some(line) = token.markup_line() else {
            break;
        };
        if let Some(content) = item_continuation(line, &item) {
            if pending_blank {
                current.push(Token::BlankLine(String::new()));
                loose = true;
                pending_blank = false;
            }
            current.push(Token::Text(Text::line(content)));
            next += 1;
            continue;
        }
        match scan_list_marker(line) {
            Some(marker) if marker.same_list(&first) => {
                items.push(mem::take(&mut current));
                current.push(line_token(marker.content));
                item = marker;
                loose |= pending_blank;
                pending_blank = false;
                next += 1;
            }
            _ => break,
        }
    }
    if pending_blank {
        next -= 1;
    }

    if items.is_empty() && current.len() == 1 && first.indent == 0 && after_paragraph {
        return None;
    }
    items.push(current);
    log::trace!("list at {} with {} items (loose: {})", idx, items.len(), loose);

    let kind = match first.kind {
        ListMarkerKind::Bullet(_) => ContainerKind::UnorderedList,
        ListMarkerKind::Ordered { number, .. } => ContainerKind::OrderedList { start: number },
    };
    let children = items
        .into_iter()
        .map(|lines| {
            Token::container(
                ContainerKind::ListItem { paragraphs: loose },
                parse_block_items(lines, true),
            )
        })
        .collect();
    Some((Token::container(kind, children), next))
}

/// Wraps runs of markup lines into paragraphs, bottom-up.
fn group_paragraphs(tokens: Vec<Token>, inhibit: bool) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut pending: Vec<Token> = Vec::new();
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        match token {
            Token::Text(text) if text.markup => {
                let (line, hard_break) = trim_paragraph_line(&text.text);
                pending.push(Token::Text(Text::line(line)));
                if hard_break && iter.peek().is_some_and(Token::can_contain_markup) {
                    pending.push(Token::LineBreak);
                }
            }
            Token::Container(container) => {
                flush_paragraph(&mut pending, &mut out, inhibit);
                let inhibit_children = Token::Container(Container::new(container.kind, Vec::new()))
                    .inhibits_paragraphs();
                out.push(Token::container(
                    container.kind,
                    group_paragraphs(container.children, inhibit_children),
                ));
            }
            other => {
                flush_paragraph(&mut pending, &mut out, inhibit);
                out.push(other);
            }
        }
    }
    flush_paragraph(&mut pending, &mut out, inhibit);
    out
}

fn flush_paragraph(pending: &mut Vec<Token>, out: &mut Vec<Token>, inhibit: bool) {
    if pending.is_empty() {
        return;
    }
    let mut lines = mem::take(pending);
    if !inhibit {
        out.push(Token::container(ContainerKind::Paragraph, lines));
    } else if lines.len() == 1 {
        out.extend(lines.pop());
    } else {
        out.push(Token::container(ContainerKind::Plain, lines));
    }
}

// Leading spaces go; two or more trailing spaces become a hard break.
fn trim_paragraph_line(line: &str) -> (&str, bool) {
    let line = line.trim_start_matches(' ');
    let trimmed = line.trim_end_matches(' ');
    let hard_break = line.len() - trimmed.len() >= 2;
    (if hard_break { trimmed } else { line }, hard_break)
}
