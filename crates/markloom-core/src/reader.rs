use std::io::{self, Read};

/// Tab stop used for the leading whitespace of every line.
const LEADING_TAB_STOP: usize = 4;

/// One input line with tabs already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub blank: bool,
}

/// Splits raw input into [`Line`]s.
#[derive(Debug, Clone, Copy)]
pub struct LineReader {
    spaces_per_tab: usize,
}

impl LineReader {
    pub fn new(spaces_per_tab: usize) -> Self {
        Self {
            spaces_per_tab: spaces_per_tab.max(1),
        }
    }

    /// Splits on `\n`, `\r`, `\r\n` and `\n\r`. A trailing partial line is kept
    /// when it is not empty.
    pub fn split(&self, text: &str) -> Vec<Line> {
        let bytes = text.as_bytes();
        let mut lines = Vec::new();
        let mut start = 0usize;
        let mut idx = 0usize;
        while idx < bytes.len() {
            let byte = bytes[idx];
            if byte != b'\n' && byte != b'\r' {
                idx += 1;
                continue;
            }
            lines.push(self.line(&text[start..idx]));
            let pair = if byte == b'\n' { b'\r' } else { b'\n' };
            idx += 1;
            if idx < bytes.len() && bytes[idx] == pair {
                idx += 1;
            }
            start = idx;
        }
        if start < bytes.len() {
            lines.push(self.line(&text[start..]));
        }
        lines
    }

    /// Reads the whole stream and splits it. Invalid UTF-8 is replaced rather
    /// than rejected.
    pub fn read<R: Read>(&self, mut reader: R) -> io::Result<Vec<Line>> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        let text = String::from_utf8_lossy(&buffer);
        Ok(self.split(&text))
    }

    fn line(&self, raw: &str) -> Line {
        let text = expand_tabs(raw, self.spaces_per_tab);
        let blank = is_blank_line(&text);
        Line { text, blank }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(LEADING_TAB_STOP)
    }
}

fn expand_tabs(line: &str, spaces_per_tab: usize) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + 8);
    let mut column = 0usize;
    let mut leading = true;
    for ch in line.chars() {
        match ch {
            '\t' => {
                let stop = if leading {
                    LEADING_TAB_STOP
                } else {
                    spaces_per_tab
                };
                let width = stop - column % stop;
                for _ in 0..width {
                    out.push(' ');
                }
                column += width;
            }
            ' ' => {
                out.push(' ');
                column += 1;
            }
            _ => {
                leading = false;
                out.push(ch);
                column += 1;
            }
        }
    }
    out
}

/// Up to three spaces, any number of complete `<!-- ... -->` comments, then
/// only spaces.
pub(crate) fn is_blank_line(line: &str) -> bool {
    let mut rest = strip_spaces_up_to(line, 3);
    while let Some(body) = rest.strip_prefix("<!--") {
        let Some(end) = comment_end(body) else {
            return false;
        };
        rest = body[end..].trim_start_matches(' ');
    }
    rest.bytes().all(|b| b == b' ')
}

// Offset just past the first `--`, optional spaces, `>` in `body`.
fn comment_end(body: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = body[from..].find("--") {
        let after = from + pos + 2;
        let spaces = leading_spaces(&body[after..]);
        if body[after + spaces..].starts_with('>') {
            return Some(after + spaces + 1);
        }
        from = from + pos + 1;
    }
    None
}

pub(crate) fn strip_spaces_up_to(line: &str, max: usize) -> &str {
    let count = line.bytes().take(max).take_while(|&b| b == b' ').count();
    &line[count..]
}

pub(crate) fn leading_spaces(line: &str) -> usize {
    line.bytes().take_while(|&b| b == b' ').count()
}
