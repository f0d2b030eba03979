/// Case-folds a reference id so lookups ignore letter case.
pub(crate) fn normalize_link_id(id: &str) -> String {
    id.to_lowercase()
}

/// Turns link text into an implicit reference id: runs of whitespace collapse
/// to one space and the ends are trimmed.
pub(crate) fn implicit_link_id(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !last_space {
                out.push(' ');
                last_space = true;
            }
            continue;
        }
        last_space = false;
        out.push(ch);
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// `"title"`, `'title'` or `(title)` spanning all of `text`.
pub(crate) fn parse_link_title(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    let first = chars.next()?;
    let last = chars.next_back()?;
    let matched = match first {
        '"' | '\'' => last == first,
        '(' => last == ')',
        _ => false,
    };
    matched.then(|| &text[1..text.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::{implicit_link_id, normalize_link_id, parse_link_title};

    #[test]
    fn ids_fold_case() {
        assert_eq!(normalize_link_id("Foo BAR"), "foo bar");
    }

    #[test]
    fn implicit_ids_collapse_spaces() {
        assert_eq!(implicit_link_id("  Some   link text "), "Some link text");
    }

    #[test]
    fn titles_use_matching_delimiters() {
        assert_eq!(parse_link_title("\"a b\""), Some("a b"));
        assert_eq!(parse_link_title("'x'"), Some("x"));
        assert_eq!(parse_link_title("(p)"), Some("p"));
        assert_eq!(parse_link_title("\"x'"), None);
        assert_eq!(parse_link_title("\""), None);
    }
}
