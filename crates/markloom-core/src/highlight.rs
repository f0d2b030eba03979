//! Syntax highlighting hook for fenced code blocks.

use crate::emit::encode;
use crate::token::Encoding;

/// Renders the body of a fenced code block that names a language.
///
/// Whatever is appended to `out` is placed verbatim between
/// `<pre><code class="language-...">` and `</code></pre>`, so implementations
/// must escape the code themselves. The renderer calls this once per fenced
/// block, on the thread that renders.
pub trait Highlighter: Send + Sync {
    fn highlight(&self, code: &str, language: &str, out: &mut String);
}

/// Writes the code escaped and otherwise untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, code: &str, _language: &str, out: &mut String) {
        out.push_str(&encode(code, Encoding::DOUBLE_AMPS | Encoding::ANGLES));
    }
}

impl<F> Highlighter for F
where
    F: Fn(&str, &str, &mut String) + Send + Sync,
{
    fn highlight(&self, code: &str, language: &str, out: &mut String) {
        self(code, language, out)
    }
}

#[cfg(test)]
mod tests {
    use super::{Highlighter, PlainHighlighter};

    #[test]
    fn plain_highlighter_escapes_everything() {
        let mut out = String::new();
        PlainHighlighter.highlight("a && <b>\n", "rust", &mut out);
        assert_eq!(out, "a &amp;&amp; &lt;b&gt;\n");
    }

    #[test]
    fn closures_are_highlighters() {
        let upper = |code: &str, _lang: &str, out: &mut String| out.push_str(&code.to_uppercase());
        let mut out = String::new();
        upper.highlight("x", "y", &mut out);
        assert_eq!(out, "X");
    }
}
