//! Syntect-backed [`Highlighter`] for fenced code blocks.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use markloom_core::{Encoding, Highlighter, encode};
use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme as SyntectTheme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use thiserror::Error;

const CACHE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Error, Debug)]
pub enum HighlightError {
    #[error("no syntax definition for language `{0}`")]
    UnknownLanguage(String),

    #[error("no usable theme in the default theme set")]
    NoTheme,

    #[error("syntect failed: {0}")]
    Syntect(#[from] syntect::Error),
}

type CacheKey = (Theme, String, String);
type Cache = Mutex<LruCache<CacheKey, String>>;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);
static HIGHLIGHT_CACHE: Lazy<Cache> = Lazy::new(|| {
    let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(capacity))
});

/// Highlights code with inline `style` spans. Languages syntect does not know
/// are written escaped and unstyled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntectHighlighter {
    theme: Theme,
}

impl SyntectHighlighter {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Highlighted HTML for `code`, or why it could not be produced.
    pub fn try_highlight(&self, code: &str, language: &str) -> Result<String, HighlightError> {
        let key = (self.theme, language.to_string(), code.to_string());
        if let Ok(mut cache) = HIGHLIGHT_CACHE.lock() {
            if let Some(cached) = cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let syntax = SYNTAX_SET
            .find_syntax_by_token(language)
            .ok_or_else(|| HighlightError::UnknownLanguage(language.to_string()))?;
        let theme = pick_theme(self.theme, &THEME_SET).ok_or(HighlightError::NoTheme)?;
        let mut lines = HighlightLines::new(syntax, theme);
        let mut out = String::with_capacity(code.len() * 2);
        for line in LinesWithEndings::from(code) {
            let ranges = lines.highlight_line(line, &SYNTAX_SET)?;
            let html = styled_line_to_highlighted_html(&ranges, IncludeBackground::No)?;
            out.push_str(&html);
        }

        if let Ok(mut cache) = HIGHLIGHT_CACHE.lock() {
            cache.put(key, out.clone());
        }
        Ok(out)
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, code: &str, language: &str, out: &mut String) {
        match self.try_highlight(code, language) {
            Ok(html) => out.push_str(&html),
            Err(err) => {
                match err {
                    HighlightError::UnknownLanguage(_) => log::debug!("{}", err),
                    _ => log::warn!("highlighting `{}` failed: {}", language, err),
                }
                out.push_str(&encode(code, Encoding::DOUBLE_AMPS | Encoding::ANGLES));
            }
        }
    }
}

fn pick_theme(theme: Theme, theme_set: &ThemeSet) -> Option<&SyntectTheme> {
    let candidates = match theme {
        Theme::Dark => ["Monokai Extended Bright", "Monokai Extended", "base16-ocean.dark"],
        Theme::Light => ["InspiredGitHub", "Solarized (light)", "base16-ocean.light"],
    };
    candidates
        .iter()
        .find_map(|name| theme_set.themes.get(*name))
        .or_else(|| theme_set.themes.values().next())
}
