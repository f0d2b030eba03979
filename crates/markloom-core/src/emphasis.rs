//! Emphasis delimiter classification and pairing.

use crate::token::Marker;

/// One item of a resolved line before it becomes tokens.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Piece<T> {
    Text(String),
    Marker(Marker),
    Item(T),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CharClass {
    Space,
    Punct,
    Other,
}

impl CharClass {
    pub(crate) fn of(ch: char) -> CharClass {
        if ch.is_whitespace() {
            CharClass::Space
        } else if ch.is_ascii_punctuation() {
            CharClass::Punct
        } else {
            CharClass::Other
        }
    }
}

/// Decides whether a delimiter run opens (`Some(true)`), closes
/// (`Some(false)`) or is literal text. The start of the line counts as
/// `Other` before the run and the end as `Space` after it.
pub(crate) fn delimiter_role(
    ch: char,
    len: usize,
    prev: CharClass,
    next: CharClass,
    between_alphanumerics: bool,
) -> Option<bool> {
    if len == 0 || len > 3 {
        return None;
    }
    let (opens, closes) = match ch {
        '*' => (
            next != CharClass::Space && (prev != CharClass::Other || next != CharClass::Punct),
            prev != CharClass::Space && (next != CharClass::Other || prev == CharClass::Other),
        ),
        '_' => {
            if between_alphanumerics {
                return None;
            }
            (
                next == CharClass::Other,
                prev == CharClass::Other || (prev == CharClass::Punct && next == CharClass::Space),
            )
        }
        _ => return None,
    };
    if opens {
        Some(true)
    } else if closes {
        Some(false)
    } else {
        None
    }
}

fn marker_at<T>(pieces: &[Piece<T>], idx: usize) -> Option<&Marker> {
    match pieces.get(idx) {
        Some(Piece::Marker(marker)) => Some(marker),
        _ => None,
    }
}

fn marker_at_mut<T>(pieces: &mut [Piece<T>], idx: usize) -> Option<&mut Marker> {
    match pieces.get_mut(idx) {
        Some(Piece::Marker(marker)) => Some(marker),
        _ => None,
    }
}

// Replaces a 3-run with a (3 - k)-run followed by a k-run.
fn split_run<T>(pieces: &mut Vec<Piece<T>>, idx: usize, k: usize) {
    let Some(marker) = marker_at_mut(pieces, idx) else {
        return;
    };
    marker.disabled = true;
    let (ch, open) = (marker.ch, marker.open);
    pieces.insert(idx + 1, Piece::Marker(Marker::new(ch, k, open)));
    pieces.insert(idx + 1, Piece::Marker(Marker::new(ch, 3 - k, open)));
}

/// Pairs open and close markers, then unpairs any pair that would cross
/// another.
pub(crate) fn match_markers<T>(pieces: &mut Vec<Piece<T>>) {
    let mut next_id = 0usize;
    let mut open_idx = 0usize;
    while open_idx < pieces.len() {
        let Some(open) = marker_at(pieces, open_idx).filter(|m| m.is_unmatched_open()) else {
            open_idx += 1;
            continue;
        };
        let (ch, open_len) = (open.ch, open.len);
        let mut close_idx = open_idx + 1;
        while close_idx < pieces.len() {
            let Some(close) = marker_at(pieces, close_idx)
                .filter(|m| m.is_unmatched_close() && m.ch == ch)
            else {
                close_idx += 1;
                continue;
            };
            let close_len = close.len;
            if close_len == 3 && open_len != 3 {
                split_run(pieces, close_idx, open_len);
                close_idx += 1;
                continue;
            }
            if close_len == open_len {
                if let Some(marker) = marker_at_mut(pieces, open_idx) {
                    marker.pair = Some(next_id);
                }
                if let Some(marker) = marker_at_mut(pieces, close_idx) {
                    marker.pair = Some(next_id);
                }
                next_id += 1;
                break;
            }
            if open_len == 3 {
                split_run(pieces, open_idx, close_len);
                break;
            }
            close_idx += 1;
        }
        open_idx += 1;
    }
    unmatch_crossing_pairs(pieces);
}

fn unmatch_crossing_pairs<T>(pieces: &mut [Piece<T>]) {
    let mut stack: Vec<usize> = Vec::new();
    for idx in 0..pieces.len() {
        let Some(marker) = marker_at(pieces, idx).filter(|m| !m.disabled) else {
            continue;
        };
        let Some(id) = marker.pair else {
            continue;
        };
        if marker.open {
            stack.push(idx);
            continue;
        }
        let top = stack.last().and_then(|&top| marker_at(pieces, top)).and_then(|m| m.pair);
        if top != Some(id) {
            for piece in pieces[..=idx].iter_mut() {
                if let Piece::Marker(marker) = piece {
                    if marker.pair == Some(id) {
                        marker.pair = None;
                    }
                }
            }
            continue;
        }
        stack.pop();
        while let Some(&top) = stack.last() {
            if marker_at(pieces, top).is_some_and(|m| m.pair.is_some()) {
                break;
            }
            stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CharClass, Piece, delimiter_role, match_markers};
    use crate::token::Marker;

    fn marker(ch: char, len: usize, open: bool) -> Piece<()> {
        Piece::Marker(Marker::new(ch, len, open))
    }

    fn text(value: &str) -> Piece<()> {
        Piece::Text(value.to_string())
    }

    fn pairs(pieces: &[Piece<()>]) -> Vec<(usize, bool, Option<usize>, bool)> {
        pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Marker(m) => Some((m.len, m.open, m.pair, m.disabled)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn star_runs_open_before_words_and_close_after() {
        use CharClass::{Other, Punct, Space};
        assert_eq!(delimiter_role('*', 1, Other, Other, false), Some(true));
        assert_eq!(delimiter_role('*', 1, Space, Other, false), Some(true));
        assert_eq!(delimiter_role('*', 1, Other, Space, false), Some(false));
        assert_eq!(delimiter_role('*', 2, Punct, Punct, false), Some(true));
        assert_eq!(delimiter_role('*', 1, Space, Space, false), None);
        assert_eq!(delimiter_role('*', 4, Space, Other, false), None);
    }

    #[test]
    fn underscores_inside_words_are_literal() {
        use CharClass::{Other, Punct, Space};
        assert_eq!(delimiter_role('_', 1, Other, Other, true), None);
        assert_eq!(delimiter_role('_', 1, Space, Other, false), Some(true));
        assert_eq!(delimiter_role('_', 1, Other, Space, false), Some(false));
        assert_eq!(delimiter_role('_', 1, Punct, Space, false), Some(false));
        assert_eq!(delimiter_role('_', 1, Space, Punct, false), None);
    }

    #[test]
    fn equal_runs_pair_up() {
        let mut pieces = vec![marker('*', 2, true), text("a"), marker('*', 2, false)];
        match_markers(&mut pieces);
        assert_eq!(
            pairs(&pieces),
            vec![(2, true, Some(0), false), (2, false, Some(0), false)]
        );
    }

    #[test]
    fn triple_open_splits_to_fit_inner_close() {
        // ***a* b**
        let mut pieces = vec![
            marker('*', 3, true),
            text("a"),
            marker('*', 1, false),
            text(" b"),
            marker('*', 2, false),
        ];
        match_markers(&mut pieces);
        assert_eq!(
            pairs(&pieces),
            vec![
                (3, true, None, true),
                (2, true, Some(0), false),
                (1, true, Some(1), false),
                (1, false, Some(1), false),
                (2, false, Some(0), false),
            ]
        );
    }

    #[test]
    fn triple_close_splits_for_shorter_open() {
        // **a *b***
        let mut pieces = vec![
            marker('*', 2, true),
            text("a "),
            marker('*', 1, true),
            text("b"),
            marker('*', 3, false),
        ];
        match_markers(&mut pieces);
        assert_eq!(
            pairs(&pieces),
            vec![
                (2, true, Some(0), false),
                (1, true, Some(1), false),
                (3, false, None, true),
                (1, false, Some(1), false),
                (2, false, Some(0), false),
            ]
        );
    }

    #[test]
    fn crossing_pairs_are_unmatched() {
        // *a **b* c**
        let mut pieces = vec![
            marker('*', 1, true),
            text("a "),
            marker('*', 2, true),
            text("b"),
            marker('*', 1, false),
            text(" c"),
            marker('*', 2, false),
        ];
        match_markers(&mut pieces);
        assert_eq!(
            pairs(&pieces),
            vec![
                (1, true, None, false),
                (2, true, Some(1), false),
                (1, false, None, false),
                (2, false, Some(1), false),
            ]
        );
    }

    #[test]
    fn different_characters_never_pair() {
        let mut pieces = vec![marker('*', 1, true), text("a"), marker('_', 1, false)];
        match_markers(&mut pieces);
        assert!(pairs(&pieces).iter().all(|(_, _, pair, _)| pair.is_none()));
    }
}
