use std::collections::HashSet;
use std::ops::Range;

use regex::Regex;

use crate::text::{is_arabic_block, is_word_char, strip_diacritics};

/// Zero or more harakat, Quranic marks or tatweel after an Arabic letter.
const DIACRITIC_CLASS: &str = r"[\x{0640}\x{064B}-\x{065F}\x{0670}\x{06D6}-\x{06ED}]*";

/// One accepted occurrence of a dictionary key, in byte offsets of the
/// scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub key: String,
}

impl Match {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug)]
struct Term {
    key: String,
    regex: Regex,
}

/// Compiled vocabulary, longest key first.
#[derive(Debug, Default)]
pub struct Matcher {
    terms: Vec<Term>,
}

impl Matcher {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut keys: Vec<String> = keys
            .into_iter()
            .map(|key| key.as_ref().to_string())
            .filter(|key| !key.trim().is_empty())
            .filter(|key| seen.insert(key.clone()))
            .collect();
        keys.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });

        let terms = keys
            .into_iter()
            .filter_map(|key| {
                let pattern = build_term_pattern(&key)?;
                match Regex::new(&pattern) {
                    Ok(regex) => Some(Term { key, regex }),
                    Err(err) => {
                        tracing::warn!(%key, ?err, "skipping unmatchable link key");
                        None
                    }
                }
            })
            .collect();
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn find(&self, text: &str) -> Vec<Match> {
        self.find_excluding(text, &[])
    }

    /// Like [`Matcher::find`], but never reports an occurrence that overlaps
    /// one of the `occupied` ranges.
    pub fn find_excluding(&self, text: &str, occupied: &[Range<usize>]) -> Vec<Match> {
        let mut taken: Vec<Range<usize>> = occupied.to_vec();
        let mut matches = Vec::new();

        for term in &self.terms {
            let mut pos = 0;
            while pos <= text.len() {
                let Some(found) = term.regex.find_at(text, pos) else {
                    break;
                };
                let (start, end) = (found.start(), found.end());
                if end == start {
                    break;
                }
                let accepted = is_boundary_before(text, start)
                    && is_boundary_after(text, end)
                    && !taken.iter().any(|range| range.start < end && start < range.end);
                if accepted {
                    taken.push(start..end);
                    matches.push(Match {
                        start,
                        end,
                        key: term.key.clone(),
                    });
                    pos = end;
                } else {
                    pos = start + text[start..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }

        matches.sort_by_key(|found| found.start);
        matches
    }
}

/// Pure matching primitive: every non-overlapping occurrence of a key in
/// `text`, longest keys claiming their spans first.
pub fn find_matches<I, S>(text: &str, keys: I) -> Vec<Match>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Matcher::new(keys).find(text)
}

/// Literal pattern for `key` in which every Arabic character may be followed
/// by any number of diacritics. Marks inside the key itself are dropped so
/// they never become mandatory.
fn build_term_pattern(key: &str) -> Option<String> {
    let bare = strip_diacritics(key);
    if bare.is_empty() {
        return None;
    }
    let mut pattern = String::with_capacity(bare.len() * 4);
    let mut buf = [0u8; 4];
    for ch in bare.chars() {
        pattern.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
        if is_arabic_block(ch) {
            pattern.push_str(DIACRITIC_CLASS);
        }
    }
    Some(pattern)
}

fn is_boundary_before(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .map_or(true, |ch| !is_word_char(ch))
}

fn is_boundary_after(text: &str, end: usize) -> bool {
    text[end..].chars().next().map_or(true, |ch| !is_word_char(ch))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched<'a>(text: &'a str, matches: &[Match]) -> Vec<&'a str> {
        matches.iter().map(|m| &text[m.range()]).collect()
    }

    #[test]
    fn prefers_longer_keys_first() {
        let text = "قال محمد بن عبد الله ثم قال محمد";
        let matches = find_matches(text, ["محمد", "محمد بن عبد الله"]);
        assert_eq!(matched(text, &matches), vec!["محمد بن عبد الله", "محمد"]);
        assert_eq!(matches[0].key, "محمد بن عبد الله");
        assert_eq!(matches[1].key, "محمد");
    }

    #[test]
    fn tolerates_diacritics_in_text() {
        let text = "وقعت غزوة بَدْر الكبرى";
        let matches = find_matches(text, ["بدر"]);
        assert_eq!(matched(text, &matches), vec!["بَدْر"]);
        assert_eq!(matches[0].key, "بدر");
    }

    #[test]
    fn tolerates_tatweel_in_text_and_key() {
        let text = "عند بـدر وبـَدْر";
        let matches = find_matches(text, ["بدر"]);
        assert_eq!(matched(text, &matches), vec!["بـدر"]);
        let text = "عند بدر";
        assert_eq!(matched(text, &find_matches(text, ["بـدر"])), vec!["بدر"]);
    }

    #[test]
    fn diacritics_in_key_are_optional() {
        let text = "عند بدر";
        let matches = find_matches(text, ["بَدر"]);
        assert_eq!(matched(text, &matches), vec!["بدر"]);
    }

    #[test]
    fn respects_arabic_word_boundaries() {
        let text = "البدرية وبدر";
        assert!(find_matches(text, ["بدر"]).is_empty());
        let text = "ماء بدر، ثم";
        assert_eq!(matched(text, &find_matches(text, ["بدر"])), vec!["بدر"]);
    }

    #[test]
    fn ascii_word_characters_block_matches() {
        let text = "Badr x_بدر بدر1 (بدر)";
        let matches = find_matches(text, ["بدر"]);
        assert_eq!(matches.len(), 1);
        assert_eq!(&text[matches[0].range()], "بدر");
        assert!(text[..matches[0].start].ends_with('('));
    }

    #[test]
    fn keys_are_literal_not_patterns() {
        let text = "see a.b and axb (c+) here";
        let matches = find_matches(text, ["a.b", "(c+)"]);
        assert_eq!(matched(text, &matches), vec!["a.b", "(c+)"]);
    }

    #[test]
    fn empty_keys_are_skipped() {
        let matcher = Matcher::new(["", "  ", "\u{064E}"]);
        assert!(matcher.is_empty());
    }

    #[test]
    fn occupied_ranges_are_never_reported() {
        let text = "حمزة بن عبد المطلب في أحد";
        let occupied = vec![0.."حمزة بن عبد المطلب".len()];
        let matches = Matcher::new(["عبد المطلب", "أحد"]).find_excluding(text, &occupied);
        assert_eq!(matched(text, &matches), vec!["أحد"]);
    }

    #[test]
    fn adjacent_occurrences_separated_by_space_both_match() {
        let text = "بدر بدر";
        assert_eq!(find_matches(text, ["بدر"]).len(), 2);
    }
}
