//! Character classes shared by ordering and link matching.

pub fn is_arabic_block(ch: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&ch)
}

/// Arabic comma, semicolon, question mark, percent/decimal/thousands signs,
/// five-pointed star and full stop. These separate words.
pub fn is_arabic_punctuation(ch: char) -> bool {
    matches!(
        ch,
        '\u{060C}' | '\u{060D}' | '\u{061B}' | '\u{061E}' | '\u{061F}' | '\u{066A}'..='\u{066D}' | '\u{06D4}'
    )
}

/// Combining marks that may follow any Arabic letter without changing the
/// word it spells.
pub fn is_arabic_diacritic(ch: char) -> bool {
    matches!(ch, '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{06D6}'..='\u{06ED}')
}

/// ASCII word characters plus Arabic letters, marks and digits. Anything else
/// is a boundary.
pub fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || (is_arabic_block(ch) && !is_arabic_punctuation(ch))
}

pub fn strip_diacritics(input: &str) -> String {
    input
        .chars()
        .filter(|ch| !is_arabic_diacritic(*ch) && *ch != '\u{0640}')
        .collect()
}

/// Sort key for titles: diacritics and tatweel removed, case folded.
pub fn collation_key(title: &str) -> String {
    strip_diacritics(title.trim()).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diacritics_are_arabic_block_members() {
        for ch in ['\u{064E}', '\u{0652}', '\u{0670}', '\u{06E1}'] {
            assert!(is_arabic_diacritic(ch));
            assert!(is_word_char(ch));
        }
        assert!(!is_arabic_diacritic('ب'));
    }

    #[test]
    fn boundaries_follow_ascii_word_rule() {
        assert!(is_word_char('a'));
        assert!(is_word_char('_'));
        assert!(is_word_char('٣'));
        assert!(!is_word_char(' '));
        assert!(!is_word_char('،'));
        assert!(!is_word_char('؟'));
        assert!(!is_word_char('é'));
        assert!(!is_word_char('-'));
    }

    #[test]
    fn collation_ignores_harakat_and_tatweel() {
        assert_eq!(collation_key("بَدْر"), collation_key("بدر"));
        assert_eq!(collation_key("بـــدر"), "بدر");
    }
}
