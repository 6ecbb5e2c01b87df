//! Comparison keys for song titles and artist names.
//!
//! Vendor exports spell titles the way the uploader typed them: mixed case,
//! accented or not, with `(Radio Edit)` style suffixes the catalog does not
//! carry. Both the catalog store and the matcher compare through the keys
//! built here, so a title is always normalized the same way on both sides.
//!
//! - [`normalize_title`] is the exact key: lower-case, diacritics folded,
//!   trailing bracketed suffixes removed, whitespace collapsed.
//! - [`loose_title`] additionally drops apostrophes and treats dashes and
//!   other punctuation as spaces, so `Don’t Stop – Live` and `Dont Stop Live`
//!   share a key.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static TRAILING_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(\([^()]*\)|\[[^\[\]]*\])\s*$").expect("valid regex"));

const APOSTROPHES: &[char] = &['\'', '\u{2019}', '\u{2018}', '`', '\u{00B4}', '\u{02BC}'];

/// Lower-case and strip diacritics, including letters NFD does not decompose.
pub fn fold_diacritics(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.nfd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'ø' | 'Ø' => out.push('o'),
            'æ' | 'Æ' => out.push_str("ae"),
            'œ' | 'Œ' => out.push_str("oe"),
            'ł' | 'Ł' => out.push('l'),
            'đ' | 'Đ' => out.push('d'),
            'ß' => out.push_str("ss"),
            other => out.extend(other.to_lowercase()),
        }
    }
    out
}

/// Collapse every run of whitespace to one space and trim the ends.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove trailing `(...)` / `[...]` groups, repeatedly. A title made of
/// nothing but a bracketed group is left alone.
pub fn strip_bracketed_suffixes(input: &str) -> String {
    let mut current = input.trim().to_string();
    loop {
        let stripped = TRAILING_BRACKET.replace(&current, "").trim().to_string();
        if stripped == current || stripped.is_empty() {
            return current;
        }
        current = stripped;
    }
}

/// Exact comparison key for a song title.
pub fn normalize_title(title: &str) -> String {
    collapse_whitespace(&strip_bracketed_suffixes(&fold_diacritics(title)))
}

/// Punctuation-tolerant comparison key for a song title.
pub fn loose_title(title: &str) -> String {
    let exact = normalize_title(title);
    let mut out = String::with_capacity(exact.len());
    for c in exact.chars() {
        if APOSTROPHES.contains(&c) {
            continue;
        }
        if c.is_alphanumeric() || c.is_whitespace() {
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

/// Comparison key for an artist name.
pub fn normalize_artist(name: &str) -> String {
    collapse_whitespace(&fold_diacritics(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_diacritics() {
        assert_eq!(fold_diacritics("Beyoncé"), "beyonce");
        assert_eq!(fold_diacritics("Motörhead"), "motorhead");
        assert_eq!(fold_diacritics("Søren Æbelø"), "soren aebelo");
        assert_eq!(fold_diacritics("Łódź"), "lodz");
    }

    #[test]
    fn strips_bracketed_suffixes() {
        assert_eq!(normalize_title("Radiance (Radio Edit)"), "radiance");
        assert_eq!(normalize_title("Radiance [Remastered] (Live)"), "radiance");
        assert_eq!(normalize_title("(Untitled)"), "(untitled)");
        assert_eq!(
            normalize_title("Song (With Brackets) In The Middle"),
            "song (with brackets) in the middle"
        );
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_title("  Golden \t  Hour  "), "golden hour");
    }

    #[test]
    fn loose_key_ignores_apostrophe_and_dash_variants() {
        assert_eq!(loose_title("Don’t Stop – Live"), loose_title("Dont Stop - Live"));
        assert_eq!(loose_title("Rock'n'Roll"), "rocknroll");
        assert_eq!(loose_title("Night-Drive"), "night drive");
        assert_ne!(normalize_title("Night-Drive"), normalize_title("Night Drive"));
    }

    #[test]
    fn artist_key() {
        assert_eq!(normalize_artist("  Jonathan   Fitas "), "jonathan fitas");
        assert_eq!(normalize_artist("Sigur Rós"), "sigur ros");
    }
}
