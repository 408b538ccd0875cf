use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").expect("valid regex"));
static LINE_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-\n(\w)").expect("valid regex"));
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.?!;:](\s+)").expect("valid regex"));

/// Minimum words for a sentence to survive splitting
const MIN_SENTENCE_WORDS: usize = 3;

const MOJIBAKE: &[(&str, &str)] = &[
    ("Â§", "§"),
    ("â€”", "—"),
    ("â€“", "–"),
    ("â€˜", "‘"),
    ("â€™", "’"),
    ("â€œ", "“"),
    ("â€\u{9d}", "”"),
    ("â€ť", "”"),
    ("â€\u{9c}", "“"),
    ("â€", "\""),
];

/// Replace the UTF-8-read-as-Latin-1 sequences common in CFR exports
#[must_use]
pub fn repair_mojibake(text: &str) -> String {
    let mut out = text.to_string();
    for (bad, good) in MOJIBAKE {
        if out.contains(bad) {
            out = out.replace(bad, good);
        }
    }
    out
}

/// Mojibake repair plus whitespace collapse
#[must_use]
pub fn clean_text(text: &str) -> String {
    let repaired = repair_mojibake(text);
    WHITESPACE.replace_all(&repaired, " ").trim().to_string()
}

/// Whitespace-delimited word count; the token proxy used for budgets
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lowercased Unicode words
#[must_use]
pub fn words(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Split legal text into sentences.
///
/// A boundary is terminal punctuation (`. ? ! ; :`) followed by whitespace and
/// then a capital letter, an opening parenthesis or a section marker.
/// Fragments shorter than three words are discarded.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let prepared = text.replace('\r', "");
    let prepared = LINE_HYPHEN.replace_all(&prepared, "$1$2");
    let prepared = INLINE_SPACE.replace_all(&prepared, " ");
    let prepared = BLANK_LINES.replace_all(&prepared, "\n");
    let prepared = prepared.trim();

    let mut pieces = Vec::new();
    let mut start = 0usize;
    for caps in SENTENCE_END.captures_iter(prepared) {
        let Some(gap) = caps.get(1) else {
            continue;
        };
        let opens_sentence = prepared[gap.end()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase() || c == '(' || c == '§');
        if opens_sentence {
            pieces.push(&prepared[start..gap.start()]);
            start = gap.end();
        }
    }
    pieces.push(&prepared[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|s| s.chars().count() > 1)
        .filter(|s| word_count(s) >= MIN_SENTENCE_WORDS)
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_on_terminal_punctuation_before_capitals() {
        let text = "This part applies to States. Each State must comply; (a) Records are kept. \
                    See §37.3 for terms. done here now";
        let sents = split_sentences(text);
        assert_eq!(
            sents,
            vec![
                "This part applies to States.",
                "Each State must comply;",
                "(a) Records are kept.",
                "See §37.3 for terms. done here now",
            ]
        );
    }

    #[test]
    fn drops_short_fragments_and_dehyphenates() {
        let text = "Short. The agency shall main-\ntain records for three years.";
        let sents = split_sentences(text);
        assert_eq!(sents, vec!["The agency shall maintain records for three years."]);
    }

    #[test]
    fn empty_text_has_no_sentences() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n ").is_empty());
    }

    #[test]
    fn cleans_mojibake_and_whitespace() {
        assert_eq!(clean_text("  Â§37.3\n\n  Definitions â€” scope "), "§37.3 Definitions — scope");
        assert_eq!(word_count("one  two\tthree\n"), 3);
        assert_eq!(words("State-issued IDs"), vec!["state", "issued", "ids"]);
    }
}
