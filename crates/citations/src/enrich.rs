use once_cell::sync::Lazy;
use regex::Regex;

/// Additional citation recognizer layered over the base patterns.
///
/// Enrichers only contribute tokens; the extractor unions them with what the
/// base patterns found, so nothing an enricher does can remove a token.
pub trait CitationEnricher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Normalized tokens found in `text`. Unrecognized input yields nothing.
    fn enrich(&self, text: &str) -> Vec<String>;
}

static DOTTED_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*C\.\s?F\.\s?R\.\s*(?:§{1,2}\s*)?(\d{1,3}\.\d{1,3}[A-Za-z0-9\-]*)")
        .expect("valid dotted section regex")
});

static DOTTED_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*C\.\s?F\.\s?R\.\s*(?:part|pt\.)\s*(\d{1,3})\b")
        .expect("valid dotted part regex")
});

static LONG_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\btitle\s+(\d+)\s*,?\s*(?:of\s+the\s+)?Code\s+of\s+Federal\s+Regulations\s*,?\s*(?:part\s+(\d{1,3})\b|(?:section|§{1,2})\s*(\d{1,3}\.\d{1,3}[A-Za-z0-9\-]*))",
    )
    .expect("valid long-form citation regex")
});

/// Recognizes long-form and dotted CFR citations
/// (`title 6, Code of Federal Regulations, section 37.3`, `6 C.F.R. 37.3`,
/// `6 C.F.R. part 37`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CfrCitationParser;

impl CfrCitationParser {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CitationEnricher for CfrCitationParser {
    fn name(&self) -> &'static str {
        "cfr-citation-parser"
    }

    fn enrich(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();

        for caps in DOTTED_SECTION.captures_iter(text) {
            tokens.push(format!("{}CFR §{}", &caps[1], &caps[2]));
        }
        for caps in DOTTED_PART.captures_iter(text) {
            tokens.push(format!("{}CFR part {}", &caps[1], &caps[2]));
        }
        for caps in LONG_FORM.captures_iter(text) {
            let title = &caps[1];
            if let Some(part) = caps.get(2) {
                tokens.push(format!("{title}CFR part {}", part.as_str()));
            } else if let Some(section) = caps.get(3) {
                tokens.push(format!("{title}CFR §{}", section.as_str()));
                tokens.push(format!("§{}", section.as_str()));
            }
        }

        tokens.sort();
        tokens.dedup();
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn recognizes_dotted_forms() {
        let parser = CfrCitationParser::new();
        assert_eq!(
            parser.enrich("See 49 C.F.R. § 1570.3 and 6 C.F.R. part 37."),
            vec!["49CFR §1570.3", "6CFR part 37"]
        );
    }

    #[test]
    fn recognizes_long_forms() {
        let parser = CfrCitationParser::new();
        assert_eq!(
            parser.enrich("under title 6, Code of Federal Regulations, section 37.3 and title 28 of the Code of Federal Regulations, part 115"),
            vec!["28CFR part 115", "6CFR §37.3", "§37.3"]
        );
    }

    #[test]
    fn ignores_plain_text() {
        assert!(CfrCitationParser::new()
            .enrich("The Secretary may issue regulations.")
            .is_empty());
    }
}
