use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static LOCAL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^§\d{1,3}\.\d{1,4}").expect("valid local token regex"));

static SECTION_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^§*(\d{1,3})\.(\d{1,4})([A-Za-z0-9\-]*)").expect("valid section number regex")
});

/// Canonical form of a section id: mojibake repaired, all whitespace removed.
///
/// `"§ 37.3"` and `"Â§37.3 "` both become `"§37.3"`.
#[must_use]
pub fn normalize_sec_id(raw: &str) -> String {
    raw.replace("Â§", "§")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// True for tokens shaped like an in-document citation (`§<part>.<section>…`)
#[must_use]
pub fn is_local_section_token(token: &str) -> bool {
    LOCAL_TOKEN.is_match(&normalize_sec_id(token))
}

/// Major part number of a section id (`§37.3` -> 37)
#[must_use]
pub fn part_prefix(sec_id: &str) -> Option<u32> {
    SectionNumber::parse(sec_id).map(|n| n.part)
}

/// Parsed `<part>.<section>[suffix]` number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionNumber {
    pub part: u32,
    pub section: u32,
    pub suffix: String,
}

impl SectionNumber {
    /// Parse `§37.3`, `37.3`, `§§37.10a` and similar; clause suffixes like `(b)` are ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_sec_id(raw);
        let caps = SECTION_NUMBER.captures(&normalized)?;
        Some(Self {
            part: caps.get(1)?.as_str().parse().ok()?,
            section: caps.get(2)?.as_str().parse().ok()?,
            suffix: caps
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }
}

impl fmt::Display for SectionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "§{}.{}{}", self.part, self.section, self.suffix)
    }
}
