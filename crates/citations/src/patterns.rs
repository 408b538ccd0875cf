use once_cell::sync::Lazy;
use regex::Regex;

/// `§ 37.3`, `§§37.10a(b)`
pub(crate) static LOCAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)§{1,2}\s*\d{1,3}\.\d{1,3}[A-Za-z0-9\-]*(?:\([a-z0-9]+\))?")
        .expect("valid local citation regex")
});

/// `§§ 37.3–37.9`, `§§37.3 through 37.9`
pub(crate) static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)§{2}\s*(\d{1,3}\.\d{1,3})\s*(?:–|-|to|through)\s*(\d{1,3}\.\d{1,3})")
        .expect("valid range citation regex")
});

/// `section 115.10`, `sections 37.5`
pub(crate) static IN_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bsections?\s+(\d{1,3}\.\d{1,3}[A-Za-z0-9\-]*)")
        .expect("valid in-word citation regex")
});

/// `20 CFR § 408.210`
pub(crate) static CROSS_DOC_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*CFR\s*§{1,2}\s*(\d{1,3}\.\d{1,3}[A-Za-z0-9\-]*)")
        .expect("valid cross-document section regex")
});

/// `6 CFR part 115`
pub(crate) static CROSS_DOC_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*CFR\s+part\s+(\d{1,3})\b").expect("valid cross-document part regex")
});

/// Pattern families in the order they are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatternKind {
    Range,
    Local,
    InWord,
    CrossDocSection,
    CrossDocPart,
}

impl PatternKind {
    pub(crate) const PRIORITY: [Self; 5] = [
        Self::Range,
        Self::Local,
        Self::InWord,
        Self::CrossDocSection,
        Self::CrossDocPart,
    ];

    pub(crate) fn regex(self) -> &'static Regex {
        match self {
            Self::Range => &RANGE,
            Self::Local => &LOCAL,
            Self::InWord => &IN_WORD,
            Self::CrossDocSection => &CROSS_DOC_SECTION,
            Self::CrossDocPart => &CROSS_DOC_PART,
        }
    }
}
