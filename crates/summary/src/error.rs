use thiserror::Error;

pub type Result<T> = std::result::Result<T, SummaryError>;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error(transparent)]
    Sections(#[from] docustitch_sections::SectionsError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised by `Refiner` backends
    #[error("Refinement failed: {0}")]
    Refine(String),
}

impl SummaryError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
