use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid weight {name}={value}: must be finite and non-negative")]
    InvalidWeight { name: &'static str, value: f32 },
}
