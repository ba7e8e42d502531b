use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BrandError {
    /// The built-in tables failed to assemble or cross-check.
    #[error("built-in vehicle tables are inconsistent: {0}")]
    Tables(String),
}
