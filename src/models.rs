pub mod cartelas;
pub mod games;
pub mod money;
pub mod reports;
pub mod users;

/// Raised when a stored enum column holds a value this build does not know.
#[derive(Debug, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
