//! Errors raised when domain values would break an invariant.

/// A trip or leg that cannot be built as given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Trip has no legs
    #[error("trip must have at least one leg")]
    EmptyTrip,

    /// Consecutive legs don't meet at the same stop place
    #[error("leg {index} starts at {to} but the previous leg ends at {from}")]
    LegsNotContiguous {
        index: usize,
        from: String,
        to: String,
    },
}
