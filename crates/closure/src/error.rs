use thiserror::Error;

/// Errors surfaced by checked closure operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClosureError {
    #[error("task closure is empty")]
    Empty,
}
