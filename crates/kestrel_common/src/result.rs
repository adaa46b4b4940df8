//! Common result and error types for the router.

/// The standard result type for engine operations.
///
/// `Ok` carries the routing outcome, which may itself be a failure such as an
/// infeasible placement. `Err` means an internal invariant was broken (a bug
/// in the router or in the data it was handed), never a routing verdict.
pub type KestrelResult<T> = Result<T, InternalError>;

/// A broken invariant inside the router.
///
/// Raised for conditions such as negative wire occupancy, rolling back with
/// no checkpoint, or a routing table row that names no source. These abort
/// the current operation; callers must not try to recover from them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("internal router error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
