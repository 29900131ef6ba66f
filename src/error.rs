//! The closed set of error kinds the virtual memory core can raise.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("malformed or unrecognized executable header")]
    BadExecutable,

    #[error("no free swap slot available")]
    SwapExhausted,

    #[error("swap I/O failed: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal invariant violation: frame-table/page-table disagreement, an
    /// unreachable clock fallthrough, and the like. Fatal.
    #[error("internal invariant violated: {0}")]
    Assertion(String),
}

pub type VmResult<T> = Result<T, VmError>;
