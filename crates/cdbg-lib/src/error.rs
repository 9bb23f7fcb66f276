//! Error types for sequence ingestion and graph mutation.

use thiserror::Error;

/// Error type for the compaction pipeline.
///
/// `BadAlphabet` and `LengthError` are read-scoped: the offending read is
/// skipped and the graph is untouched. `Uninitialized` and `Invariant` are
/// programming errors and should never be seen in a correct pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CdbgError {
    /// The input contains a symbol outside {A, C, G, T}.
    #[error("Invalid DNA base {base:?} at position {pos}")]
    BadAlphabet {
        /// The offending byte
        base: u8,
        /// Its position in the input
        pos: usize,
    },

    /// The input is shorter than the k-mer length.
    #[error("Sequence of length {actual} is shorter than K={k}")]
    LengthError {
        /// Configured k-mer length
        k: usize,
        /// Actual input length
        actual: usize,
    },

    /// A hasher was rolled before being seeded.
    #[error("Hasher used before seed() was called")]
    Uninitialized,

    /// A graph invariant failed to hold after a mutation.
    #[error("cDBG invariant violated: {0}")]
    Invariant(String),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, CdbgError>;
