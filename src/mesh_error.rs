//! MeshLoomError: unified error type for mesh-loom public APIs.
//!
//! Every fallible public operation in the crate returns this error so
//! callers have a single non-panicking surface to match on.

use thiserror::Error;

/// Unified error type for mesh-loom operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshLoomError {
    /// A tile pattern violated one of its indexing invariants.
    #[error("invalid tile pattern: {0}")]
    InvalidPattern(String),
    /// An option was present but had the wrong type or arity.
    #[error("option `{option}`: {reason}")]
    OptionsTypeMismatch {
        /// Name of the offending option.
        option: String,
        /// What was wrong with it.
        reason: String,
    },
    /// Some chunks specified a destination while others did not.
    /// Destinations must be all-pinned or all-free.
    #[error("invalid mixture of destination rank/domain specifications")]
    MixedDestinationSpecification,
    /// A tree path that must exist was absent.
    #[error("tree error: no node at path `{0}`")]
    MissingPath(String),
    /// A tree leaf held a different value kind than the access required.
    #[error("tree error: node `{path}` is not {expected}")]
    TypeMismatch {
        /// Path of the offending node.
        path: String,
        /// Kind the accessor needed.
        expected: &'static str,
    },
    /// A serialized tree or metadata record could not be decoded.
    #[error("wire format error: {0}")]
    WireFormat(String),
    /// The underlying transport reported an error. Fatal, no recovery.
    #[error("communication failure: {0}")]
    CommunicationFailure(String),
    /// A selection or chunk index was out of range for this rank.
    #[error("partition error: {0}")]
    Partition(String),
}
