//! Crate-wide error type.
//!
//! Every failure is surfaced synchronously to the caller of the offending
//! registration, invocation or backward call. None of them are transient, so
//! nothing inside the engine retries or recovers.

/// All errors produced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation with this name is already registered.
    #[error("operation `{name}` is already registered")]
    DuplicateRegistration { name: String },

    /// No operation with this name is registered.
    #[error("unknown operation `{name}`")]
    UnknownOperation { name: String },

    /// Operand shapes are incompatible with the operation's contract.
    #[error("shape mismatch in `{op}`: {detail}")]
    ShapeMismatch { op: String, detail: String },

    /// Wrong number of tensor inputs for an operation.
    #[error("`{op}` takes {expected} tensor input(s), got {got}")]
    ArityMismatch {
        op: String,
        expected: usize,
        got: usize,
    },

    /// The non-tensor parameter passed to an operation has the wrong kind.
    #[error("`{op}` expects {expected} as its parameter")]
    InvalidParams { op: String, expected: &'static str },

    /// Backward was requested on a tensor with no recorded history.
    #[error("tensor has no graph node; nothing to differentiate")]
    NoGraph,

    /// Backward from a non-scalar root needs an explicit seed gradient.
    #[error("backward from a tensor of shape {shape:?} requires a seed gradient")]
    NonScalarRoot { shape: Vec<usize> },

    /// The node's saved context was released by an earlier backward pass.
    #[error("saved context of `{op}` was already released by a previous backward pass")]
    GraphReleased { op: String },

    /// The context handed to an operation's backward is not the one it saved.
    #[error("context type mismatch in `{op}`")]
    ContextMismatch { op: String },

    /// An unrecognized reduction mode string.
    #[error("unsupported reduction `{mode}` (expected none, sum or mean)")]
    UnsupportedReduction { mode: String },

    /// Raw array data was rejected on ingestion.
    #[error("invalid array data: {reason}")]
    InvalidData { reason: String },

    /// A persisted array file is malformed.
    #[error("bad array file: {reason}")]
    BadFormat { reason: &'static str },

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::ShapeMismatch`].
    pub fn shape(op: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            op: op.into(),
            detail: detail.into(),
        }
    }

    /// Shorthand for [`Error::InvalidData`].
    pub fn invalid_data(reason: impl Into<String>) -> Self {
        Self::InvalidData {
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
