//! Typed errors for the runtime, split the way the teacher splits
//! `RdeError`: structured variants here for the cases callers branch on,
//! `anyhow::Error` at the boundary for everything else.

use thiserror::Error;

/// The five error kinds this engine distinguishes (see the error-handling
/// design notes): configuration errors fail pipeline start, transient I/O
/// errors are locally recovered, event-level parse errors drop one event,
/// channel closure is a normal shutdown signal, and invariant violations
/// are fatal to the pipeline.
#[derive(Debug, Error)]
pub enum SluiceError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient I/O error in {component}: {source}")]
    TransientIo {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("event-level error at path {path}: {reason}")]
    EventParse { path: String, reason: String },

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SluiceError>;
