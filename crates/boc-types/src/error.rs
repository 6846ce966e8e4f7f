use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("empty object part in identifier: {0:?}")]
    EmptyObject(String),

    #[error("empty version in identifier: {0:?}")]
    EmptyVersion(String),

    /// A stray separator or an unknown `%` escape.
    #[error("malformed identifier {0:?}")]
    Malformed(String),

    #[error("invalid database qualifier {qualifier:?} in identifier {input:?}")]
    InvalidDbQualifier { input: String, qualifier: String },
}
