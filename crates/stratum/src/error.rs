//! error taxonomy
//!
//! Every error raised by this crate is a plain value carrying enough context
//! to point a human at the offending spot: the variants that correspond to a
//! location in a document carry the [crate::origin::Origin] of the value that
//! caused them.
//!
//! Parse and resolve failures abort the whole operation. There is no retry.

use crate::origin::Origin;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Malformed document syntax
    #[error("{origin}: {message}")]
    Parse { origin: Origin, message: String },

    /// Malformed path text
    #[error("invalid path '{path}': {message}")]
    BadPath { path: String, message: String },

    /// Type mismatch during concatenation or a typed read
    #[error("{origin}: {message}")]
    WrongType { origin: Origin, message: String },

    /// A reference cycle, or a reference that cannot be satisfied after
    /// exhausting the tree and the external resolver chain
    #[error("{origin}: {message}")]
    UnresolvedSubstitution { origin: Origin, message: String },

    /// Read attempted on a tree that still contains unresolved nodes
    #[error("value is not resolved: {message}")]
    NotResolved { message: String },

    /// Internal invariant violation
    #[error("bug or broken: {message}")]
    BugOrBroken { message: String },

    /// I/O failure while loading an included document
    #[error("unable to load document")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn parse(origin: &Origin, message: impl Into<String>) -> Self {
        ConfigError::Parse {
            origin: origin.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn wrong_type(origin: &Origin, message: impl Into<String>) -> Self {
        ConfigError::WrongType {
            origin: origin.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn unresolved(origin: &Origin, message: impl Into<String>) -> Self {
        ConfigError::UnresolvedSubstitution {
            origin: origin.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn not_resolved(message: impl Into<String>) -> Self {
        ConfigError::NotResolved {
            message: message.into(),
        }
    }

    pub(crate) fn bug(message: impl Into<String>) -> Self {
        ConfigError::BugOrBroken {
            message: message.into(),
        }
    }
}
