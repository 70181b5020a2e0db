//! Error types and result alias for the crate.
//!
//! This module defines [`enum@crate::error::Error`] and the crate-wide [Result] alias. Variants cover
//! invalid configuration, field registry and evaluation failures, unit parsing and
//! dimensional mismatches, malformed data, and mesh export IO.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    #[error("field '{field}' is already registered")]
    DuplicateField { field: String },

    #[error("could not evaluate field '{field}': {source}")]
    FieldEvaluation {
        field: String,
        #[source]
        source: Box<Error>,
    },

    #[error("cyclic field dependency: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("field '{field}' failed validation: {reason}")]
    FieldValidation { field: String, reason: String },

    #[error("raw field '{field}' is not available on patch {patch}")]
    MissingRawField { field: String, patch: usize },

    #[error("cannot parse unit '{expr}': {reason}")]
    UnitParse { expr: String, reason: String },

    #[error("unit mismatch: expected dimensions of '{expected}' but found '{found}'")]
    UnitMismatch { expected: String, found: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("failed to write '{}': {source}", path.display())]
    ExportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wraps an error raised while evaluating `field`.
    pub fn evaluation(field: impl Into<String>, source: Error) -> Self {
        Error::FieldEvaluation {
            field: field.into(),
            source: Box::new(source),
        }
    }

    /// Returns the innermost error below any [`Error::FieldEvaluation`] wrappers.
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Error::FieldEvaluation { source, .. } = current {
            current = source;
        }
        current
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Other(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_string_uses_other_variant() {
        let err: Error = String::from("boom").into();
        matches!(err, Error::Other(_))
            .then_some(())
            .expect("expected Other variant");
    }

    #[test]
    fn root_cause_unwraps_nested_evaluation_errors() {
        let inner = Error::UnknownField {
            field: "Density".into(),
        };
        let err = Error::evaluation("Temperature", Error::evaluation("cell_mass", inner));
        assert!(matches!(
            err.root_cause(),
            Error::UnknownField { field } if field == "Density"
        ));
    }

    #[test]
    fn cyclic_dependency_message_lists_chain() {
        let err = Error::CyclicDependency {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic field dependency: a -> b -> a");
    }
}
