//! Recoverable compile problems.
//!
//! Schema and rule compilation never fail as a whole: each problem drops the smallest
//! enclosing element (node, condition, mutation or rule), is logged once, and is
//! returned to the caller as a [`Diagnostic`].

use std::fmt;

use thiserror::Error;
use tracing::warn;

/// What went wrong with one schema or rule element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The document is not valid JSON.
    #[error("malformed json: {0}")]
    MalformedJson(String),
    /// A required key is absent or has the wrong JSON type.
    #[error("missing or invalid `{0}`")]
    MissingKey(&'static str),
    /// An element has the right keys but unusable values.
    #[error("malformed entry: {0}")]
    MalformedEntry(String),
    /// A struct node has no `data` array.
    #[error("struct `{0}` has no data array")]
    StructWithoutData(String),
    /// A leaf node has neither `type` nor `size`.
    #[error("field `{0}` has neither a type nor a size")]
    UntypedField(String),
    /// A leaf names a type outside the supported set.
    #[error("unknown type `{type_name}` for field `{field}`")]
    UnknownType {
        /// Fully qualified field name.
        field: String,
        /// The offending type name.
        type_name: String,
    },
    /// A rule references a field no layout declares.
    #[error("unknown field `{0}`")]
    UnknownField(String),
    /// A condition uses an operator outside `== != < > <= >=`.
    #[error("invalid operator `{0}`")]
    InvalidOperator(String),
    /// A literal cannot be represented in the field's type.
    #[error("invalid literal for field `{0}`")]
    InvalidLiteral(String),
}

/// A located [`CompileError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Where in the document the problem sits, e.g. `rules[2].conditions[0]`.
    pub location: String,
    /// The problem itself.
    pub error: CompileError,
}

impl Diagnostic {
    /// Creates a diagnostic and logs it.
    pub(crate) fn report(location: impl Into<String>, error: CompileError) -> Self {
        let location = location.into();
        warn!(%location, "{}; element dropped", error);
        Self { location, error }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diagnostic =
            Diagnostic::report("rules[0].conditions[1]", CompileError::UnknownField("foo".into()));
        assert_eq!(diagnostic.to_string(), "rules[0].conditions[1]: unknown field `foo`");
    }

    #[test]
    fn test_unknown_type_display() {
        let error =
            CompileError::UnknownType { field: "hdr.len".into(), type_name: "int128".into() };
        assert_eq!(error.to_string(), "unknown type `int128` for field `hdr.len`");
    }
}
