use thiserror::Error;

use crate::frontend::token::{LexErrorKind, SourceLocation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String },
    #[error("malformed IDSZ literal '{lexeme}': {cause}")]
    MalformedIdsz { lexeme: String, cause: LexErrorKind },
    #[error("invalid token '{lexeme}': {cause}")]
    InvalidToken { lexeme: String, cause: LexErrorKind },
    #[error("unbalanced block: {reason}")]
    UnbalancedBlock { reason: String },
    #[error("'{name}' takes {expected} operands, found {found}")]
    OperandCountMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot assign to read-only variable '{name}'")]
    ReadOnlyVariable { name: String },
    #[error("constant {value} does not fit in 24 bits")]
    ConstantOutOfRange { value: i32 },
    #[error("malformed expression: {reason}")]
    MalformedExpression { reason: String },
    #[error("malformed statement starting with '{lexeme}'")]
    MalformedStatement { lexeme: String },
    #[error("script too large: {what}")]
    ScriptTooLarge { what: &'static str },
}

impl CompileErrorKind {
    pub(crate) fn unbalanced(reason: impl Into<String>) -> Self {
        CompileErrorKind::UnbalancedBlock {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_expression(reason: impl Into<String>) -> Self {
        CompileErrorKind::MalformedExpression {
            reason: reason.into(),
        }
    }
}

/// One problem in a script, with where it starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub location: SourceLocation,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

/// Every error found in one script. A script with any diagnostics is
/// rejected as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub script: String,
    errors: Vec<CompileError>,
}

impl Diagnostics {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: CompileErrorKind, location: SourceLocation) {
        self.errors.push(CompileError::new(kind, location));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn first(&self) -> Option<&CompileError> {
        self.errors.first()
    }

    /// `(line, column, message)` for each error, in source order.
    pub fn entries(&self) -> Vec<(usize, usize, String)> {
        self.errors
            .iter()
            .map(|e| (e.location.line, e.location.column, e.kind.to_string()))
            .collect()
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} error(s)", self.script, self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  {}:{}", self.script, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_has_location() {
        let error = CompileError::new(
            CompileErrorKind::UnknownIdentifier {
                name: "FooBarBaz".to_string(),
            },
            SourceLocation::new(3, 5),
        );
        assert_eq!(error.to_string(), "3:5: unknown identifier 'FooBarBaz'");
    }

    #[test]
    fn test_entries_and_display() {
        let mut diagnostics = Diagnostics::new("guard.txt");
        diagnostics.push(CompileErrorKind::unbalanced("'Else' without a block"), SourceLocation::new(1, 1));
        diagnostics.push(
            CompileErrorKind::ConstantOutOfRange { value: 1 << 24 },
            SourceLocation::new(2, 8),
        );

        let entries = diagnostics.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].0, 2);
        assert_eq!(entries[1].1, 8);
        assert!(entries[1].2.contains("24 bits"));

        let text = diagnostics.to_string();
        assert!(text.starts_with("guard.txt: 2 error(s)"));
        assert!(text.contains("guard.txt:1:1: unbalanced block"));
    }
}
