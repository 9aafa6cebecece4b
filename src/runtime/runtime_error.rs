use thiserror::Error;

use crate::bytecode::op::DecodeError;

/// A fault in a compiled script found while running it. Compiled output never
/// triggers these; the VM skips the offending word and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeDefect {
    #[error("corrupt instruction: {0}")]
    Corrupt(#[from] DecodeError),
    #[error("built-in index {0} out of range")]
    UnknownBuiltin(u16),
    #[error("label {0} is not defined")]
    UndefinedLabel(u32),
    #[error("no variable in slot {0}")]
    UnknownVariable(u8),
    #[error("variable '{0}' is read-only")]
    ReadOnlyVariable(&'static str),
    #[error("expression expects {expected} operands, found {found}")]
    TruncatedExpression { expected: u8, found: u8 },
    #[error("operand outside an expression")]
    StrayOperand,
}
