pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod verify;

pub use compile::Compiler;
pub use compile_error::{CompileError, CompileErrorKind, Diagnostics};
pub use ir::{CompiledScript, ScriptFlags};
pub use op::{Op, Operator};
