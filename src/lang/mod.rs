//! Script language vocabulary shared by the lexer, compiler and VM: IDSZ
//! tags, built-in variables and the identifier namespace.

pub mod idsz;
pub mod symbol;
pub mod variable;
