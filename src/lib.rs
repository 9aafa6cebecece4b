//! Compiler and interpreter for indentation-structured NPC AI scripts.
//!
//! Source text goes through [`frontend::lexer`] and
//! [`bytecode::compile`] into a [`bytecode::CompiledScript`], which the
//! [`runtime::vm::Vm`] runs once per entity per tick against a game world
//! seen only through [`runtime::world::WorldAccess`].

pub mod bytecode;
pub mod config;
pub mod frontend;
pub mod lang;
pub mod library;
pub mod runtime;
