//! Script loading by path.
//!
//! Source files are compiled, `.aic` files are read back from their
//! persisted form. Results are cached per path and shared between entities.
//! A script that fails to load is reported once and replaced by the no-op
//! script, so the entity still exists and simply does nothing.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::bytecode::compile::Compiler;
use crate::bytecode::compile_error::Diagnostics;
use crate::bytecode::ir::{CompiledScript, PersistError, ScriptFlags};
use crate::config::Config;
use crate::lang::symbol::SymbolTable;
use crate::runtime::builtins::BuiltinTable;

/// File extension of persisted bytecode.
pub const PERSISTED_EXTENSION: &str = "aic";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Compile(Diagnostics),
    #[error("{path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
}

pub struct ScriptLibrary {
    table: BuiltinTable,
    symbols: SymbolTable,
    cache: HashMap<PathBuf, Arc<CompiledScript>>,
    noop: Arc<CompiledScript>,
}

impl Default for ScriptLibrary {
    fn default() -> Self {
        let table = BuiltinTable::standard();
        Self::new(table, SymbolTable::standard(&table))
    }
}

impl ScriptLibrary {
    pub fn new(table: BuiltinTable, symbols: SymbolTable) -> Self {
        Self {
            table,
            symbols,
            cache: HashMap::new(),
            noop: Arc::new(CompiledScript::noop("<noop>")),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let table = BuiltinTable::standard();
        Self::new(table, config.symbols(&table))
    }

    pub fn table(&self) -> &BuiltinTable {
        &self.table
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn noop(&self) -> Arc<CompiledScript> {
        Arc::clone(&self.noop)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn compile_source(&self, name: &str, source: &str) -> Result<CompiledScript, Diagnostics> {
        Compiler::new(&self.table).compile_source(name, source, &self.symbols)
    }

    /// Compiles (or decodes) the script at `path` without touching the
    /// cache. Every diagnostic is returned to the caller, labelled with the
    /// full path.
    pub fn compile_path(&self, path: &Path) -> Result<CompiledScript, LoadError> {
        let io_error = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };

        if path.extension().and_then(|e| e.to_str()) == Some(PERSISTED_EXTENSION) {
            let bytes = fs::read(path).map_err(io_error)?;
            return CompiledScript::from_bytes(&bytes, &self.table).map_err(|source| {
                LoadError::Persist {
                    path: path.to_path_buf(),
                    source,
                }
            });
        }

        let source = fs::read_to_string(path).map_err(io_error)?;
        self.compile_source(&script_name(path), &source)
            .map_err(|mut diagnostics| {
                diagnostics.script = path.display().to_string();
                LoadError::Compile(diagnostics)
            })
    }

    /// Returns the shared script for `path`, compiling it on first use.
    /// Failures are logged and cached as the no-op script.
    pub fn load(&mut self, path: &Path) -> Arc<CompiledScript> {
        if let Some(script) = self.cache.get(path) {
            return Arc::clone(script);
        }

        let script = match self.compile_path(path) {
            Ok(script) => {
                if script.flags.contains(ScriptFlags::MISSING_END) {
                    warn!(path = %path.display(), "script does not end with End");
                }
                debug!(path = %path.display(), words = script.len(), "script loaded");
                Arc::new(script)
            }
            Err(err) => {
                warn!(path = %path.display(), "{err}; using the no-op script");
                self.noop()
            }
        };

        self.cache.insert(path.to_path_buf(), Arc::clone(&script));
        script
    }

    /// Drops every cached script so the next `load` reads from disk again.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

fn script_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile_error::CompileErrorKind;

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_caches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "guard.txt", b"IfTimeOut\n  SetAlertBit\nEnd\n");

        let mut library = ScriptLibrary::default();
        let first = library.load(&path);
        let second = library.load(&path);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name, "guard.txt");
        assert_eq!(first.words.len(), 3);
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_compile_path_returns_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.txt", b"IfSpawned\n  tmpx = FooBarBaz\nEnd\n");

        let library = ScriptLibrary::default();
        match library.compile_path(&path) {
            Err(LoadError::Compile(diagnostics)) => {
                assert_eq!(diagnostics.script, path.display().to_string());
                let first = diagnostics.first().unwrap();
                assert!(matches!(first.kind, CompileErrorKind::UnknownIdentifier { .. }));
                assert_eq!(diagnostics.entries()[0].0, 2);
            }
            other => panic!("expected diagnostics, got {:?}", other),
        }
    }

    #[test]
    fn test_diagnostics_tell_same_named_files_apart() {
        let dir = tempfile::tempdir().unwrap();
        let goblin_dir = dir.path().join("goblin");
        let troll_dir = dir.path().join("troll");
        fs::create_dir(&goblin_dir).unwrap();
        fs::create_dir(&troll_dir).unwrap();
        let goblin = write(&goblin_dir, "bad.txt", b"tmpx = FooBarBaz\nEnd\n");
        let troll = write(&troll_dir, "bad.txt", b"IfSpawned\n  tmpx = FooBarBaz\n");

        let library = ScriptLibrary::default();
        let report = |path: &Path| match library.compile_path(path) {
            Err(err) => err.to_string(),
            Ok(_) => String::new(),
        };

        let first = report(&goblin);
        let second = report(&troll);
        assert!(first.contains(&format!("{}:1:8: ", goblin.display())), "{first}");
        assert!(second.contains(&format!("{}:2:10: ", troll.display())), "{second}");
        assert!(!first.contains(&troll.display().to_string()));
    }

    #[test]
    fn test_failed_load_falls_back_to_noop() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.txt", b"Else\nEnd\n");
        let missing = dir.path().join("missing.txt");

        let mut library = ScriptLibrary::default();
        let noop = library.load(&bad);
        assert!(noop.is_noop());
        assert!(Arc::ptr_eq(&noop, &library.load(&missing)));
    }

    #[test]
    fn test_persisted_scripts_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let library = ScriptLibrary::default();
        let script = library
            .compile_source("guard.txt", "IfSpawned\n  tmpx = 3\nElse\n  Stop\nEnd")
            .unwrap();
        let path = write(dir.path(), "guard.aic", &script.to_bytes().unwrap());

        let loaded = library.compile_path(&path).unwrap();
        assert_eq!(loaded, script);

        let garbage = write(dir.path(), "junk.aic", b"not bytecode");
        assert!(matches!(
            library.compile_path(&garbage),
            Err(LoadError::Persist { .. })
        ));
    }

    #[test]
    fn test_config_constants_visible_to_scripts() {
        let mut config = Config::default();
        config.constants.insert("GUARD_RANGE".to_string(), 300);
        let library = ScriptLibrary::from_config(&config);
        let script = library
            .compile_source("range.txt", "tmpdistance = GUARD_RANGE\nEnd")
            .unwrap();
        assert_eq!(script.words.len(), 3);
    }
}
