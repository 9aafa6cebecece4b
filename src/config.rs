use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::lang::symbol::SymbolTable;
use crate::runtime::builtins::BuiltinTable;
use crate::runtime::vm::VmConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct VmSection {
    #[serde(default = "VmSection::default_instruction_ceiling")]
    pub instruction_ceiling: usize,
    #[serde(default)]
    pub record_calls: bool,
}

impl VmSection {
    const fn default_instruction_ceiling() -> usize {
        4096
    }
}

impl Default for VmSection {
    fn default() -> Self {
        Self {
            instruction_ceiling: Self::default_instruction_ceiling(),
            record_calls: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vm: VmSection,
    /// Extra named constants. Registered after every built-in name, so a
    /// constant that collides with one is ignored.
    #[serde(default)]
    pub constants: BTreeMap<String, i32>,
    #[serde(default = "Config::default_script_extension")]
    pub script_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vm: VmSection::default(),
            constants: BTreeMap::new(),
            script_extension: Self::default_script_extension(),
        }
    }
}

impl Config {
    fn default_script_extension() -> String {
        "txt".to_string()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn vm_config(&self) -> VmConfig {
        VmConfig {
            instruction_ceiling: self.vm.instruction_ceiling,
            record_calls: self.vm.record_calls,
        }
    }

    /// The standard namespace plus the configured constants.
    pub fn symbols(&self, table: &BuiltinTable) -> SymbolTable {
        let mut symbols = SymbolTable::standard(table);
        for (name, value) in &self.constants {
            if !symbols.define_constant(name, *value) {
                warn!(constant = %name, "constant shadows a built-in name and was ignored");
            }
        }
        symbols
    }
}
