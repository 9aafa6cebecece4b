use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::lang::idsz::Idsz;
use crate::lang::variable::{VARIABLE_NAMES, Variable};
use crate::runtime::builtins::BuiltinTable;

/// What an identifier means. Every identifier is resolved to one of these at
/// compile time, so bytecode never carries names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedSymbol {
    Constant(i32),
    Variable(Variable),
    /// Dense index into the built-in table.
    Builtin(u16),
}

/// Named compile-time constants every script can use.
pub const BUILTIN_CONSTANTS: &[(&str, i32)] = &[
    ("FALSE", 0),
    ("TRUE", 1),
    // damage kinds
    ("DAMAGE_SLASH", 0),
    ("DAMAGE_CRUSH", 1),
    ("DAMAGE_POKE", 2),
    ("DAMAGE_HOLY", 3),
    ("DAMAGE_EVIL", 4),
    ("DAMAGE_FIRE", 5),
    ("DAMAGE_ICE", 6),
    ("DAMAGE_ZAP", 7),
    ("DAMAGE_NONE", 255),
    // teams are numbered by letter, A = 0
    ("TEAM_EVIL", 4),
    ("TEAM_GOOD", 6),
    ("TEAM_NULL", 13),
    // experience sources
    ("XP_FINDSECRET", 0),
    ("XP_WINQUEST", 1),
    ("XP_USEDUNKOWN", 2),
    ("XP_KILLENEMY", 3),
    ("XP_KILLSLEEPY", 4),
    ("XP_KILLHATED", 5),
    ("XP_TEAMKILL", 6),
    ("XP_TALKGOOD", 7),
    ("XP_DIRECT", 255),
    // movement modes
    ("MOVE_RUN", 0),
    ("MOVE_WALK", 1),
    ("MOVE_SNEAK", 2),
    ("IDSZ_NONE", Idsz::NONE.0 as i32),
];

/// One flat namespace for built-ins, variables and constants.
///
/// The first registration of a name wins. [`SymbolTable::standard`] registers
/// built-in operations, then variables, then built-in constants, so user
/// constants added afterwards can never shadow anything built in.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, ResolvedSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard(table: &BuiltinTable) -> Self {
        let mut symbols = Self::new();
        for (index, def) in table.iter() {
            symbols.define(def.name, ResolvedSymbol::Builtin(index));
        }
        for (name, var) in VARIABLE_NAMES {
            symbols.define(name, ResolvedSymbol::Variable(*var));
        }
        for (name, value) in BUILTIN_CONSTANTS {
            symbols.define(name, ResolvedSymbol::Constant(*value));
        }
        symbols
    }

    /// Registers `name` unless it is already taken. Returns whether it was
    /// added.
    pub fn define(&mut self, name: &str, symbol: ResolvedSymbol) -> bool {
        match self.symbols.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(symbol);
                true
            }
        }
    }

    pub fn define_constant(&mut self, name: &str, value: i32) -> bool {
        self.define(name, ResolvedSymbol::Constant(value))
    }

    pub fn resolve(&self, name: &str) -> Option<ResolvedSymbol> {
        self.symbols.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
