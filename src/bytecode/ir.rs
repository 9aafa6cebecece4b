use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytecode::op::{DecodeError, Op};
use crate::bytecode::verify::{VerifyError, verify};
use crate::runtime::builtins::BuiltinTable;

/// Bumped whenever the persisted layout changes.
pub const FORMAT_VERSION: u16 = 1;
const MAGIC: [u8; 4] = *b"AISC";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ScriptFlags: u8 {
        /// Stand-in used after a script failed to load.
        const NOOP_FALLBACK = 1 << 0;
        /// The last top-level instruction is not `End`.
        const MISSING_END = 1 << 1;
    }
}

/// A compiled AI script. Immutable once built and shared by every entity
/// running it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledScript {
    pub name: String,
    pub words: Vec<u32>,
    /// Label id -> word offset. An offset equal to `words.len()` ends the run.
    pub labels: Vec<u32>,
    /// Number of distinct built-ins the script calls.
    pub builtins_used: u16,
    pub flags: ScriptFlags,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to encode script: {0}")]
    Encode(#[source] postcard::Error),
    #[error("failed to decode script: {0}")]
    Decode(#[source] postcard::Error),
    #[error("not a compiled script")]
    BadMagic,
    #[error("unsupported format version {found} (expected {expected})")]
    Version { found: u16, expected: u16 },
    #[error("persisted script failed verification: {0}")]
    Verify(#[from] VerifyError),
}

#[derive(Serialize, Deserialize)]
struct Persisted {
    magic: [u8; 4],
    version: u16,
    script: CompiledScript,
}

impl CompiledScript {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            words: Vec::new(),
            labels: Vec::new(),
            builtins_used: 0,
            flags: ScriptFlags::empty(),
        }
    }

    /// Script that does nothing. Entities whose script failed to load run it.
    pub fn noop(name: impl Into<String>) -> Self {
        let mut script = Self::new(name);
        script.flags = ScriptFlags::NOOP_FALLBACK;
        script
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.flags.contains(ScriptFlags::NOOP_FALLBACK)
    }

    pub fn label_offset(&self, label: u32) -> Option<usize> {
        self.labels.get(label as usize).map(|offset| *offset as usize)
    }

    /// Decoded view of the word stream; corrupt words show up as `Err`.
    pub fn ops(&self) -> impl Iterator<Item = (usize, Result<Op, DecodeError>)> + '_ {
        self.words
            .iter()
            .enumerate()
            .map(|(offset, word)| (offset, Op::decode(*word)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistError> {
        let persisted = Persisted {
            magic: MAGIC,
            version: FORMAT_VERSION,
            script: self.clone(),
        };
        postcard::to_allocvec(&persisted).map_err(PersistError::Encode)
    }

    /// Decodes and verifies against `table`. A script that passes is safe to
    /// hand to the VM.
    pub fn from_bytes(bytes: &[u8], table: &BuiltinTable) -> Result<Self, PersistError> {
        let persisted: Persisted = postcard::from_bytes(bytes).map_err(PersistError::Decode)?;
        if persisted.magic != MAGIC {
            return Err(PersistError::BadMagic);
        }
        if persisted.version != FORMAT_VERSION {
            return Err(PersistError::Version {
                found: persisted.version,
                expected: FORMAT_VERSION,
            });
        }
        verify(&persisted.script, table)?;
        Ok(persisted.script)
    }
}
