use serde::{Deserialize, Serialize};

/// A four character tag packed into 20 bits, five bits per character with the
/// first character in the highest position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Idsz(pub u32);

impl Idsz {
    pub const NONE: Idsz = Idsz::pack([b'N', b'O', b'N', b'E']);

    pub const fn pack(chars: [u8; 4]) -> Idsz {
        let c0 = (chars[0].wrapping_sub(b'A') & 0x1F) as u32;
        let c1 = (chars[1].wrapping_sub(b'A') & 0x1F) as u32;
        let c2 = (chars[2].wrapping_sub(b'A') & 0x1F) as u32;
        let c3 = (chars[3].wrapping_sub(b'A') & 0x1F) as u32;
        Idsz((c0 << 15) | (c1 << 10) | (c2 << 5) | c3)
    }

    /// Packs the body of an IDSZ literal. Returns `None` unless `text` is
    /// exactly four ASCII characters.
    pub fn parse(text: &str) -> Option<Idsz> {
        let bytes = text.as_bytes();
        if bytes.len() != 4 || !text.is_ascii() {
            return None;
        }
        Some(Idsz::pack([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn value(self) -> i32 {
        self.0 as i32
    }

    /// Recovers the letters. Only exact for tags built from `A..=Z` and the
    /// five punctuation characters that follow `Z` in ASCII.
    pub fn unpack(self) -> String {
        (0..4)
            .rev()
            .map(|i| (((self.0 >> (i * 5)) & 0x1F) as u8 + b'A') as char)
            .collect()
    }
}

impl std::fmt::Display for Idsz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.unpack())
    }
}
