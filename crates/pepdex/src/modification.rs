use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// At most this many distinct modifications can be tracked per residue,
/// since the modification bitmask shares a `u16` with the residue code
pub const MAX_AA_MODS: usize = 11;

const RESIDUE_BITS: u16 = 5;
const RESIDUE_MASK: u16 = (1 << RESIDUE_BITS) - 1;

/// A residue together with the set of modifications applied to it.
///
/// The residue code (`residue - b'A'`) occupies the low 5 bits and bit
/// `5 + i` is set when modification `i` of the [`ModTable`] is applied
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[repr(transparent)]
pub struct ModifiedResidue(pub u16);

impl ModifiedResidue {
    pub fn new(residue: u8) -> Self {
        let code = match residue {
            b'A'..=b'Z' => residue - b'A',
            _ => b'X' - b'A',
        };
        Self(code as u16)
    }

    pub fn residue(&self) -> u8 {
        (self.0 & RESIDUE_MASK) as u8 + b'A'
    }

    pub fn mods(&self) -> u16 {
        self.0 >> RESIDUE_BITS
    }

    pub fn is_modified(&self) -> bool {
        self.mods() != 0
    }

    pub fn has(&self, id: usize) -> bool {
        id < MAX_AA_MODS && self.mods() & (1 << id) != 0
    }

    pub fn with(self, id: usize) -> Self {
        Self(self.0 | (1 << (id as u16 + RESIDUE_BITS)))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
/// A mass shift that may be applied to a set of residues
pub struct AaMod {
    /// Printed after each modified residue
    pub symbol: char,
    pub mass_change: f64,
    /// Residues this modification can be placed on, e.g. `"STY"`
    pub residues: String,
}

impl AaMod {
    pub fn applies_to(&self, residue: u8) -> bool {
        self.residues.as_bytes().contains(&residue)
    }
}

/// Ordered collection of modifications; the position of a modification
/// is its identifier inside a [`ModifiedResidue`]
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ModTable {
    mods: Vec<AaMod>,
}

impl ModTable {
    pub fn new(mods: Vec<AaMod>) -> Result<Self> {
        if mods.len() > MAX_AA_MODS {
            return Err(Error::Configuration(format!(
                "at most {} modifications are supported, {} were given",
                MAX_AA_MODS,
                mods.len()
            )));
        }
        for m in &mods {
            if m.residues.is_empty() || !m.residues.bytes().all(|r| r.is_ascii_uppercase()) {
                return Err(Error::Configuration(format!(
                    "invalid residues `{}` for modification `{}`",
                    m.residues, m.symbol
                )));
            }
            if !m.mass_change.is_finite() {
                return Err(Error::Configuration(format!(
                    "invalid mass change for modification `{}`",
                    m.symbol
                )));
            }
        }
        Ok(Self { mods })
    }

    pub fn get(&self, id: usize) -> Option<&AaMod> {
        self.mods.get(id)
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &AaMod)> {
        self.mods.iter().enumerate()
    }

    /// Render a modified sequence, e.g. `PEPT*IDE`
    pub fn render(&self, overlay: &[ModifiedResidue]) -> String {
        let mut s = String::with_capacity(overlay.len() * 2);
        for residue in overlay {
            s.push(residue.residue() as char);
            for (id, m) in self.iter() {
                if residue.has(id) {
                    s.push(m.symbol);
                }
            }
        }
        s
    }
}
