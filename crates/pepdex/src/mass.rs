use serde::{Deserialize, Serialize};

/// Monoisotopic mass of water
pub const H2O_MONO: f64 = 18.010564684;
/// Average mass of water
pub const H2O_AVERAGE: f64 = 18.01524;

/// Lightest and heaviest standard residues, used to bound the mass range
/// reachable by a given length range
pub const LIGHTEST_RESIDUE: f64 = 57.0;
pub const HEAVIEST_RESIDUE: f64 = 187.0;

/// Mass assigned to ambiguous residue codes (B, X, Z) and to anything
/// that is not an upper-case letter, so that they never pass a mass filter
pub const CATCH_ALL: f64 = 7000.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassType {
    Average,
    Mono,
}

impl Default for MassType {
    fn default() -> Self {
        Self::Average
    }
}

impl std::fmt::Display for MassType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MassType::Average => f.write_str("average"),
            MassType::Mono => f.write_str("mono"),
        }
    }
}

impl std::str::FromStr for MassType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "average" => Ok(MassType::Average),
            "mono" | "monoisotopic" => Ok(MassType::Mono),
            _ => Err(format!("unknown mass type `{}`", s)),
        }
    }
}

#[rustfmt::skip]
const AVERAGE: [f64; 26] = [
    71.0788,  // A
    CATCH_ALL, // B
    103.1388, // C
    115.0886, // D
    129.1155, // E
    147.1766, // F
    57.0519,  // G
    137.1411, // H
    113.1594, // I
    113.1594, // J
    128.1741, // K
    113.1594, // L
    131.1926, // M
    114.1038, // N
    114.1472, // O
    97.1167,  // P
    128.1307, // Q
    156.1875, // R
    87.0782,  // S
    101.1051, // T
    150.0388, // U
    99.1326,  // V
    186.2132, // W
    CATCH_ALL, // X
    163.1760, // Y
    CATCH_ALL, // Z
];

#[rustfmt::skip]
const MONO: [f64; 26] = [
    71.03711,  // A
    CATCH_ALL,  // B
    103.00919, // C
    115.02694, // D
    129.04259, // E
    147.06841, // F
    57.02146,  // G
    137.05891, // H
    113.08406, // I
    113.08406, // J
    128.09496, // K
    113.08406, // L
    131.04049, // M
    114.04293, // N
    114.07931, // O
    97.05276,  // P
    128.05858, // Q
    156.10111, // R
    87.03203,  // S
    101.04768, // T
    150.04344, // U
    99.06841,  // V
    186.07931, // W
    CATCH_ALL,  // X
    163.06333, // Y
    CATCH_ALL,  // Z
];

impl MassType {
    #[inline]
    fn table(&self) -> &'static [f64; 26] {
        match self {
            MassType::Average => &AVERAGE,
            MassType::Mono => &MONO,
        }
    }

    /// Mass of a single residue. Anything outside of `A..=Z` maps to the
    /// catch-all entry
    #[inline]
    pub fn residue(&self, residue: u8) -> f64 {
        match residue {
            b'A'..=b'Z' => self.table()[(residue - b'A') as usize],
            _ => CATCH_ALL,
        }
    }

    #[inline]
    pub fn water(&self) -> f64 {
        match self {
            MassType::Average => H2O_AVERAGE,
            MassType::Mono => H2O_MONO,
        }
    }

    /// Sum of residue masses plus one water
    pub fn sequence(&self, sequence: &[u8]) -> f64 {
        sequence.iter().map(|&r| self.residue(r)).sum::<f64>() + self.water()
    }
}
