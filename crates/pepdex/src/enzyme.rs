use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;

use crate::Error;

/// A set of residues flanking one side of a cleavage boundary
///
/// An inclusion set matches residues that are members, an exclusion set
/// matches residues that are not. An empty exclusion set matches anything
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResidueSet {
    mask: u32,
    inclusion: bool,
}

impl ResidueSet {
    pub const ANY: ResidueSet = ResidueSet {
        mask: 0,
        inclusion: false,
    };

    pub const fn including(residues: &[u8]) -> Self {
        Self {
            mask: Self::mask(residues),
            inclusion: true,
        }
    }

    pub const fn excluding(residues: &[u8]) -> Self {
        Self {
            mask: Self::mask(residues),
            inclusion: false,
        }
    }

    const fn mask(residues: &[u8]) -> u32 {
        let mut mask = 0;
        let mut i = 0;
        while i < residues.len() {
            if residues[i].is_ascii_uppercase() {
                mask |= 1 << (residues[i] - b'A');
            }
            i += 1;
        }
        mask
    }

    #[inline]
    pub fn matches(&self, residue: u8) -> bool {
        let member = residue.is_ascii_uppercase() && self.mask & (1 << (residue - b'A')) != 0;
        member == self.inclusion
    }
}

impl std::fmt::Display for ResidueSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.mask == 0 {
            return match self.inclusion {
                false => f.write_str("[X]"),
                true => f.write_str("{X}"),
            };
        }
        let (open, close) = match self.inclusion {
            true => ('[', ']'),
            false => ('{', '}'),
        };
        f.write_char(open)?;
        for residue in b'A'..=b'Z' {
            if self.mask & (1 << (residue - b'A')) != 0 {
                f.write_char(residue as char)?;
            }
        }
        f.write_char(close)
    }
}

/// Decides whether the boundary between two residues may be cleaved
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CleavageRule {
    /// Residue immediately before (N-terminal to) the boundary
    pub pre: ResidueSet,
    /// Residue immediately after (C-terminal to) the boundary
    pub post: ResidueSet,
}

impl CleavageRule {
    pub const fn new(pre: ResidueSet, post: ResidueSet) -> Self {
        Self { pre, post }
    }

    #[inline]
    pub fn is_cleavage(&self, pre: u8, post: u8) -> bool {
        self.pre.matches(pre) && self.post.matches(post)
    }
}

impl std::fmt::Display for CleavageRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.pre, self.post)
    }
}

impl FromStr for CleavageRule {
    type Err = Error;

    /// Parse a rule of the form `[KR]|{P}`: square brackets list required
    /// residues, braces list prohibited residues, and `[X]` allows any residue
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::Configuration(format!(
                "custom enzyme syntax `{}` is incorrect. Must be of the form [AZ]|[AZ] \
                 or with [] replaced by {{}}. AZ is a list of residues (letters A-Z) \
                 required [] or prohibited {{}}. Use [X] to indicate that any residue is legal.",
                s
            ))
        };

        let re = Regex::new(r"^([\[{])([A-Z]+)([\]}])\|([\[{])([A-Z]+)([\]}])$")
            .map_err(|e| Error::Configuration(e.to_string()))?;
        let caps = re.captures(s.trim()).ok_or_else(invalid)?;

        let side = |open: &str, residues: &str, close: &str| match (open, close) {
            ("[", "]") if residues == "X" => Some(ResidueSet::ANY),
            // Nothing may flank this side
            ("{", "}") if residues == "X" => Some(ResidueSet::including(&[])),
            ("[", "]") => Some(ResidueSet::including(residues.as_bytes())),
            ("{", "}") => Some(ResidueSet::excluding(residues.as_bytes())),
            _ => None,
        };

        let pre = side(&caps[1], &caps[2], &caps[3]).ok_or_else(invalid)?;
        let post = side(&caps[4], &caps[5], &caps[6]).ok_or_else(invalid)?;
        Ok(CleavageRule { pre, post })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Enzyme {
    NoEnzyme,
    Trypsin,
    TrypsinP,
    Chymotrypsin,
    Elastase,
    Clostripain,
    CyanogenBromide,
    Iodosobenzoate,
    ProlineEndopeptidase,
    StaphProtease,
    AspN,
    LysC,
    LysN,
    ArgC,
    GluC,
    PepsinA,
    ModifiedChymotrypsin,
    ElastaseTrypsinChymotrypsin,
    Lysarginase,
    Custom(CleavageRule),
}

const NAMES: [(&str, Enzyme); 19] = [
    ("no-enzyme", Enzyme::NoEnzyme),
    ("trypsin", Enzyme::Trypsin),
    ("trypsin/p", Enzyme::TrypsinP),
    ("chymotrypsin", Enzyme::Chymotrypsin),
    ("elastase", Enzyme::Elastase),
    ("clostripain", Enzyme::Clostripain),
    ("cyanogen-bromide", Enzyme::CyanogenBromide),
    ("iodosobenzoate", Enzyme::Iodosobenzoate),
    ("proline-endopeptidase", Enzyme::ProlineEndopeptidase),
    ("staph-protease", Enzyme::StaphProtease),
    ("asp-n", Enzyme::AspN),
    ("lys-c", Enzyme::LysC),
    ("lys-n", Enzyme::LysN),
    ("arg-c", Enzyme::ArgC),
    ("glu-c", Enzyme::GluC),
    ("pepsin-a", Enzyme::PepsinA),
    ("modified-chymotrypsin", Enzyme::ModifiedChymotrypsin),
    (
        "elastase-trypsin-chymotrypsin",
        Enzyme::ElastaseTrypsinChymotrypsin,
    ),
    ("lysarginase", Enzyme::Lysarginase),
];

impl Enzyme {
    /// The cleavage rule for this enzyme, or `None` if every boundary is legal
    pub fn rule(&self) -> Option<CleavageRule> {
        use ResidueSet as R;
        let not_p = R::excluding(b"P");
        let rule = match self {
            Enzyme::NoEnzyme => return None,
            Enzyme::Trypsin => CleavageRule::new(R::including(b"KR"), not_p),
            Enzyme::TrypsinP => CleavageRule::new(R::including(b"KR"), R::ANY),
            Enzyme::Chymotrypsin => CleavageRule::new(R::including(b"FWY"), not_p),
            Enzyme::Elastase => CleavageRule::new(R::including(b"ALIV"), not_p),
            Enzyme::Clostripain => CleavageRule::new(R::including(b"R"), R::ANY),
            Enzyme::CyanogenBromide => CleavageRule::new(R::including(b"M"), R::ANY),
            Enzyme::Iodosobenzoate => CleavageRule::new(R::including(b"W"), R::ANY),
            Enzyme::ProlineEndopeptidase => CleavageRule::new(R::including(b"P"), R::ANY),
            Enzyme::StaphProtease => CleavageRule::new(R::including(b"E"), R::ANY),
            Enzyme::AspN => CleavageRule::new(R::ANY, R::including(b"D")),
            Enzyme::LysC => CleavageRule::new(R::including(b"K"), not_p),
            Enzyme::LysN => CleavageRule::new(R::ANY, R::including(b"K")),
            Enzyme::ArgC => CleavageRule::new(R::including(b"R"), not_p),
            Enzyme::GluC => CleavageRule::new(R::including(b"DE"), not_p),
            Enzyme::PepsinA => CleavageRule::new(R::including(b"FL"), not_p),
            Enzyme::ModifiedChymotrypsin => CleavageRule::new(R::including(b"FLWY"), not_p),
            Enzyme::ElastaseTrypsinChymotrypsin => {
                CleavageRule::new(R::including(b"ALIVKRWFY"), not_p)
            }
            Enzyme::Lysarginase => CleavageRule::new(R::ANY, R::including(b"KR")),
            Enzyme::Custom(rule) => *rule,
        };
        Some(rule)
    }

    /// Is the boundary between `pre` and `post` legal for this enzyme?
    #[inline]
    pub fn is_cleavage(&self, pre: u8, post: u8) -> bool {
        match self.rule() {
            Some(rule) => rule.is_cleavage(pre, post),
            None => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Enzyme::Custom(_) => "custom-enzyme",
            _ => NAMES
                .iter()
                .find(|(_, e)| e == self)
                .map(|(name, _)| *name)
                .unwrap_or("custom-enzyme"),
        }
    }
}

impl Default for Enzyme {
    fn default() -> Self {
        Self::Trypsin
    }
}

impl std::fmt::Display for Enzyme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Enzyme::Custom(rule) => write!(f, "{}", rule),
            _ => f.write_str(self.name()),
        }
    }
}

impl FromStr for Enzyme {
    type Err = Error;

    /// Accepts either an enzyme name or a custom cleavage rule
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((_, enzyme)) = NAMES.iter().find(|(name, _)| name.eq_ignore_ascii_case(s)) {
            return Ok(*enzyme);
        }
        if s.starts_with('[') || s.starts_with('{') {
            return s.parse::<CleavageRule>().map(Enzyme::Custom);
        }
        Err(Error::Configuration(format!("unknown enzyme `{}`", s)))
    }
}

impl TryFrom<String> for Enzyme {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Enzyme> for String {
    fn from(value: Enzyme) -> Self {
        value.to_string()
    }
}

/// How many ends of a candidate must fall on an enzyme-legal boundary.
/// Ordered from strictest to most permissive
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Digestion {
    Full,
    Partial,
    NonSpecific,
}

impl Digestion {
    /// Does an occurrence with the given specificity satisfy this digestion?
    pub fn accepts(&self, specificity: Specificity) -> bool {
        match self {
            Digestion::Full => specificity == Specificity::Full,
            Digestion::Partial => specificity != Specificity::NonSpecific,
            Digestion::NonSpecific => true,
        }
    }
}

impl Default for Digestion {
    fn default() -> Self {
        Self::Full
    }
}

impl std::fmt::Display for Digestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Digestion::Full => f.write_str("full-digest"),
            Digestion::Partial => f.write_str("partial-digest"),
            Digestion::NonSpecific => f.write_str("non-specific-digest"),
        }
    }
}

impl FromStr for Digestion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "full-digest" | "full" => Ok(Digestion::Full),
            "partial-digest" | "partial" => Ok(Digestion::Partial),
            "non-specific-digest" | "non-specific" => Ok(Digestion::NonSpecific),
            _ => Err(Error::Configuration(format!("unknown digestion `{}`", s))),
        }
    }
}

impl TryFrom<String> for Digestion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digestion> for String {
    fn from(value: Digestion) -> Self {
        value.to_string()
    }
}

/// Which ends of one peptide occurrence fall on an enzyme-legal boundary.
/// Protein termini always count as legal
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Serialize)]
pub enum Specificity {
    /// Both ends
    Full,
    /// Only the N-terminal end
    Nterm,
    /// Only the C-terminal end
    Cterm,
    /// Neither end
    NonSpecific,
}

impl Specificity {
    pub fn new(nterm: bool, cterm: bool) -> Self {
        match (nterm, cterm) {
            (true, true) => Specificity::Full,
            (true, false) => Specificity::Nterm,
            (false, true) => Specificity::Cterm,
            (false, false) => Specificity::NonSpecific,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Specificity::Full => 0,
            Specificity::Nterm => 1,
            Specificity::Cterm => 2,
            Specificity::NonSpecific => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Specificity::Full),
            1 => Some(Specificity::Nterm),
            2 => Some(Specificity::Cterm),
            3 => Some(Specificity::NonSpecific),
            _ => None,
        }
    }
}
