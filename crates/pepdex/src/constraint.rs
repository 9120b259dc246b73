use crate::enzyme::{CleavageRule, Digestion, Enzyme};
use crate::mass::MassType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Peptide lengths are stored in a single byte on disk
pub const MAX_PEPTIDE_LENGTH: usize = 255;

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
/// Constraint values as supplied by the user; anything left out falls back
/// to a default in [`Builder::make_parameters`]
pub struct Builder {
    /// Enzyme name, e.g. `trypsin`, `asp-n`, `no-enzyme`
    pub enzyme: Option<Enzyme>,
    /// Custom cleavage rule such as `[KR]|{P}`. Overrides `enzyme`
    pub custom_enzyme: Option<String>,
    /// `full-digest`, `partial-digest` or `non-specific-digest`
    pub digestion: Option<Digestion>,
    /// Inclusive
    pub min_mass: Option<f64>,
    /// Inclusive
    pub max_mass: Option<f64>,
    /// Inclusive
    pub min_length: Option<usize>,
    /// Inclusive
    pub max_length: Option<usize>,
    /// Number of enzyme-legal boundaries allowed inside a peptide
    pub missed_cleavages: Option<u8>,
    pub mass_type: Option<MassType>,
    /// Collapse sequence-identical peptides into one record
    pub unique_peptides: Option<bool>,
}

impl Builder {
    pub fn make_parameters(self) -> Result<PeptideConstraint> {
        let mut enzyme = self.enzyme.unwrap_or_default();
        if let Some(rule) = self.custom_enzyme.filter(|s| !s.trim().is_empty()) {
            enzyme = Enzyme::Custom(rule.parse::<CleavageRule>()?);
        }

        let mut digestion = self.digestion.unwrap_or_default();
        if enzyme == Enzyme::NoEnzyme && digestion != Digestion::NonSpecific {
            log::warn!(
                "`no-enzyme` was requested with `{}`; using `{}` instead",
                digestion,
                Digestion::NonSpecific
            );
            digestion = Digestion::NonSpecific;
        }

        let constraint = PeptideConstraint {
            enzyme,
            digestion,
            min_mass: self.min_mass.unwrap_or(200.0),
            max_mass: self.max_mass.unwrap_or(7200.0),
            min_length: self.min_length.unwrap_or(6),
            max_length: self.max_length.unwrap_or(50),
            missed_cleavages: self.missed_cleavages.unwrap_or(0),
            mass_type: self.mass_type.unwrap_or_default(),
            unique_peptides: self.unique_peptides.unwrap_or(true),
        };
        constraint.validate()?;
        Ok(constraint)
    }
}

/// Digestion, length and mass rules that every candidate peptide must
/// satisfy. Immutable once built, and shared through an [`Arc`]
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PeptideConstraint {
    pub enzyme: Enzyme,
    pub digestion: Digestion,
    pub min_mass: f64,
    pub max_mass: f64,
    pub min_length: usize,
    pub max_length: usize,
    pub missed_cleavages: u8,
    pub mass_type: MassType,
    pub unique_peptides: bool,
}

impl Default for PeptideConstraint {
    fn default() -> Self {
        PeptideConstraint {
            enzyme: Enzyme::Trypsin,
            digestion: Digestion::Full,
            min_mass: 200.0,
            max_mass: 7200.0,
            min_length: 6,
            max_length: 50,
            missed_cleavages: 0,
            mass_type: MassType::Average,
            unique_peptides: true,
        }
    }
}

impl PeptideConstraint {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_mass.is_finite() && self.max_mass.is_finite()) || self.min_mass < 0.0 {
            return Err(Error::Configuration(format!(
                "invalid mass range [{}, {}]",
                self.min_mass, self.max_mass
            )));
        }
        if self.min_mass > self.max_mass {
            return Err(Error::Configuration(format!(
                "min_mass ({}) is greater than max_mass ({})",
                self.min_mass, self.max_mass
            )));
        }
        if self.min_length == 0 {
            return Err(Error::Configuration("min_length must be at least 1".into()));
        }
        if self.min_length > self.max_length {
            return Err(Error::Configuration(format!(
                "min_length ({}) is greater than max_length ({})",
                self.min_length, self.max_length
            )));
        }
        if self.max_length > MAX_PEPTIDE_LENGTH {
            return Err(Error::Configuration(format!(
                "max_length ({}) exceeds the largest representable peptide length ({})",
                self.max_length, MAX_PEPTIDE_LENGTH
            )));
        }
        Ok(())
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[inline]
    pub fn contains_mass(&self, mass: f64) -> bool {
        mass >= self.min_mass && mass <= self.max_mass
    }

    #[inline]
    pub fn contains_length(&self, length: usize) -> bool {
        length >= self.min_length && length <= self.max_length
    }

    /// Missed-cleavage filtering is disabled for non-specific digestion
    pub fn limits_missed_cleavages(&self) -> bool {
        self.digestion != Digestion::NonSpecific
    }
}
