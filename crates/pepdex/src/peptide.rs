use std::borrow::Cow;

use crate::{
    database::Database,
    enzyme::{Digestion, Enzyme, Specificity},
    modification::{ModTable, ModifiedResidue},
    Error, Result,
};

/// One occurrence of a peptide inside a protein
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeptideSource {
    /// Ordinal of the protein within its [`Database`]
    pub protein: u32,
    /// 1-based offset of the first residue within the protein
    pub start: u32,
    pub specificity: Specificity,
}

impl PeptideSource {
    pub fn new(protein: u32, start: u32, specificity: Specificity) -> Self {
        Self {
            protein,
            start,
            specificity,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
/// A candidate subsequence, backed by one or more [`PeptideSource`]s.
///
/// The residues themselves are never stored: they are resolved against the
/// [`Database`] through the first source
pub struct Peptide {
    length: u8,
    mass: f64,
    sources: Vec<PeptideSource>,
    overlay: Option<Vec<ModifiedResidue>>,
}

impl Peptide {
    pub fn new(length: u8, mass: f64, source: PeptideSource) -> Self {
        Self {
            length,
            mass,
            sources: vec![source],
            overlay: None,
        }
    }

    /// Reassemble a peptide from its serialized parts. `sources` must not be
    /// empty
    pub(crate) fn from_parts(
        length: u8,
        mass: f64,
        sources: Vec<PeptideSource>,
        overlay: Option<Vec<ModifiedResidue>>,
    ) -> Option<Self> {
        if sources.is_empty() {
            return None;
        }
        Some(Self {
            length,
            mass,
            sources,
            overlay,
        })
    }

    pub fn length(&self) -> usize {
        self.length as usize
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn sources(&self) -> &[PeptideSource] {
        &self.sources
    }

    pub fn overlay(&self) -> Option<&[ModifiedResidue]> {
        self.overlay.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn add_source(&mut self, source: PeptideSource) {
        self.sources.push(source);
    }

    /// Absorb the sources of a sequence-identical peptide
    pub fn merge(&mut self, other: Peptide) {
        self.sources.extend(other.sources);
    }

    pub(crate) fn normalize_sources(&mut self) {
        self.sources.sort_unstable();
        self.sources.dedup();
    }

    /// Does at least one occurrence satisfy `digestion`?
    pub fn satisfies(&self, digestion: Digestion) -> bool {
        self.sources.iter().any(|s| digestion.accepts(s.specificity))
    }

    /// Drop every occurrence that does not satisfy `digestion`. Returns false
    /// if no occurrence is left, in which case the peptide must be discarded
    pub(crate) fn restrict(&mut self, digestion: Digestion) -> bool {
        self.sources.retain(|s| digestion.accepts(s.specificity));
        !self.sources.is_empty()
    }

    /// Unmodified residue sequence, resolved through the first source
    pub fn sequence<'a>(&self, db: &'a Database) -> Result<Cow<'a, str>> {
        let source = self.sources[0];
        db.subsequence(
            source.protein,
            source.start.saturating_sub(1) as usize,
            self.length(),
        )
    }

    /// Sequence with modification symbols, e.g. `PEPM*IDE`
    pub fn modified_sequence(&self, db: &Database, mods: &ModTable) -> Result<String> {
        match &self.overlay {
            Some(overlay) => Ok(mods.render(overlay)),
            None => Ok(self.sequence(db)?.into_owned()),
        }
    }

    /// Identifiers of every protein this peptide occurs in
    pub fn protein_ids(&self, db: &Database) -> Result<Vec<String>> {
        self.sources
            .iter()
            .map(|s| db.id(s.protein).map(Cow::into_owned))
            .collect()
    }

    /// Number of enzyme-legal boundaries strictly inside `sequence`
    pub fn missed_cleavages(sequence: &[u8], enzyme: &Enzyme) -> usize {
        sequence
            .windows(2)
            .filter(|w| enzyme.is_cleavage(w[0], w[1]))
            .count()
    }

    /// Apply modification `id` of `mods` to the residue at `position`
    /// (0-based), returning a new peptide with the mass shifted accordingly
    pub fn modify(
        &self,
        sequence: &str,
        mods: &ModTable,
        position: usize,
        id: usize,
    ) -> Result<Peptide> {
        let m = mods
            .get(id)
            .ok_or_else(|| Error::Configuration(format!("unknown modification {}", id)))?;
        if sequence.len() != self.length() || position >= self.length() {
            return Err(Error::Configuration(format!(
                "cannot modify position {} of a {}-residue peptide",
                position,
                self.length()
            )));
        }

        let mut overlay = match &self.overlay {
            Some(overlay) => overlay.clone(),
            None => sequence.bytes().map(ModifiedResidue::new).collect(),
        };
        let residue = overlay[position];
        if !m.applies_to(residue.residue()) || residue.has(id) {
            return Err(Error::Configuration(format!(
                "modification `{}` cannot be placed on {} at position {}",
                m.symbol,
                residue.residue() as char,
                position
            )));
        }
        overlay[position] = residue.with(id);

        Ok(Peptide {
            length: self.length,
            mass: self.mass + m.mass_change,
            sources: self.sources.clone(),
            overlay: Some(overlay),
        })
    }

    /// Every singly-modified variant of this peptide
    pub fn variants(&self, sequence: &str, mods: &ModTable) -> Vec<Peptide> {
        let mut variants = Vec::new();
        for (id, m) in mods.iter() {
            for (position, residue) in sequence.bytes().enumerate() {
                if m.applies_to(residue) {
                    if let Ok(peptide) = self.modify(sequence, mods, position, id) {
                        variants.push(peptide);
                    }
                }
            }
        }
        variants
    }
}
