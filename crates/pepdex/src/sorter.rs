use crate::database::Database;
use crate::peptide::Peptide;
use crate::Result;
use rayon::prelude::*;
use std::borrow::Cow;
use std::cmp::Ordering;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending mass, ties broken lexically
    Mass,
    /// Ascending length, ties broken by mass and then lexically
    Length,
    /// Lexical order of the residue sequence
    Lexical,
}

/// Orders a batch of peptides and, optionally, collapses sequence-identical
/// peptides into a single peptide carrying every source
#[derive(Copy, Clone, Debug)]
pub struct Sorter {
    pub order: SortOrder,
    pub unique: bool,
}

struct Keyed<'a> {
    sequence: Cow<'a, str>,
    peptide: Peptide,
}

impl<'a> Keyed<'a> {
    fn lexical(&self, other: &Self) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.peptide.overlay().cmp(&other.peptide.overlay()))
    }

    fn mass(&self, other: &Self) -> Ordering {
        self.peptide.mass().total_cmp(&other.peptide.mass())
    }

    /// Mass first, since it is cheap and highly discriminating
    fn same_peptide(&self, other: &Self) -> bool {
        self.mass(other) == Ordering::Equal && self.lexical(other) == Ordering::Equal
    }
}

impl Sorter {
    pub fn new(order: SortOrder, unique: bool) -> Self {
        Self { order, unique }
    }

    fn compare(&self, a: &Keyed, b: &Keyed) -> Ordering {
        match self.order {
            SortOrder::Mass => a.mass(b).then_with(|| a.lexical(b)),
            SortOrder::Length => a
                .peptide
                .length()
                .cmp(&b.peptide.length())
                .then_with(|| a.mass(b))
                .then_with(|| a.lexical(b)),
            SortOrder::Lexical => a.lexical(b).then_with(|| a.mass(b)),
        }
    }

    /// Sort `peptides`, resolving their sequences against `db`
    pub fn sort(&self, db: &Database, peptides: Vec<Peptide>) -> Result<Vec<Peptide>> {
        let mut keyed = peptides
            .into_iter()
            .map(|peptide| {
                Ok(Keyed {
                    sequence: peptide.sequence(db)?,
                    peptide,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Stable, so that sources keep their relative order within a run
        keyed.par_sort_by(|a, b| self.compare(a, b));

        if !self.unique {
            return Ok(keyed.into_iter().map(|k| k.peptide).collect());
        }

        let before = keyed.len();
        let mut merged: Vec<Keyed> = Vec::with_capacity(keyed.len());
        for k in keyed {
            match merged.last_mut() {
                Some(last) if last.same_peptide(&k) => last.peptide.merge(k.peptide),
                _ => merged.push(k),
            }
        }
        log::trace!("merged {} peptides into {}", before, merged.len());

        Ok(merged
            .into_iter()
            .map(|k| {
                let mut peptide = k.peptide;
                peptide.normalize_sources();
                peptide
            })
            .collect())
    }
}
