//! Enumerate every cleavage window of one protein that satisfies a
//! [`PeptideConstraint`].
//!
//! Generation happens in two phases: [`CandidateGenerator::new`] walks the
//! boundary lists once and buffers every qualifying `(start, length, mass)`
//! triple; iterating the generator then materializes one [`Peptide`] per
//! buffered candidate.

use crate::constraint::PeptideConstraint;
use crate::enzyme::{Digestion, Specificity};
use crate::peptide::{Peptide, PeptideSource};
use crate::{Error, Result};
use std::sync::Arc;

/// Hard ceiling on the number of candidates a single protein may produce
pub const MAX_PEPTIDES_PER_PROTEIN: usize = 10_000_000;

/// Upper bound on the number of windows with a length in
/// `min_length..=max_length` inside a protein of `protein_length` residues
pub fn count_max_peptides(protein_length: usize, min_length: usize, max_length: usize) -> usize {
    (min_length.max(1)..=max_length)
        .map(|len| (protein_length + 1).saturating_sub(len))
        .sum()
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Candidate {
    pub protein: u32,
    /// 0-based offset of the first residue
    pub start: usize,
    pub length: usize,
    pub mass: f64,
    /// Enzyme-legal boundaries strictly inside the window
    pub missed_cleavages: usize,
    pub specificity: Specificity,
}

impl Candidate {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn into_peptide(self) -> Peptide {
        Peptide::new(
            self.length as u8,
            self.mass,
            PeptideSource::new(self.protein, self.start as u32 + 1, self.specificity),
        )
    }
}

/// Slack applied to prefix-sum masses before the exact mass is computed
const PREFIX_MASS_SLACK: f64 = 1e-6;

/// Per-protein boundary bookkeeping shared by the enumeration passes
struct Boundaries<'c> {
    constraint: &'c PeptideConstraint,
    sequence: &'c [u8],
    protein: u32,
    /// Candidates this protein may produce before generation fails
    limit: usize,
    /// `mass[i]` is the summed residue mass of `sequence[..i]`. Only used to
    /// discard windows cheaply: the result depends on the window's offset
    mass: Vec<f64>,
    /// Is the boundary before residue `i` enzyme-legal? Protein termini always are
    legal: Vec<bool>,
    /// `cumulative[i]` counts legal boundaries at positions `1..=i`
    cumulative: Vec<usize>,
}

impl<'c> Boundaries<'c> {
    fn new(
        sequence: &'c [u8],
        protein: u32,
        constraint: &'c PeptideConstraint,
        limit: usize,
    ) -> Self {
        let n = sequence.len();
        let mut mass = Vec::with_capacity(n + 1);
        mass.push(0.0);
        for &residue in sequence {
            let last = mass[mass.len() - 1];
            mass.push(last + constraint.mass_type.residue(residue));
        }

        let legal = (0..=n)
            .map(|p| p == 0 || p == n || constraint.enzyme.is_cleavage(sequence[p - 1], sequence[p]))
            .collect::<Vec<_>>();

        let mut cumulative = Vec::with_capacity(n + 1);
        let mut count = 0;
        for (p, &is_legal) in legal.iter().enumerate() {
            if p > 0 && is_legal {
                count += 1;
            }
            cumulative.push(count);
        }

        Self {
            constraint,
            sequence,
            protein,
            limit,
            mass,
            legal,
            cumulative,
        }
    }

    fn len(&self) -> usize {
        self.legal.len() - 1
    }

    fn internal_cleavages(&self, start: usize, end: usize) -> usize {
        self.cumulative[end - 1] - self.cumulative[start]
    }

    fn positions(&self, legal: bool) -> Vec<usize> {
        (0..=self.len()).filter(|&p| self.legal[p] == legal).collect()
    }

    /// Pair every start in `starts` with every end in `ends` (both ascending)
    /// that forms an acceptable window. `keep_end` can veto individual ends
    fn enumerate<F>(
        &self,
        starts: &[usize],
        ends: &[usize],
        keep_end: F,
        out: &mut Vec<Candidate>,
    ) -> Result<()>
    where
        F: Fn(usize) -> bool,
    {
        let c = self.constraint;
        let limit_missed = c.limits_missed_cleavages();
        let water = c.mass_type.water();

        for &start in starts {
            let first = ends.partition_point(|&end| end <= start);
            for &end in &ends[first..] {
                let length = end - start;
                if length > c.max_length {
                    break;
                }
                let missed = self.internal_cleavages(start, end);
                if limit_missed && missed > c.missed_cleavages as usize {
                    break;
                }
                if length < c.min_length || !keep_end(end) {
                    continue;
                }

                let approx = self.mass[end] - self.mass[start] + water;
                if approx < c.min_mass - PREFIX_MASS_SLACK
                    || approx > c.max_mass + PREFIX_MASS_SLACK
                {
                    continue;
                }
                // Summed from the residues alone, so identical sequences
                // get bit-identical masses wherever they occur
                let mass = c.mass_type.sequence(&self.sequence[start..end]);
                if !c.contains_mass(mass) {
                    continue;
                }

                if out.len() >= self.limit {
                    return Err(Error::Configuration(format!(
                        "protein {} produces more than {} candidate peptides; \
                         tighten the length or mass constraints",
                        self.protein, self.limit
                    )));
                }
                out.push(Candidate {
                    protein: self.protein,
                    start,
                    length,
                    mass,
                    missed_cleavages: missed,
                    specificity: Specificity::new(self.legal[start], self.legal[end]),
                });
            }
        }
        Ok(())
    }
}

pub struct CandidateGenerator {
    constraint: Arc<PeptideConstraint>,
    candidates: Vec<Candidate>,
    cursor: usize,
}

impl CandidateGenerator {
    pub fn new(
        sequence: &[u8],
        protein: u32,
        constraint: Arc<PeptideConstraint>,
    ) -> Result<Self> {
        Self::with_limit(sequence, protein, constraint, MAX_PEPTIDES_PER_PROTEIN)
    }

    fn with_limit(
        sequence: &[u8],
        protein: u32,
        constraint: Arc<PeptideConstraint>,
        limit: usize,
    ) -> Result<Self> {
        let n = sequence.len();
        let mut candidates = Vec::new();

        if n > 0 {
            let b = Boundaries::new(sequence, protein, &constraint, limit);
            let all = (0..=n).collect::<Vec<_>>();
            match constraint.digestion {
                Digestion::Full => {
                    let cleavages = b.positions(true);
                    b.enumerate(&cleavages, &cleavages, |_| true, &mut candidates)?;
                }
                Digestion::Partial => {
                    let cleavages = b.positions(true);
                    // Any N-terminus, legal C-terminus
                    b.enumerate(&all, &cleavages, |_| true, &mut candidates)?;
                    // Legal N-terminus, any C-terminus. Windows ending on a legal
                    // boundary were already produced by the first pass
                    b.enumerate(&cleavages, &all, |end| !b.legal[end], &mut candidates)?;
                }
                Digestion::NonSpecific => {
                    b.enumerate(&all, &all, |_| true, &mut candidates)?;
                }
            }
        }

        log::trace!(
            "protein {}: {} candidates (at most {} by length alone)",
            protein,
            candidates.len(),
            count_max_peptides(n, constraint.min_length, constraint.max_length)
        );

        Ok(Self {
            constraint,
            candidates,
            cursor: 0,
        })
    }

    pub fn constraint(&self) -> &Arc<PeptideConstraint> {
        &self.constraint
    }

    /// Candidates that have not been materialized yet
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates[self.cursor..]
    }
}

impl Iterator for CandidateGenerator {
    type Item = Peptide;

    fn next(&mut self) -> Option<Self::Item> {
        let candidate = self.candidates.get(self.cursor)?;
        self.cursor += 1;
        Some(candidate.into_peptide())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.candidates.len() - self.cursor;
        (n, Some(n))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraint::Builder;
    use crate::enzyme::Enzyme;
    use crate::mass::MassType;
    use std::collections::HashSet;

    const PROTEIN: &str = "MRVLKFGGTSVANAERFLRVADILESNARQGQVAOOTVLSAPAKITNHLVAMIEKTISGQDALPNISDAERIFAELLTGLAAAQPGFPLAQLKTFWVDQEFAQIKHVLHGISLWLGQC";

    fn constraint(builder: Builder) -> Arc<PeptideConstraint> {
        Arc::new(builder.make_parameters().unwrap())
    }

    fn sequences(sequence: &str, c: Arc<PeptideConstraint>) -> Vec<String> {
        CandidateGenerator::new(sequence.as_bytes(), 0, c)
            .unwrap()
            .candidates()
            .iter()
            .map(|c| sequence[c.start..c.end()].to_string())
            .collect()
    }

    fn tryptic(min_length: usize, max_length: usize, missed: u8) -> Builder {
        Builder {
            enzyme: Some(Enzyme::Trypsin),
            min_length: Some(min_length),
            max_length: Some(max_length),
            min_mass: Some(0.0),
            max_mass: Some(100_000.0),
            missed_cleavages: Some(missed),
            ..Default::default()
        }
    }

    #[test]
    fn tryptic_scenario() {
        let c = constraint(Builder {
            min_length: Some(6),
            max_length: Some(20),
            min_mass: Some(500.0),
            max_mass: Some(1500.0),
            missed_cleavages: Some(0),
            mass_type: Some(MassType::Average),
            ..Default::default()
        });
        let generator = CandidateGenerator::new(PROTEIN.as_bytes(), 0, c).unwrap();
        let found = generator
            .candidates()
            .iter()
            .find(|c| &PROTEIN[c.start..c.end()] == "VADILESNAR")
            .copied()
            .unwrap();
        assert!((found.mass - 1087.2).abs() < 0.01);
        assert_eq!(found.specificity, Specificity::Full);

        let bytes = PROTEIN.as_bytes();
        for c in generator.candidates() {
            let seq = &bytes[c.start..c.end()];
            assert!((6..=20).contains(&seq.len()));
            assert!(c.mass >= 500.0 && c.mass <= 1500.0);
            assert_eq!(Peptide::missed_cleavages(seq, &Enzyme::Trypsin), 0);
            assert!(c.start == 0 || Enzyme::Trypsin.is_cleavage(bytes[c.start - 1], bytes[c.start]));
            assert!(c.end() == bytes.len() || Enzyme::Trypsin.is_cleavage(bytes[c.end() - 1], bytes[c.end()]));
        }
    }

    #[test]
    fn full_digest() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        assert_eq!(
            sequences(sequence, constraint(tryptic(1, 50, 0))),
            vec!["MADEEK", "LPPGWEK", "R", "MSR", "SSGR", "VYYFNHITNASQWERPSGN"]
        );
    }

    #[test]
    fn missed_cleavages() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        let mut found = sequences(sequence, constraint(tryptic(1, 50, 1)));
        found.sort();
        let mut expected = vec![
            "MADEEK",
            "LPPGWEK",
            "R",
            "MSR",
            "SSGR",
            "VYYFNHITNASQWERPSGN",
            "MADEEKLPPGWEK",
            "LPPGWEKR",
            "RMSR",
            "MSRSSGR",
            "SSGRVYYFNHITNASQWERPSGN",
        ];
        expected.sort();
        assert_eq!(found, expected);

        let generator = CandidateGenerator::new(sequence.as_bytes(), 0, constraint(tryptic(1, 50, 2)))
            .unwrap();
        assert!(generator.candidates().iter().all(|c| c.missed_cleavages <= 2));
        assert_eq!(generator.candidates().iter().filter(|c| c.missed_cleavages == 2).count(), 4);
    }

    #[test]
    fn partial_digest() {
        let sequence = "AAKBBRCC";
        let mut builder = tryptic(1, 8, 0);
        builder.digestion = Some(Digestion::Partial);
        let generator = CandidateGenerator::new(sequence.as_bytes(), 0, constraint(builder)).unwrap();

        let windows = generator
            .candidates()
            .iter()
            .map(|c| (c.start, c.length))
            .collect::<Vec<_>>();
        let unique = windows.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), windows.len());

        for c in generator.candidates() {
            assert_ne!(c.specificity, Specificity::NonSpecific);
            assert_eq!(c.missed_cleavages, 0);
        }
        // "AAK" is fully specific, "AKB" has neither end legal
        let seqs = sequences(sequence, {
            let mut b = tryptic(1, 8, 0);
            b.digestion = Some(Digestion::Partial);
            constraint(b)
        });
        assert!(seqs.contains(&"AAK".to_string()));
        assert!(seqs.contains(&"BB".to_string()));
        assert!(seqs.contains(&"CC".to_string()));
        assert!(seqs.contains(&"C".to_string()));
        assert!(!seqs.contains(&"AKB".to_string()));
        assert!(!seqs.contains(&"AKBBR".to_string()));
    }

    #[test]
    fn non_specific_digest() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGNW";
        let mut builder = tryptic(5, 7, 0);
        builder.digestion = Some(Digestion::NonSpecific);
        let found = sequences(sequence, constraint(builder));
        assert_eq!(found.len(), count_max_peptides(sequence.len(), 5, 7));

        let expected = (5..=7)
            .flat_map(|w| sequence.as_bytes().windows(w).map(|s| std::str::from_utf8(s).unwrap().to_string()))
            .collect::<HashSet<_>>();
        assert_eq!(found.into_iter().collect::<HashSet<_>>(), expected);
    }

    #[test]
    fn custom_enzyme() {
        let builder = Builder {
            custom_enzyme: Some("[MLK]|{P}".into()),
            min_length: Some(4),
            max_length: Some(50),
            min_mass: Some(0.0),
            ..Default::default()
        };
        let bytes = PROTEIN.as_bytes();
        let generator = CandidateGenerator::new(bytes, 0, constraint(builder)).unwrap();
        assert!(generator.candidates().len() > 0);
        for c in generator.candidates() {
            if c.start > 0 {
                assert!(b"MLK".contains(&bytes[c.start - 1]));
                assert_ne!(bytes[c.start], b'P');
            }
            if c.end() < bytes.len() {
                assert!(b"MLK".contains(&bytes[c.end() - 1]));
            }
        }
    }

    #[test]
    fn lazy_materialization() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        let mut generator = CandidateGenerator::new(sequence.as_bytes(), 7, constraint(tryptic(1, 50, 0)))
            .unwrap();
        assert_eq!(generator.size_hint(), (6, Some(6)));
        let first = generator.next().unwrap();
        assert_eq!(first.length(), 6);
        assert_eq!(first.sources()[0], PeptideSource::new(7, 1, Specificity::Full));
        assert_eq!(generator.candidates().len(), 5);
        assert_eq!(generator.count(), 5);
    }

    #[test]
    fn peptide_ceiling() {
        assert_eq!(count_max_peptides(10, 1, 3), 10 + 9 + 8);
        assert_eq!(count_max_peptides(2, 1, 5), 2 + 1);
        assert_eq!(count_max_peptides(0, 1, 5), 0);
    }

    #[test]
    fn candidate_limit() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        let mut builder = tryptic(5, 7, 0);
        builder.digestion = Some(Digestion::NonSpecific);
        let c = constraint(builder);
        let total = count_max_peptides(sequence.len(), 5, 7);

        let err = CandidateGenerator::with_limit(sequence.as_bytes(), 3, c.clone(), 10);
        assert!(matches!(err, Err(Error::Configuration(_))));

        let ok = CandidateGenerator::with_limit(sequence.as_bytes(), 3, c, total).unwrap();
        assert_eq!(ok.count(), total);
    }

    #[test]
    fn offset_independent_mass() {
        let prefixes = ["K", "GGK", "MADEEKLPPGWEK", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAK", "WWWYYR"];
        let c = constraint(tryptic(10, 10, 0));
        let masses = prefixes
            .iter()
            .map(|prefix| {
                let protein = format!("{}VADILESNAR", prefix);
                let generator = CandidateGenerator::new(protein.as_bytes(), 0, c.clone()).unwrap();
                let found = generator
                    .candidates()
                    .iter()
                    .find(|x| &protein[x.start..x.end()] == "VADILESNAR")
                    .copied()
                    .unwrap();
                found.mass.to_bits()
            })
            .collect::<HashSet<_>>();
        assert_eq!(masses.len(), 1);
    }

    #[test]
    fn empty_protein() {
        let generator = CandidateGenerator::new(b"", 0, constraint(tryptic(1, 50, 0))).unwrap();
        assert_eq!(generator.count(), 0);
    }
}
