use crate::constraint::PeptideConstraint;
use crate::fasta::{self, Record};
use crate::generator::CandidateGenerator;
use crate::peptide::Peptide;
use crate::sorter::{SortOrder, Sorter};
use crate::{Error, Result};
use fnv::FnvHashMap;
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// A string field of a protein: either owned, or a span of the
/// memory-mapped container backing the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Owned(Arc<str>),
    Mapped(Range<usize>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Protein {
    /// Only the location of the record is known
    Light { offset: u64, ordinal: u32 },
    /// Fully materialized
    Heavy {
        id: Field,
        annotation: Field,
        sequence: Field,
        offset: u64,
        ordinal: u32,
    },
}

impl Protein {
    pub fn ordinal(&self) -> u32 {
        match self {
            Protein::Light { ordinal, .. } | Protein::Heavy { ordinal, .. } => *ordinal,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            Protein::Light { offset, .. } | Protein::Heavy { offset, .. } => *offset,
        }
    }

    pub fn is_light(&self) -> bool {
        matches!(self, Protein::Light { .. })
    }

    fn owned(record: Record, ordinal: u32) -> Self {
        Protein::Heavy {
            id: Field::Owned(record.id.into()),
            annotation: Field::Owned(record.annotation.into()),
            sequence: Field::Owned(record.sequence.into()),
            offset: record.offset,
            ordinal,
        }
    }
}

/// Random access to the bytes a [`Database`] was parsed from
pub trait Backing: Send + Sync + std::fmt::Debug {
    fn path(&self) -> &Path;

    /// Resolve a field of a heavy protein
    fn text<'a>(&'a self, field: &'a Field) -> &'a str;

    /// Re-read the record at `offset`, producing a heavy protein
    fn promote(&self, offset: u64, ordinal: u32) -> Result<Protein>;
}

/// A text FASTA file; promotion performs an owned read
#[derive(Debug)]
pub struct TextBacking {
    path: PathBuf,
}

impl Backing for TextBacking {
    fn path(&self) -> &Path {
        &self.path
    }

    fn text<'a>(&'a self, field: &'a Field) -> &'a str {
        match field {
            Field::Owned(s) => s,
            Field::Mapped(_) => "",
        }
    }

    fn promote(&self, offset: u64, ordinal: u32) -> Result<Protein> {
        let record = fasta::read_record_at(&self.path, offset)?;
        Ok(Protein::owned(record, ordinal))
    }
}

/// A compiled container mapped into memory; fields borrow from the mapping
#[derive(Debug)]
pub struct MappedBacking {
    path: PathBuf,
    map: Mmap,
}

impl Backing for MappedBacking {
    fn path(&self) -> &Path {
        &self.path
    }

    fn text<'a>(&'a self, field: &'a Field) -> &'a str {
        match field {
            Field::Owned(s) => s,
            // Spans were validated as UTF-8 when the container was parsed
            Field::Mapped(range) => self
                .map
                .get(range.clone())
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .unwrap_or_default(),
        }
    }

    fn promote(&self, offset: u64, ordinal: u32) -> Result<Protein> {
        let record = fasta::read_binary_record(&self.map, offset as usize, &self.path)?;
        Ok(Protein::Heavy {
            id: Field::Mapped(record.id),
            annotation: Field::Mapped(record.annotation),
            sequence: Field::Mapped(record.sequence),
            offset,
            ordinal,
        })
    }
}

/// Borrowed (or, for light proteins, freshly read) view of a protein
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProteinView<'a> {
    pub id: Cow<'a, str>,
    pub annotation: Cow<'a, str>,
    pub sequence: Cow<'a, str>,
    pub offset: u64,
    pub ordinal: u32,
}

/// A collection of proteins with stable ordinals
#[derive(Debug)]
pub struct Database {
    backing: Box<dyn Backing>,
    proteins: Vec<Protein>,
    ids: OnceLock<FnvHashMap<String, u32>>,
    light: bool,
}

impl Database {
    /// Parse a text FASTA file. With `light` set only record offsets are
    /// kept, and sequences are re-read on demand
    pub fn from_fasta<P: AsRef<Path>>(path: P, light: bool) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let mut proteins = Vec::new();
        for (ordinal, record) in fasta::FastaReader::open(path)?.enumerate() {
            let record = record?;
            let ordinal = ordinal as u32;
            proteins.push(match light {
                true => Protein::Light {
                    offset: record.offset,
                    ordinal,
                },
                false => Protein::owned(record, ordinal),
            });
        }
        log::info!(
            "read {} proteins from `{}`",
            proteins.len(),
            path.display()
        );

        Ok(Arc::new(Database {
            backing: Box::new(TextBacking { path: path.into() }),
            proteins,
            ids: OnceLock::new(),
            light,
        }))
    }

    /// Build a database from FASTA text already in memory
    pub fn parse(contents: &str) -> Result<Arc<Self>> {
        let proteins = fasta::parse_str(contents)?
            .into_iter()
            .enumerate()
            .map(|(ordinal, record)| Protein::owned(record, ordinal as u32))
            .collect();
        Ok(Arc::new(Database {
            backing: Box::new(TextBacking {
                path: "<memory>".into(),
            }),
            proteins,
            ids: OnceLock::new(),
            light: false,
        }))
    }

    /// Memory-map a compiled container produced by [`Database::compile`]
    pub fn from_binary<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::input(path, e.to_string()))?;
        // SAFETY: the container is only ever read through this mapping and is
        // never modified after it has been compiled
        let map = unsafe { Mmap::map(&file) }?;

        let proteins = fasta::parse_binary(&map, path)?
            .into_iter()
            .enumerate()
            .map(|(ordinal, record)| Protein::Heavy {
                id: Field::Mapped(record.id),
                annotation: Field::Mapped(record.annotation),
                sequence: Field::Mapped(record.sequence),
                offset: record.offset as u64,
                ordinal: ordinal as u32,
            })
            .collect::<Vec<_>>();
        log::debug!(
            "mapped {} proteins from `{}`",
            proteins.len(),
            path.display()
        );

        Ok(Arc::new(Database {
            backing: Box::new(MappedBacking {
                path: path.into(),
                map,
            }),
            proteins,
            ids: OnceLock::new(),
            light: false,
        }))
    }

    /// Compile a text FASTA file into `directory`, returning the path of
    /// the compiled container
    pub fn compile<P: AsRef<Path>, Q: AsRef<Path>>(fasta: P, directory: Q) -> Result<PathBuf> {
        let (path, count) = fasta::compile(fasta, directory)?;
        log::debug!("compiled {} proteins", count);
        Ok(path)
    }

    pub fn path(&self) -> &Path {
        self.backing.path()
    }

    pub fn is_light(&self) -> bool {
        self.light
    }

    pub fn len(&self) -> usize {
        self.proteins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proteins.is_empty()
    }

    pub fn proteins(&self) -> &[Protein] {
        &self.proteins
    }

    pub fn protein_at(&self, ordinal: u32) -> Option<&Protein> {
        self.proteins.get(ordinal as usize)
    }

    /// Look up a protein by identifier. The lookup table is built on the
    /// first call
    pub fn protein_by_id(&self, id: &str) -> Option<&Protein> {
        let ids = self.ids.get_or_init(|| {
            let mut ids = FnvHashMap::default();
            for protein in &self.proteins {
                match self.view(protein) {
                    Ok(view) => {
                        ids.entry(view.id.into_owned())
                            .or_insert_with(|| protein.ordinal());
                    }
                    Err(e) => log::warn!("failed to read protein {}: {}", protein.ordinal(), e),
                }
            }
            ids
        });
        ids.get(id).and_then(|&ordinal| self.protein_at(ordinal))
    }

    /// Explicitly promote a protein, returning a new heavy value
    pub fn heavy(&self, protein: &Protein) -> Result<Protein> {
        match protein {
            Protein::Light { offset, ordinal } => self.backing.promote(*offset, *ordinal),
            heavy => Ok(heavy.clone()),
        }
    }

    pub fn view<'a>(&'a self, protein: &'a Protein) -> Result<ProteinView<'a>> {
        match protein {
            Protein::Heavy {
                id,
                annotation,
                sequence,
                offset,
                ordinal,
            } => Ok(ProteinView {
                id: Cow::Borrowed(self.backing.text(id)),
                annotation: Cow::Borrowed(self.backing.text(annotation)),
                sequence: Cow::Borrowed(self.backing.text(sequence)),
                offset: *offset,
                ordinal: *ordinal,
            }),
            Protein::Light { .. } => {
                let heavy = self.heavy(protein)?;
                let view = self.view(&heavy)?;
                Ok(ProteinView {
                    id: Cow::Owned(view.id.into_owned()),
                    annotation: Cow::Owned(view.annotation.into_owned()),
                    sequence: Cow::Owned(view.sequence.into_owned()),
                    offset: view.offset,
                    ordinal: view.ordinal,
                })
            }
        }
    }

    fn missing(&self, ordinal: u32) -> Error {
        Error::input(
            self.path(),
            format!(
                "protein ordinal {} is out of range ({} proteins)",
                ordinal,
                self.len()
            ),
        )
    }

    /// Full residue sequence of the protein with the given ordinal
    pub fn sequence(&self, ordinal: u32) -> Result<Cow<'_, str>> {
        let protein = self.protein_at(ordinal).ok_or_else(|| self.missing(ordinal))?;
        Ok(self.view(protein)?.sequence)
    }

    pub fn id(&self, ordinal: u32) -> Result<Cow<'_, str>> {
        let protein = self.protein_at(ordinal).ok_or_else(|| self.missing(ordinal))?;
        Ok(self.view(protein)?.id)
    }

    /// Residues `start..start + length` (0-based) of a protein
    pub fn subsequence(&self, ordinal: u32, start: usize, length: usize) -> Result<Cow<'_, str>> {
        let out_of_range = || {
            Error::input(
                self.path(),
                format!(
                    "span {}..{} is outside of protein {}",
                    start,
                    start + length,
                    ordinal
                ),
            )
        };
        match self.sequence(ordinal)? {
            Cow::Borrowed(s) => s
                .get(start..start + length)
                .map(Cow::Borrowed)
                .ok_or_else(out_of_range),
            Cow::Owned(s) => s
                .get(start..start + length)
                .map(|s| Cow::Owned(s.to_string()))
                .ok_or_else(out_of_range),
        }
    }

    /// Digest every protein under `constraint`. When the constraint asks for
    /// unique peptides, sequence-identical peptides are merged and the
    /// result is ordered by mass
    pub fn peptides(&self, constraint: &Arc<PeptideConstraint>) -> Result<Vec<Peptide>> {
        let mut peptides = Vec::new();
        for protein in &self.proteins {
            let view = self.view(protein)?;
            let generator =
                CandidateGenerator::new(view.sequence.as_bytes(), view.ordinal, constraint.clone())?;
            peptides.extend(generator);
        }
        log::trace!("generated {} candidate peptides", peptides.len());

        if constraint.unique_peptides {
            peptides = Sorter::new(SortOrder::Mass, true).sort(self, peptides)?;
        }
        Ok(peptides)
    }
}
