use crate::constraint::PeptideConstraint;
use crate::{Error, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CATALOG_FILE: &str = "crux_index_map";
pub const README_FILE: &str = "README";
pub const PEPTIDE_LIST_FILE: &str = "peptides.txt";
pub const BUCKET_PREFIX: &str = "crux_index_";

/// Slack used when matching a mass window against bucket boundaries
const EPSILON: f64 = 0.0001;

/// Informational header lines that carry no constraint
const DIRECTORY_KEY: &str = "CRUX index directory";
const CREATED_KEY: &str = "time created";

pub fn bucket_file(bin: usize) -> String {
    format!("{}{}", BUCKET_PREFIX, bin + 1)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
    pub file: String,
    pub start: f64,
    pub width: f64,
}

impl Bucket {
    pub fn end(&self) -> f64 {
        self.start + self.width
    }
}

/// The manifest of an index directory: the constraint the index was built
/// with, and the mass range covered by each bucket file
#[derive(Clone, Debug, PartialEq)]
pub struct Catalog {
    pub constraint: PeptideConstraint,
    pub bucket_width: f64,
    pub directory: PathBuf,
    pub created: String,
    pub buckets: Vec<Bucket>,
}

impl Catalog {
    pub fn render(&self) -> String {
        let c = &self.constraint;
        let mut s = String::new();
        let mut header = |key: &str, value: &dyn std::fmt::Display| {
            let _ = writeln!(s, "#\t{}: {}", key, value);
        };
        header("min_mass", &c.min_mass);
        header("max_mass", &c.max_mass);
        header("min_length", &c.min_length);
        header("max_length", &c.max_length);
        header("enzyme_type", &c.enzyme);
        header("digest_type", &c.digestion);
        header("missed_cleavages", &c.missed_cleavages);
        header("mass_type", &c.mass_type);
        header("unique_peptides", &c.unique_peptides);
        header(DIRECTORY_KEY, &self.directory.display());
        header(CREATED_KEY, &self.created);
        header("target_mass_range_for_index_file", &self.bucket_width);

        for bucket in &self.buckets {
            let _ = writeln!(s, "{}\t{}\t{}", bucket.file, bucket.start, bucket.width);
        }
        s
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Catalog> {
        let corrupt = |line: usize, reason: String| {
            Error::corrupt(path, format!("line {}: {}", line + 1, reason))
        };
        fn value<T: std::str::FromStr>(slot: &mut Option<T>, raw: &str) -> std::result::Result<(), String> {
            *slot = Some(raw.parse().map_err(|_| format!("invalid value `{}`", raw))?);
            Ok(())
        }

        let mut min_mass = None;
        let mut max_mass = None;
        let mut min_length = None;
        let mut max_length = None;
        let mut enzyme = None;
        let mut digestion = None;
        let mut missed_cleavages = None;
        let mut mass_type = None;
        let mut unique_peptides = None;
        let mut bucket_width = None;
        let mut directory = PathBuf::new();
        let mut created = String::new();
        let mut buckets = Vec::new();

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('#') {
                let (key, raw) = header
                    .split_once(':')
                    .ok_or_else(|| corrupt(idx, format!("malformed header `{}`", line)))?;
                let raw = raw.trim();
                let parsed = match key.trim() {
                    "min_mass" => value(&mut min_mass, raw),
                    "max_mass" => value(&mut max_mass, raw),
                    "min_length" => value(&mut min_length, raw),
                    "max_length" => value(&mut max_length, raw),
                    "enzyme_type" => value(&mut enzyme, raw),
                    "digest_type" => value(&mut digestion, raw),
                    "missed_cleavages" => value(&mut missed_cleavages, raw),
                    "mass_type" => value(&mut mass_type, raw),
                    "unique_peptides" => value(&mut unique_peptides, raw),
                    "target_mass_range_for_index_file" => value(&mut bucket_width, raw),
                    DIRECTORY_KEY => {
                        directory = raw.into();
                        Ok(())
                    }
                    CREATED_KEY => {
                        created = raw.into();
                        Ok(())
                    }
                    other => Err(format!("unknown header `{}`", other.trim())),
                };
                parsed.map_err(|reason| corrupt(idx, reason))?;
                continue;
            }

            let fields = line.split_whitespace().collect::<Vec<_>>();
            let bucket = match fields.as_slice() {
                [file, start, width] => match (start.parse::<f64>(), width.parse::<f64>()) {
                    (Ok(start), Ok(width)) if width > 0.0 => Bucket {
                        file: file.to_string(),
                        start,
                        width,
                    },
                    _ => return Err(corrupt(idx, format!("malformed bucket `{}`", line))),
                },
                _ => return Err(corrupt(idx, format!("malformed bucket `{}`", line))),
            };
            if let Some(last) = buckets.last() {
                let last: &Bucket = last;
                if bucket.start < last.start {
                    return Err(corrupt(idx, "buckets are not in ascending mass order".into()));
                }
            }
            buckets.push(bucket);
        }

        let missing = |key: &str| Error::corrupt(path, format!("missing header `{}`", key));
        let constraint = PeptideConstraint {
            min_mass: min_mass.ok_or_else(|| missing("min_mass"))?,
            max_mass: max_mass.ok_or_else(|| missing("max_mass"))?,
            min_length: min_length.ok_or_else(|| missing("min_length"))?,
            max_length: max_length.ok_or_else(|| missing("max_length"))?,
            enzyme: enzyme.ok_or_else(|| missing("enzyme_type"))?,
            digestion: digestion.ok_or_else(|| missing("digest_type"))?,
            missed_cleavages: missed_cleavages.ok_or_else(|| missing("missed_cleavages"))?,
            mass_type: mass_type.ok_or_else(|| missing("mass_type"))?,
            unique_peptides: unique_peptides.ok_or_else(|| missing("unique_peptides"))?,
        };

        Ok(Catalog {
            constraint,
            bucket_width: bucket_width
                .ok_or_else(|| missing("target_mass_range_for_index_file"))?,
            directory,
            created,
            buckets,
        })
    }

    fn try_load(path: &Path) -> Result<Catalog> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Catalog::parse(&contents, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::Transient {
                path: path.into(),
            }),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Read the catalog of an index directory. A missing or malformed catalog
    /// may still be in the process of being written, so it is retried up to
    /// `attempts` times before being reported as corrupt
    pub fn load<P: AsRef<Path>>(directory: P, attempts: usize, delay: Duration) -> Result<Catalog> {
        let path = directory.as_ref().join(CATALOG_FILE);
        let attempts = attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match Catalog::try_load(&path) {
                Ok(catalog) => return Ok(catalog),
                Err(e @ Error::Transient { .. }) | Err(e @ Error::Corruption { .. }) => {
                    log::warn!(
                        "attempt {}/{} to read `{}` failed: {}",
                        attempt,
                        attempts,
                        path.display(),
                        e
                    );
                    last = e.to_string();
                }
                Err(e) => return Err(e),
            }
            if attempt < attempts {
                std::thread::sleep(delay);
            }
        }
        Err(Error::corrupt(
            path,
            format!("unreadable after {} attempts ({})", attempts, last),
        ))
    }

    /// Ensure an index built under this catalog can answer `request`
    pub fn check_compatible(&self, request: &PeptideConstraint) -> Result<()> {
        let index = &self.constraint;
        let fail = |what: String| Err(Error::IndexCompatibility(what));

        if index.min_mass > request.min_mass || index.max_mass < request.max_mass {
            return fail(format!(
                "mass range [{}, {}] is not covered by the index range [{}, {}]",
                request.min_mass, request.max_mass, index.min_mass, index.max_mass
            ));
        }
        if index.min_length > request.min_length || index.max_length < request.max_length {
            return fail(format!(
                "length range [{}, {}] is not covered by the index range [{}, {}]",
                request.min_length, request.max_length, index.min_length, index.max_length
            ));
        }
        if index.missed_cleavages < request.missed_cleavages {
            return fail(format!(
                "{} missed cleavages requested, the index allows {}",
                request.missed_cleavages, index.missed_cleavages
            ));
        }
        if index.mass_type != request.mass_type {
            return fail(format!(
                "mass type `{}` requested, the index uses `{}`",
                request.mass_type, index.mass_type
            ));
        }
        if index.enzyme != request.enzyme {
            return fail(format!(
                "enzyme `{}` requested, the index uses `{}`",
                request.enzyme, index.enzyme
            ));
        }
        if index.digestion < request.digestion {
            return fail(format!(
                "`{}` requested, the index only holds `{}` peptides",
                request.digestion, index.digestion
            ));
        }
        if index.unique_peptides != request.unique_peptides {
            return fail(format!(
                "unique_peptides = {} requested, the index was built with {}",
                request.unique_peptides, index.unique_peptides
            ));
        }
        Ok(())
    }

    /// The contiguous run of buckets whose mass range intersects
    /// `[min_mass, max_mass]`
    pub fn select(&self, min_mass: f64, max_mass: f64) -> &[Bucket] {
        let first = self
            .buckets
            .iter()
            .position(|b| min_mass <= b.end() - EPSILON)
            .unwrap_or(self.buckets.len());
        let len = self.buckets[first..]
            .iter()
            .take_while(|b| max_mass > b.start - EPSILON)
            .count();
        &self.buckets[first..first + len]
    }
}
