//! On-disk peptide index: every candidate of a protein database, split into
//! mass-ordered bucket files and described by a [`Catalog`].

use crate::catalog::{self, Bucket, Catalog};
use crate::cleanup;
use crate::codec;
use crate::constraint::PeptideConstraint;
use crate::database::Database;
use crate::fasta::BINARY_SUFFIX;
use crate::generator::CandidateGenerator;
use crate::mass::{H2O_AVERAGE, H2O_MONO, HEAVIEST_RESIDUE, LIGHTEST_RESIDUE};
use crate::peptide::Peptide;
use crate::sorter::{SortOrder, Sorter};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on the number of bucket files in one index
pub const MAX_INDEX_FILES: usize = 1024;

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
/// Index settings as supplied by the user
pub struct Builder {
    /// Mass range covered by each bucket file, in Da
    pub bucket_width: Option<f64>,
    /// Peptides held in memory per bucket before they are flushed to disk
    pub batch_size: Option<usize>,
    /// Replace an existing index directory
    pub overwrite: Option<bool>,
    /// Also write `peptides.txt`
    pub write_peptide_list: Option<bool>,
    /// Attempts at reading a catalog that may still be being written
    pub retry_count: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

impl Builder {
    pub fn make_parameters(self) -> Result<IndexSettings> {
        let settings = IndexSettings {
            bucket_width: self.bucket_width.unwrap_or(25.0),
            batch_size: self.batch_size.unwrap_or(2500),
            overwrite: self.overwrite.unwrap_or(false),
            write_peptide_list: self.write_peptide_list.unwrap_or(false),
            retry_count: self.retry_count.unwrap_or(3),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(5000),
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct IndexSettings {
    pub bucket_width: f64,
    pub batch_size: usize,
    pub overwrite: bool,
    pub write_peptide_list: bool,
    pub retry_count: usize,
    pub retry_delay_ms: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        IndexSettings {
            bucket_width: 25.0,
            batch_size: 2500,
            overwrite: false,
            write_peptide_list: false,
            retry_count: 3,
            retry_delay_ms: 5000,
        }
    }
}

impl IndexSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.bucket_width.is_finite() && self.bucket_width > 0.0) {
            return Err(Error::Configuration(format!(
                "invalid bucket width {}",
                self.bucket_width
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// How candidate masses map onto bucket files
#[derive(Copy, Clone, Debug, PartialEq)]
struct Plan {
    min: f64,
    width: f64,
    bins: usize,
}

impl Plan {
    fn new(constraint: &PeptideConstraint, width: f64) -> Plan {
        let lightest = constraint.min_length as f64 * LIGHTEST_RESIDUE + H2O_MONO;
        let heaviest = constraint.max_length as f64 * HEAVIEST_RESIDUE + H2O_AVERAGE;
        let min = constraint.min_mass.max(lightest).trunc();
        let max = constraint.max_mass.min(heaviest).trunc() + 1.0;
        let range = (max - min).max(0.0);

        let mut width = width;
        let mut bins = (range / width).min(MAX_INDEX_FILES as f64) as usize + 1;
        if bins > MAX_INDEX_FILES {
            width = range / (MAX_INDEX_FILES - 1) as f64;
            bins = MAX_INDEX_FILES;
            log::warn!(
                "too many bucket files requested; widening buckets to {:.2} Da",
                width
            );
        }
        Plan { min, width, bins }
    }

    fn bin(&self, mass: f64) -> usize {
        let bin = ((mass - self.min) / self.width).floor().max(0.0) as usize;
        bin.min(self.bins - 1)
    }

    fn start(&self, bin: usize) -> f64 {
        self.min + bin as f64 * self.width
    }
}

/// Per-bucket write buffers of an in-progress build
struct Staging<'a> {
    directory: &'a Path,
    plan: Plan,
    batch_size: usize,
    buffers: Vec<Vec<Peptide>>,
    counts: Vec<usize>,
}

impl<'a> Staging<'a> {
    fn new(directory: &'a Path, plan: Plan, batch_size: usize) -> Self {
        Staging {
            directory,
            plan,
            batch_size,
            buffers: vec![Vec::new(); plan.bins],
            counts: vec![0; plan.bins],
        }
    }

    fn path(&self, bin: usize) -> PathBuf {
        self.directory.join(catalog::bucket_file(bin))
    }

    fn push(&mut self, peptide: Peptide) -> Result<()> {
        let bin = self.plan.bin(peptide.mass());
        self.buffers[bin].push(peptide);
        if self.buffers[bin].len() >= self.batch_size {
            self.flush(bin)?;
        }
        Ok(())
    }

    fn flush(&mut self, bin: usize) -> Result<()> {
        if self.buffers[bin].is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(bin))?;
        let mut wtr = BufWriter::new(file);
        for peptide in self.buffers[bin].drain(..) {
            codec::write_peptide(&mut wtr, &peptide)?;
            self.counts[bin] += 1;
        }
        wtr.flush()?;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<usize>> {
        for bin in 0..self.plan.bins {
            self.flush(bin)?;
        }
        Ok(self.counts)
    }
}

fn read_bucket(path: &Path) -> Result<Vec<Peptide>> {
    let file = File::open(path).map_err(|e| Error::corrupt(path, e.to_string()))?;
    let mut rdr = BufReader::new(file);
    let mut peptides = Vec::new();
    while let Some(peptide) =
        codec::read_peptide(&mut rdr).map_err(|e| Error::corrupt(path, e.to_string()))?
    {
        peptides.push(peptide);
    }
    Ok(peptides)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn write_readme(path: &Path, fasta: &Path, catalog: &Catalog) -> Result<()> {
    let c = &catalog.constraint;
    let mut wtr = BufWriter::new(File::create(path)?);
    writeln!(wtr, "# peptide index")?;
    writeln!(wtr, "# time created: {}", catalog.created)?;
    writeln!(wtr, "# protein database: {}", fasta.display())?;
    writeln!(wtr, "# enzyme: {}", c.enzyme)?;
    writeln!(wtr, "# digestion: {}", c.digestion)?;
    writeln!(wtr, "# mass range: [{}, {}] ({})", c.min_mass, c.max_mass, c.mass_type)?;
    writeln!(wtr, "# length range: [{}, {}]", c.min_length, c.max_length)?;
    writeln!(wtr, "# missed cleavages: {}", c.missed_cleavages)?;
    writeln!(wtr, "# unique peptides: {}", c.unique_peptides)?;
    writeln!(
        wtr,
        "# {} bucket files of {} Da",
        catalog.buckets.len(),
        catalog.bucket_width
    )?;
    wtr.flush()?;
    Ok(())
}

/// Locate the compiled protein container stored inside an index directory
fn find_binary(directory: &Path) -> Result<PathBuf> {
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        let compiled = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.ends_with(BINARY_SUFFIX))
            .unwrap_or(false);
        if compiled && path.is_file() {
            return Ok(path);
        }
    }
    Err(Error::corrupt(directory, "no compiled protein database"))
}

/// A peptide index that is fully written to disk
#[derive(Debug)]
pub struct Index {
    directory: PathBuf,
    catalog: Catalog,
    database: Arc<Database>,
    settings: IndexSettings,
}

impl Index {
    /// Digest every protein of `fasta` under `constraint` and write the index
    /// to `directory`. Nothing is visible at `directory` until the whole
    /// index has been written
    pub fn create<P: AsRef<Path>, Q: AsRef<Path>>(
        fasta: P,
        directory: Q,
        constraint: PeptideConstraint,
        settings: IndexSettings,
    ) -> Result<Index> {
        let fasta = fasta.as_ref();
        let target = directory.as_ref();
        constraint.validate()?;
        settings.validate()?;

        if target.exists() && !settings.overwrite {
            return Err(Error::Configuration(format!(
                "index directory `{}` already exists; enable overwrite to replace it",
                target.display()
            )));
        }
        if !fasta.is_file() {
            return Err(Error::input(fasta, "no such file"));
        }

        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;
        let scratch = tempfile::Builder::new().prefix("crux_").tempdir_in(parent)?;
        cleanup::register(scratch.path());

        // The scratch directory is removed when `scratch` drops on failure
        let staged = Index::stage(fasta, target, scratch.path(), constraint, &settings);
        cleanup::clear();
        let catalog = staged?;

        if target.exists() {
            log::info!("replacing existing index `{}`", target.display());
            std::fs::remove_dir_all(target)?;
        }
        let staged = scratch.keep();
        if let Err(e) = std::fs::rename(&staged, target) {
            let _ = std::fs::remove_dir_all(&staged);
            return Err(e.into());
        }
        log::info!("wrote index `{}`", target.display());

        let database = Database::from_binary(find_binary(target)?)?;
        Ok(Index {
            directory: target.into(),
            catalog,
            database,
            settings,
        })
    }

    fn stage(
        fasta: &Path,
        target: &Path,
        scratch: &Path,
        constraint: PeptideConstraint,
        settings: &IndexSettings,
    ) -> Result<Catalog> {
        let compiled = fasta
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.ends_with(BINARY_SUFFIX))
            .unwrap_or(false);
        let binary = match compiled {
            true => {
                let path = scratch.join(fasta.file_name().unwrap_or_default());
                std::fs::copy(fasta, &path).map_err(|e| Error::input(fasta, e.to_string()))?;
                path
            }
            false => Database::compile(fasta, scratch)?,
        };
        let database = Database::from_binary(&binary)?;
        log::info!(
            "indexing {} proteins from `{}`",
            database.len(),
            fasta.display()
        );

        let constraint = constraint.shared();
        let plan = Plan::new(&constraint, settings.bucket_width);
        log::debug!(
            "{} buckets of {} Da starting at {} Da",
            plan.bins,
            plan.width,
            plan.min
        );

        let mut staging = Staging::new(scratch, plan, settings.batch_size);
        let mut total = 0usize;
        for protein in database.proteins() {
            let view = database.view(protein)?;
            let generator =
                CandidateGenerator::new(view.sequence.as_bytes(), view.ordinal, constraint.clone())?;
            for peptide in generator {
                staging.push(peptide)?;
                total += 1;
            }
        }
        let counts = staging.finish()?;
        log::info!("generated {} candidate peptides", total);

        let sorter = Sorter::new(SortOrder::Mass, constraint.unique_peptides);
        let mut list = match settings.write_peptide_list {
            true => Some(BufWriter::new(File::create(
                scratch.join(catalog::PEPTIDE_LIST_FILE),
            )?)),
            false => None,
        };

        let mut buckets = Vec::new();
        let mut written = 0usize;
        for (bin, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let file = catalog::bucket_file(bin);
            let path = scratch.join(&file);
            let peptides = sorter.sort(&database, read_bucket(&path)?)?;
            log::trace!(
                "{}: {} peptides, {} after sorting",
                file,
                count,
                peptides.len()
            );

            let mut wtr = BufWriter::new(File::create(&path)?);
            for peptide in &peptides {
                codec::write_peptide(&mut wtr, peptide)?;
            }
            wtr.flush()?;

            if let Some(list) = list.as_mut() {
                for peptide in &peptides {
                    writeln!(list, "{}\t{:.4}", peptide.sequence(&database)?, peptide.mass())?;
                }
            }
            written += peptides.len();
            buckets.push(Bucket {
                file,
                start: plan.start(bin),
                width: plan.width,
            });
        }
        if let Some(mut list) = list {
            list.flush()?;
        }
        log::info!("wrote {} peptides to {} buckets", written, buckets.len());

        let catalog = Catalog {
            constraint: Arc::try_unwrap(constraint).unwrap_or_else(|c| (*c).clone()),
            bucket_width: plan.width,
            directory: std::fs::canonicalize(scratch)
                .map(|p| p.with_file_name(target.file_name().unwrap_or_default()))
                .unwrap_or_else(|_| target.into()),
            created: timestamp(),
            buckets,
        };
        write_readme(&scratch.join(catalog::README_FILE), fasta, &catalog)?;
        std::fs::write(scratch.join(catalog::CATALOG_FILE), catalog.render())?;
        Ok(catalog)
    }

    /// Open an existing index directory
    pub fn open<P: AsRef<Path>>(directory: P, settings: IndexSettings) -> Result<Index> {
        let directory = directory.as_ref();
        let catalog = Catalog::load(directory, settings.retry_count, settings.retry_delay())?;
        let database = Database::from_binary(find_binary(directory)?)?;
        log::debug!(
            "opened index `{}`: {} buckets, {} proteins",
            directory.display(),
            catalog.buckets.len(),
            database.len()
        );
        Ok(Index {
            directory: directory.into(),
            catalog,
            database,
            settings,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The constraint this index was built with
    pub fn constraint(&self) -> &PeptideConstraint {
        &self.catalog.constraint
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Every stored peptide with a mass and length inside `request`, in
    /// ascending mass order. Digestion and missed cleavages are not checked
    pub fn query(&self, request: &PeptideConstraint) -> Result<IndexQuery> {
        request.validate()?;
        self.catalog.check_compatible(request)?;
        let buckets = self
            .catalog
            .select(request.min_mass, request.max_mass)
            .to_vec();
        log::debug!(
            "querying [{}, {}] over {} buckets",
            request.min_mass,
            request.max_mass,
            buckets.len()
        );
        Ok(IndexQuery {
            directory: self.directory.clone(),
            buckets: buckets.into_iter(),
            current: None,
            min_mass: request.min_mass,
            max_mass: request.max_mass,
            min_length: request.min_length,
            max_length: request.max_length,
            opened: 0,
            done: false,
        })
    }

    /// Every stored peptide satisfying `request`
    pub fn peptides(&self, request: &PeptideConstraint) -> Result<Peptides> {
        let query = self.query(request)?;
        let recount = request.limits_missed_cleavages()
            && request.missed_cleavages < self.constraint().missed_cleavages;
        Ok(Peptides {
            query,
            database: self.database.clone(),
            request: Arc::new(request.clone()),
            narrow: request.digestion < self.constraint().digestion,
            recount,
        })
    }
}

/// Mass-ordered scan over the buckets selected for a query
pub struct IndexQuery {
    directory: PathBuf,
    buckets: std::vec::IntoIter<Bucket>,
    current: Option<(PathBuf, BufReader<File>)>,
    min_mass: f64,
    max_mass: f64,
    min_length: usize,
    max_length: usize,
    opened: usize,
    done: bool,
}

impl IndexQuery {
    /// Number of bucket files opened so far
    pub fn opened(&self) -> usize {
        self.opened
    }

    fn fail(&mut self, path: PathBuf, reason: String) -> Option<Result<Peptide>> {
        self.done = true;
        self.current = None;
        Some(Err(Error::corrupt(path, reason)))
    }
}

impl Iterator for IndexQuery {
    type Item = Result<Peptide>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.current.is_none() {
                let Some(bucket) = self.buckets.next() else {
                    self.done = true;
                    return None;
                };
                let path = self.directory.join(&bucket.file);
                let file = match File::open(&path) {
                    Ok(file) => file,
                    Err(e) => return self.fail(path, e.to_string()),
                };
                log::trace!("scanning `{}`", path.display());
                self.opened += 1;
                self.current = Some((path, BufReader::new(file)));
            }
            let Some((path, rdr)) = self.current.as_mut() else {
                continue;
            };

            let header = match codec::read_header(rdr) {
                Ok(Some(header)) => header,
                Ok(None) => {
                    self.current = None;
                    continue;
                }
                Err(e) => {
                    let path = path.clone();
                    return self.fail(path, e.to_string());
                }
            };

            // Buckets are mass ordered, so nothing later can match either
            if header.mass > self.max_mass {
                self.done = true;
                self.current = None;
                return None;
            }

            let length = header.length as usize;
            if header.mass < self.min_mass || length < self.min_length || length > self.max_length
            {
                if let Err(e) = codec::skip_body(rdr, header) {
                    let path = path.clone();
                    return self.fail(path, e.to_string());
                }
                continue;
            }

            return match codec::read_body(rdr, header) {
                Ok(peptide) => Some(Ok(peptide)),
                Err(e) => {
                    let path = path.clone();
                    self.fail(path, e.to_string())
                }
            };
        }
    }
}

/// [`IndexQuery`] restricted to the digestion and missed cleavages of a
/// request that is narrower than the index
pub struct Peptides {
    query: IndexQuery,
    database: Arc<Database>,
    request: Arc<PeptideConstraint>,
    narrow: bool,
    recount: bool,
}

impl Peptides {
    pub fn opened(&self) -> usize {
        self.query.opened()
    }

    fn accept(&self, peptide: &mut Peptide) -> Result<bool> {
        if self.narrow && !peptide.restrict(self.request.digestion) {
            return Ok(false);
        }
        if self.recount {
            let sequence = peptide.sequence(&self.database)?;
            let missed = Peptide::missed_cleavages(sequence.as_bytes(), &self.request.enzyme);
            if missed > self.request.missed_cleavages as usize {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Iterator for Peptides {
    type Item = Result<Peptide>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut peptide = match self.query.next()? {
                Ok(peptide) => peptide,
                Err(e) => return Some(Err(e)),
            };
            match self.accept(&mut peptide) {
                Ok(true) => return Some(Ok(peptide)),
                Ok(false) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraint::Builder as ConstraintBuilder;
    use crate::enzyme::Digestion;

    const FASTA: &str = "\
>P1 first protein
MRVLKFGGTSVANAERFLRVADILESNARQGQVAOOTVLSAPAKITNHLVAMIEKTISGQDALPNISDAERIFAELLTGLAAAQPGFPLAQLKTFWVDQEFAQIKHVLHGISLWLGQC
>P2 second protein
MSTNPKPQRKTKRNTNRRPQDVKFPGGGQIVGGVYLLPRRGPRLGVRATRKTSERSQPRGRRQPIPKARRPEGRTWAQPGYPWPLYGNEGCGWAGWLLSPRGSRPSWGPTDPRRRSRNLGK
>P3 third protein
MDSKGSSQKGSRLLLLLVVSNLLLCQGVVSVADILESNARTPLLPQRNKVLEAEALVPVAVVGPLPHSSNPGAKKIAAQLALTGAER
";

    fn settings(width: f64) -> IndexSettings {
        Builder {
            bucket_width: Some(width),
            batch_size: Some(7),
            write_peptide_list: Some(true),
            retry_delay_ms: Some(1),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
    }

    fn constraint() -> PeptideConstraint {
        ConstraintBuilder {
            digestion: Some(Digestion::Partial),
            min_mass: Some(400.0),
            max_mass: Some(2500.0),
            min_length: Some(4),
            max_length: Some(20),
            missed_cleavages: Some(1),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
    }

    fn fixture(width: f64) -> (tempfile::TempDir, Index) {
        let dir = tempfile::tempdir().unwrap();
        let fasta = dir.path().join("proteins.fasta");
        std::fs::write(&fasta, FASTA).unwrap();
        let index = Index::create(
            &fasta,
            dir.path().join("index"),
            constraint(),
            settings(width),
        )
        .unwrap();
        (dir, index)
    }

    fn sorted_sequences<I: IntoIterator<Item = Peptide>>(db: &Database, peptides: I) -> Vec<String> {
        let mut v = peptides
            .into_iter()
            .map(|p| p.sequence(db).unwrap().into_owned())
            .collect::<Vec<_>>();
        v.sort();
        v
    }

    #[test]
    fn plan_buckets() {
        let c = PeptideConstraint::default();
        let plan = Plan::new(&c, 25.0);
        assert_eq!(plan.min, 360.0);
        assert_eq!(plan.bins, ((7201.0 - 360.0) / 25.0) as usize + 1);
        assert_eq!(plan.bin(360.0), 0);
        assert_eq!(plan.bin(384.99), 0);
        assert_eq!(plan.bin(385.0), 1);
        assert_eq!(plan.bin(1e9), plan.bins - 1);

        let plan = Plan::new(&c, 0.5);
        assert_eq!(plan.bins, MAX_INDEX_FILES);
        assert!(plan.bin(7200.99) < MAX_INDEX_FILES);
        assert_eq!(plan.bin(1e9), MAX_INDEX_FILES - 1);

        let plan = Plan::new(&c, 1e-300);
        assert_eq!(plan.bins, MAX_INDEX_FILES);
        assert_eq!(plan.bin(360.0), 0);
        assert_eq!(plan.bin(1e9), MAX_INDEX_FILES - 1);
    }

    fn scratch_dirs(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("crux_"))
            .count()
    }

    #[test]
    fn repeated_sequence_is_one_record() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let prefixes = [
            "K",
            "GGK",
            "MADEEKLPPGWEK",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAK",
            "WWWYYR",
            "MSTNPKPQR",
            "QQQQQQQQQQQQQQQQQK",
            "DEFGHIKLMNPQR",
            "CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCK",
            "LLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLLR",
        ];
        let mut fasta = String::new();
        for (i, prefix) in prefixes.iter().enumerate() {
            fasta.push_str(&format!(">R{}\n{}VADILESNAR\n", i, prefix));
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repeats.fasta");
        std::fs::write(&path, fasta).unwrap();
        let c = ConstraintBuilder {
            min_mass: Some(400.0),
            max_mass: Some(2500.0),
            min_length: Some(10),
            max_length: Some(10),
            ..Default::default()
        }
        .make_parameters()
        .unwrap();
        let index = Index::create(&path, dir.path().join("index"), c.clone(), settings(50.0)).unwrap();

        let found = index
            .query(&c)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let db = index.database();
        let sequences = found
            .iter()
            .map(|p| p.sequence(db).unwrap().into_owned())
            .collect::<Vec<_>>();
        let distinct = sequences.iter().collect::<std::collections::HashSet<_>>();
        assert_eq!(distinct.len(), sequences.len());

        let vadilesnar = found
            .iter()
            .zip(&sequences)
            .find(|(_, s)| s.as_str() == "VADILESNAR")
            .map(|(p, _)| p)
            .unwrap();
        assert_eq!(vadilesnar.sources().len(), prefixes.len());

        let direct = db.peptides(&c.shared()).unwrap();
        assert_eq!(direct.len(), found.len());
    }

    #[test]
    fn failed_replace_removes_scratch() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let fasta = dir.path().join("proteins.fasta");
        std::fs::write(&fasta, FASTA).unwrap();
        // A plain file where the index directory should be cannot be removed
        // as a directory
        let target = dir.path().join("index");
        std::fs::write(&target, "not an index").unwrap();

        let overwrite = IndexSettings {
            overwrite: true,
            ..settings(100.0)
        };
        assert!(Index::create(&fasta, &target, constraint(), overwrite).is_err());
        assert_eq!(scratch_dirs(dir.path()), 0);
        assert_eq!(cleanup::registered(), None);
        assert!(target.is_file());
    }

    #[test]
    fn build_and_query() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let (dir, index) = fixture(100.0);
        let target = dir.path().join("index");

        assert!(target.join(catalog::CATALOG_FILE).is_file());
        assert!(target.join(catalog::README_FILE).is_file());
        assert!(target.join("proteins-binary-fasta").is_file());
        assert_eq!(cleanup::registered(), None);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("crux_"))
            .count();
        assert_eq!(leftovers, 0);

        let request = constraint();
        let stored = index
            .peptides(&request)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        for w in stored.windows(2) {
            assert!(w[0].mass() <= w[1].mass());
        }
        let direct = index.database().peptides(&request.clone().shared()).unwrap();
        assert_eq!(
            sorted_sequences(index.database(), stored),
            sorted_sequences(index.database(), direct)
        );

        let list = std::fs::read_to_string(target.join(catalog::PEPTIDE_LIST_FILE)).unwrap();
        assert!(list.lines().any(|l| l.starts_with("VADILESNAR\t1087.19")));

        let reopened = Index::open(&target, settings(100.0)).unwrap();
        assert_eq!(reopened.catalog(), index.catalog());
        assert_eq!(reopened.database().len(), 3);
    }

    #[test]
    fn narrower_request() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let (_dir, index) = fixture(250.0);

        let request = PeptideConstraint {
            digestion: Digestion::Full,
            missed_cleavages: 0,
            min_mass: 500.0,
            max_mass: 1500.0,
            min_length: 6,
            ..constraint()
        };
        let stored = index
            .peptides(&request)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(stored
            .iter()
            .all(|p| p.sources().iter().all(|s| s.specificity == crate::enzyme::Specificity::Full)));

        let direct = index.database().peptides(&request.clone().shared()).unwrap();
        let stored = sorted_sequences(index.database(), stored);
        assert_eq!(stored, sorted_sequences(index.database(), direct));
        assert!(stored.contains(&"VADILESNAR".to_string()));
    }

    #[test]
    fn point_query() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let (_dir, index) = fixture(1000.0);

        let point = |mass: f64| PeptideConstraint {
            min_mass: mass,
            max_mass: mass,
            ..constraint()
        };
        let empty = index
            .peptides(&point(1200.0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(empty.is_empty());

        let direct = index.database().peptides(&constraint().shared()).unwrap();
        let target = direct
            .iter()
            .find(|p| p.sequence(index.database()).unwrap() == "VADILESNAR")
            .map(|p| p.mass())
            .unwrap();
        assert!((target - 1087.19784).abs() < 1e-3);
        let hits = index
            .peptides(&point(target))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|p| p.mass() == target));
        assert!(sorted_sequences(index.database(), hits).contains(&"VADILESNAR".to_string()));
    }

    #[test]
    fn fast_forward() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let (_dir, index) = fixture(100.0);

        let bucket = index.catalog().buckets[2].clone();
        let request = PeptideConstraint {
            min_mass: bucket.start + 10.0,
            max_mass: bucket.start + 60.0,
            ..constraint()
        };
        let mut query = index.query(&request).unwrap();
        let found = query.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(query.opened(), 1);
        assert!(found.iter().all(|p| request.contains_mass(p.mass())));
    }

    #[test]
    fn incompatible_request() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let (_dir, index) = fixture(100.0);
        let request = PeptideConstraint {
            max_mass: 3000.0,
            ..constraint()
        };
        assert!(matches!(
            index.query(&request),
            Err(Error::IndexCompatibility(_))
        ));
    }

    #[test]
    fn existing_directory() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let (dir, _index) = fixture(100.0);
        let fasta = dir.path().join("proteins.fasta");
        let target = dir.path().join("index");

        let err = Index::create(&fasta, &target, constraint(), settings(100.0)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let overwrite = IndexSettings {
            overwrite: true,
            ..settings(200.0)
        };
        let index = Index::create(&fasta, &target, constraint(), overwrite).unwrap();
        assert_eq!(index.catalog().bucket_width, 200.0);
        assert_eq!(
            Index::open(&target, settings(1.0)).unwrap().catalog().bucket_width,
            200.0
        );
    }

    #[test]
    fn corrupt_bucket() {
        let _serial = cleanup::SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let (dir, index) = fixture(100.0);
        let bucket = &index.catalog().buckets[0];
        let path = dir.path().join("index").join(&bucket.file);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let request = PeptideConstraint {
            min_mass: bucket.start,
            max_mass: bucket.end() - 0.001,
            ..constraint()
        };
        let results = index.query(&request).unwrap().collect::<Vec<_>>();
        assert!(matches!(results.last(), Some(Err(Error::Corruption { .. }))));
    }
}
