use super::input::{Command, Parameters};
use anyhow::Context;
use log::info;
use pepdex_core::database::Database;
use pepdex_core::index::Index;
use pepdex_core::peptide::Peptide;
use std::io::Write;
use std::time::Instant;

pub struct Runner {
    pub parameters: Parameters,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Parameters) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    pub fn run(&self) -> anyhow::Result<()> {
        log::debug!("{}", serde_json::to_string_pretty(&self.parameters)?);
        match self.parameters.command {
            Command::CreateIndex => self.create_index().map(|_| ()),
            Command::GeneratePeptides => self.generate_peptides().map(|_| ()),
        }
    }

    pub fn create_index(&self) -> anyhow::Result<Index> {
        let fasta = self
            .parameters
            .fasta
            .as_deref()
            .context("`fasta` must be set")?;
        let directory = self
            .parameters
            .index_directory
            .as_deref()
            .context("`index_directory` must be set")?;

        let index = Index::create(
            fasta,
            directory,
            self.parameters.constraint.clone(),
            self.parameters.index.clone(),
        )
        .with_context(|| format!("Failed to build index `{}` from `{}`", directory, fasta))?;

        info!(
            "built index with {} buckets over {} proteins in {:#?}",
            index.catalog().buckets.len(),
            index.database().len(),
            self.start.elapsed()
        );
        Ok(index)
    }

    /// Write every peptide satisfying the constraint, returning the number of
    /// rows written
    pub fn generate_peptides(&self) -> anyhow::Result<usize> {
        let (database, peptides) = match self.parameters.index_directory.as_deref() {
            Some(directory) => {
                let index = Index::open(directory, self.parameters.index.clone())
                    .with_context(|| format!("Failed to open index `{}`", directory))?;
                let peptides = index
                    .peptides(&self.parameters.constraint)
                    .with_context(|| format!("Failed to query index `{}`", directory))?
                    .collect::<pepdex_core::Result<Vec<_>>>()
                    .with_context(|| format!("Failed to read index `{}`", directory))?;
                (index.database().clone(), peptides)
            }
            None => {
                let fasta = self
                    .parameters
                    .fasta
                    .as_deref()
                    .context("one of `fasta` or `index_directory` must be set")?;
                let database = Database::from_fasta(fasta, false)
                    .with_context(|| format!("Failed to read proteins from `{}`", fasta))?;
                let peptides = database
                    .peptides(&self.parameters.constraint.clone().shared())
                    .context("Failed to digest proteins")?;
                (database, peptides)
            }
        };
        info!(
            "generated {} peptides in {:#?}",
            peptides.len(),
            self.start.elapsed()
        );

        let bytes = self.write_peptides(&database, &peptides)?;
        let rows = bytes.rows;
        match self.parameters.output.as_deref() {
            Some(path) => {
                std::fs::write(path, &bytes.buffer)
                    .with_context(|| format!("Failed to write `{}`", path))?;
                info!("wrote {} rows to `{}`", rows, path);
            }
            None => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                lock.write_all(&bytes.buffer)?;
                lock.flush()?;
            }
        }
        Ok(rows)
    }

    fn serialize_peptide(
        &self,
        database: &Database,
        peptide: &Peptide,
        sequence: &str,
    ) -> anyhow::Result<csv::ByteRecord> {
        let mut record = csv::ByteRecord::new();
        record.push_field(sequence.as_bytes());
        record.push_field(
            peptide
                .modified_sequence(database, &self.parameters.mods)?
                .as_bytes(),
        );
        record.push_field(ryu::Buffer::new().format(peptide.mass()).as_bytes());
        record.push_field(itoa::Buffer::new().format(peptide.length()).as_bytes());
        record.push_field(peptide.protein_ids(database)?.join(";").as_bytes());
        Ok(record)
    }

    fn write_peptides(&self, database: &Database, peptides: &[Peptide]) -> anyhow::Result<Output> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "peptide",
            "modified_peptide",
            "mass",
            "length",
            "proteins",
        ]);
        wtr.write_byte_record(&headers)?;

        let mut rows = 0;
        for peptide in peptides {
            let sequence = peptide.sequence(database)?;
            wtr.write_byte_record(&self.serialize_peptide(database, peptide, &sequence)?)?;
            rows += 1;
            for variant in peptide.variants(&sequence, &self.parameters.mods) {
                wtr.write_byte_record(&self.serialize_peptide(database, &variant, &sequence)?)?;
                rows += 1;
            }
        }

        wtr.flush()?;
        Ok(Output {
            buffer: wtr.into_inner()?,
            rows,
        })
    }
}

struct Output {
    buffer: Vec<u8>,
    rows: usize,
}
