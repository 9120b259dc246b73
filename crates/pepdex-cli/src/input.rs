use anyhow::{ensure, Context};
use clap::ArgMatches;
use pepdex_core::{
    constraint::{Builder, PeptideConstraint},
    index::{self, IndexSettings},
    modification::{AaMod, ModTable},
};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    CreateIndex,
    GeneratePeptides,
}

#[derive(Serialize, Clone, Debug)]
/// Actual parameters - may include overrides or default values not set by user
pub struct Parameters {
    pub version: String,
    pub command: Command,
    pub constraint: PeptideConstraint,
    pub index: IndexSettings,
    pub modifications: Vec<AaMod>,
    pub fasta: Option<String>,
    pub index_directory: Option<String>,
    pub output: Option<String>,

    #[serde(skip_serializing)]
    pub mods: ModTable,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file
pub struct Input {
    #[serde(default)]
    constraint: Builder,
    #[serde(default)]
    index: index::Builder,
    modifications: Option<Vec<AaMod>>,
    fasta: Option<String>,
    index_directory: Option<String>,
    output: Option<String>,
}

impl Input {
    pub fn from_arguments(command: Command, matches: &ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing parameters argument")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(fasta) = matches.get_one::<String>("fasta") {
            log::trace!("overriding `fasta` parameter.");
            input.fasta = Some(fasta.into());
        }
        if let Some(index) = matches.get_one::<String>("index") {
            log::trace!("overriding `index_directory` parameter.");
            input.index_directory = Some(index.into());
        }

        match command {
            Command::CreateIndex => {
                if matches.get_flag("overwrite") {
                    input.index.overwrite = Some(true);
                }
                if matches.get_flag("peptide-list") {
                    input.index.write_peptide_list = Some(true);
                }
                ensure!(
                    input.fasta.is_some(),
                    "`fasta` must be set. For more information try '--help'"
                );
                ensure!(
                    input.index_directory.is_some(),
                    "`index_directory` must be set. For more information try '--help'"
                );
            }
            Command::GeneratePeptides => {
                if let Some(output) = matches.get_one::<String>("output") {
                    log::trace!("overriding `output` parameter.");
                    input.output = Some(output.into());
                }
                ensure!(
                    input.fasta.is_some() || input.index_directory.is_some(),
                    "one of `fasta` or `index_directory` must be set. For more information try '--help'"
                );
            }
        }

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        pepdex_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    /// Overrides used when driving the runner without a command line
    pub fn with_fasta(mut self, fasta: impl Into<String>) -> Self {
        self.fasta = Some(fasta.into());
        self
    }

    pub fn with_index_directory(mut self, directory: impl Into<String>) -> Self {
        self.index_directory = Some(directory.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn build(self, command: Command) -> anyhow::Result<Parameters> {
        let constraint = self
            .constraint
            .make_parameters()
            .context("Invalid peptide constraint")?;
        let index = self
            .index
            .make_parameters()
            .context("Invalid index settings")?;

        let modifications = self.modifications.unwrap_or_default();
        let mods = ModTable::new(modifications.clone()).context("Invalid modifications")?;
        if !mods.is_empty() && command == Command::CreateIndex {
            log::warn!("modifications are only applied by `generate-peptides`; ignoring them");
        }
        if command == Command::GeneratePeptides
            && self.fasta.is_some()
            && self.index_directory.is_some()
        {
            log::warn!("both `fasta` and `index_directory` are set; reading from the index");
        }

        Ok(Parameters {
            version: clap::crate_version!().into(),
            command,
            constraint,
            index,
            modifications,
            fasta: self.fasta,
            index_directory: self.index_directory,
            output: self.output,
            mods,
        })
    }
}
