use clap::{Arg, ArgMatches, Command, ValueHint};
use pepdex_cli::input::{self, Input};
use pepdex_cli::runner::Runner;

fn parameters() -> Arg {
    Arg::new("parameters")
        .required(true)
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
        .help("Path to configuration parameters (JSON file)")
        .value_hint(ValueHint::FilePath)
}

fn fasta() -> Arg {
    Arg::new("fasta")
        .short('f')
        .long("fasta")
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
        .help(
            "Path to FASTA database. Overrides the FASTA file \
             specified in the configuration file.",
        )
        .value_hint(ValueHint::FilePath)
}

fn index() -> Arg {
    Arg::new("index")
        .short('i')
        .long("index")
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
        .help(
            "Path to the index directory. Overrides the directory \
             specified in the configuration file.",
        )
        .value_hint(ValueHint::DirPath)
}

fn run(command: input::Command, matches: &ArgMatches) -> anyhow::Result<()> {
    let parameters = Input::from_arguments(command, matches)?.build(command)?;
    Runner::new(parameters).run()
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(
            env_logger::Env::default().filter_or("PEPDEX_LOG", "error,pepdex=info,pepdex_core=info"),
        )
        .init();

    pepdex_core::cleanup::install_handler();

    let matches = Command::new("pepdex")
        .version(clap::crate_version!())
        .author("Michael Lazear <michaellazear92@gmail.com>")
        .about("Enzymatic digestion and mass-bucketed peptide indices")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("create-index")
                .about("Digest a FASTA database and write a peptide index")
                .arg(parameters())
                .arg(fasta())
                .arg(index())
                .arg(
                    Arg::new("overwrite")
                        .long("overwrite")
                        .action(clap::ArgAction::SetTrue)
                        .help("Replace the index directory if it already exists"),
                )
                .arg(
                    Arg::new("peptide-list")
                        .long("peptide-list")
                        .action(clap::ArgAction::SetTrue)
                        .help("Also write `peptides.txt` into the index directory"),
                ),
        )
        .subcommand(
            Command::new("generate-peptides")
                .about("List peptides from a FASTA database or an existing index")
                .arg(parameters())
                .arg(fasta())
                .arg(index())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help("Write peptides to this file instead of stdout")
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("create-index", sub)) => run(input::Command::CreateIndex, sub),
        Some(("generate-peptides", sub)) => run(input::Command::GeneratePeptides, sub),
        _ => unreachable!("a subcommand is required"),
    }
}
