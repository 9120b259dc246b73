pub mod catalog;
pub mod cleanup;
pub mod codec;
pub mod constraint;
pub mod database;
pub mod enzyme;
pub mod fasta;
pub mod generator;
pub mod index;
pub mod mass;
pub mod modification;
pub mod peptide;
pub mod sorter;

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid or contradictory constraint values, reported before any I/O
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Missing, unreadable or malformed input file
    #[error("input error in `{}`: {reason}", path.display())]
    Input { path: PathBuf, reason: String },
    /// The on-disk index cannot satisfy the requested constraint
    #[error("index is incompatible with the request: {0}")]
    IndexCompatibility(String),
    /// Malformed catalog or bucket content
    #[error("index corruption in `{}`: {reason}", path.display())]
    Corruption { path: PathBuf, reason: String },
    /// A file that another process may still be writing is not yet readable
    #[error("`{}` is not available yet", path.display())]
    Transient { path: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn input<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Error::Input {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Error::Corruption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Deserialize a JSON file, as used for parameter files
pub fn read_json<P, T>(path: P) -> Result<T>
where
    P: AsRef<std::path::Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let path = path.as_ref();
    let contents =
        std::fs::read_to_string(path).map_err(|e| Error::input(path, e.to_string()))?;
    Ok(serde_json::from_str(&contents)?)
}
