use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Batch-fatal failures. Per-sample and per-field problems are not errors;
/// they are reported through `mutate::MutationReport` and
/// `orchestrate::BatchOutcome` so that a batch always runs to completion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("I/O error on {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse configuration {}: {source}", path.display())]
  Config {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid parameter '{name}': {reason}")]
  InvalidParameter { name: String, reason: String },

  #[error("parameter '{0}' was registered twice")]
  DuplicateParameter(String),

  #[error("unknown parameter '{0}'")]
  UnknownParameter(String),

  #[error("malformed model at line {line}: {reason}")]
  ModelParse { line: usize, reason: String },

  #[error("malformed data dictionary at line {line}: {reason}")]
  DictionaryParse { line: usize, reason: String },

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("failed to build worker pool: {0}")]
  Pool(#[from] rayon::ThreadPoolBuildError),

  #[error("failed to start {}: {source}", executable.display())]
  Spawn {
    executable: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{status}{}", stderr_tail.as_ref().map(|l| format!(" ({})", l)).unwrap_or_default())]
  Simulation {
    model: PathBuf,
    status: ExitStatus,
    /// Last non-empty line the simulator wrote to stderr.
    stderr_tail: Option<String>,
  },

  #[error("no simulation results found under {}", dir.display())]
  NoResults { dir: PathBuf },

  #[error("rank {0} of the batch panicked")]
  WorkerPanic(usize),

  #[error("Sobol sequence supports at most {max} dimensions, {requested} requested")]
  TooManyDimensions { requested: usize, max: usize },
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl Error {
  /// Adapter for `map_err` that attaches the offending path to an I/O error.
  pub fn io(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Io {
      path: path.to_path_buf(),
      source,
    }
  }

  pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidParameter {
      name: name.to_string(),
      reason: reason.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::error::Error as _;

  #[test]
  fn io_error_mentions_path() {
    let err = Error::io(Path::new("/tmp/missing.idf"))(io::Error::new(
      io::ErrorKind::NotFound,
      "no such file",
    ));
    let text = err.to_string();
    assert!(text.contains("/tmp/missing.idf"), "{}", text);
    assert!(err.source().is_some());
  }

  #[test]
  fn invalid_parameter_display() {
    let err = Error::invalid("watts_equip", "standard deviation must be positive");
    assert_eq!(
      err.to_string(),
      "invalid parameter 'watts_equip': standard deviation must be positive"
    );
  }
}
