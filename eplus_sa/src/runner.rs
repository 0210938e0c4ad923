use crate::error::{Error, Result};
use crate::orchestrate::prepare_output_dir;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// How to invoke the external building simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Simulator {
  pub executable: PathBuf,
  pub weather: PathBuf,
  /// Data dictionary handed to the simulator; its own default when unset.
  pub idd: Option<PathBuf>,
  pub annual: bool,
  pub readvars: bool,
}

impl Default for Simulator {
  fn default() -> Simulator {
    Simulator {
      executable: PathBuf::from("energyplus"),
      weather: PathBuf::from("weather_data/USA_IL_Chicago-OHare-Intl-AP.725300_AMY_2023.epw"),
      idd: None,
      annual: true,
      readvars: true,
    }
  }
}

/// A model the simulator could not process.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationFailure {
  pub model: String,
  pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct SimulationSummary {
  /// Models simulated successfully, in model order.
  pub succeeded: Vec<String>,
  pub failed: Vec<SimulationFailure>,
}

impl Simulator {
  /// The command simulating `model` into `output_dir`.
  pub fn command(&self, model: &Path, output_dir: &Path) -> Command {
    let mut command = Command::new(&self.executable);
    command
      .arg("--weather")
      .arg(&self.weather)
      .arg("--output-directory")
      .arg(output_dir);
    if let Some(idd) = &self.idd {
      command.arg("--idd").arg(idd);
    }
    if self.annual {
      command.arg("--annual");
    }
    if self.readvars {
      command.arg("--readvars");
    }
    command.arg(model);
    command
  }

  /// Simulates one model into `<output_root>/<model stem>/`, next to a copy
  /// of the model. `run_all` records an error here as a failed model.
  pub fn run_one(&self, model: &Path, output_root: &Path) -> Result<()> {
    let (stem, name) = match (model.file_stem(), model.file_name()) {
      (Some(stem), Some(name)) => (stem, name),
      _ => {
        return Err(Error::Io {
          path: model.to_path_buf(),
          source: io::Error::new(io::ErrorKind::InvalidInput, "not a file"),
        })
      }
    };
    let output_dir = output_root.join(stem);
    fs::create_dir_all(&output_dir).map_err(Error::io(&output_dir))?;
    let copy = output_dir.join(name);
    fs::copy(model, &copy).map_err(Error::io(model))?;

    let output = self
      .command(&copy, &output_dir)
      .stdin(Stdio::null())
      .output()
      .map_err(|source| Error::Spawn {
        executable: self.executable.clone(),
        source,
      })?;
    if output.status.success() {
      return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(Error::Simulation {
      model: model.to_path_buf(),
      status: output.status,
      stderr_tail: stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string()),
    })
  }

  /// Simulates every model of `models_dir` in parallel. `output_root` is
  /// emptied first. Failing models are logged and summarized; the batch
  /// always runs to the end.
  pub fn run_all(
    &self,
    models_dir: &Path,
    extension: &str,
    output_root: &Path,
    workers: usize,
  ) -> Result<SimulationSummary> {
    let models = list_models(models_dir, extension)?;
    prepare_output_dir(output_root)?;
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    info!(
      "Simulating {} model(s) with {} worker thread(s).",
      models.len(),
      pool.current_num_threads()
    );
    let results: Vec<(String, Result<()>)> =
      pool.install(|| {
        models
          .par_iter()
          .map(|model| {
            let name = model
              .file_name()
              .map(|s| s.to_string_lossy().into_owned())
              .unwrap_or_default();
            (name, self.run_one(model, output_root))
          })
          .collect()
      });

    let mut summary = SimulationSummary::default();
    for (model, result) in results {
      match result {
        Ok(()) => summary.succeeded.push(model),
        Err(err) => {
          error!("Simulation of {} failed: {}", model, err);
          summary.failed.push(SimulationFailure {
            model,
            reason: err.to_string(),
          });
        }
      }
    }
    if summary.failed.is_empty() {
      info!("All {} simulation(s) succeeded.", summary.succeeded.len());
    } else {
      warn!(
        "{} of {} simulation(s) failed: {}",
        summary.failed.len(),
        models.len(),
        summary
          .failed
          .iter()
          .map(|f| f.model.as_str())
          .collect::<Vec<_>>()
          .join(", ")
      );
    }
    Ok(summary)
  }
}

/// Model files with `extension` in `dir`, ordered by their sample number
/// (`randomized_2` before `randomized_10`), then by name.
pub fn list_models(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
  let mut models = Vec::new();
  for entry in fs::read_dir(dir).map_err(Error::io(dir))? {
    let path = entry.map_err(Error::io(dir))?.path();
    let matches = path
      .extension()
      .map_or(false, |e| e.eq_ignore_ascii_case(extension));
    if matches && path.is_file() {
      models.push(path);
    }
  }
  models.sort_by_key(|path| {
    let stem = path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    let number = stem
      .rsplit('_')
      .next()
      .and_then(|n| n.parse::<u64>().ok())
      .unwrap_or(u64::MAX);
    (number, stem)
  });
  Ok(models)
}
