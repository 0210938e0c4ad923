use crate::error::{Error, Result};
use crate::lhs::LatinHypercube;
use crate::orchestrate::Distribution;
use crate::runner::Simulator;
use crate::sample::Sampler;
use crate::schema::{
  single_family_house_parameters, ParameterSchema, ParameterSpec, SchemaBuilder,
  DEFAULT_MIN_GAP, DEFAULT_SD_FRACTION,
};
use crate::sobol::Saltelli;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Sampling strategy of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
  LatinHypercube,
  Sobol,
}

impl FromStr for Strategy {
  type Err = String;

  fn from_str(s: &str) -> ::std::result::Result<Strategy, String> {
    match s.to_lowercase().as_str() {
      "lhs" | "latin-hypercube" => Ok(Strategy::LatinHypercube),
      "sobol" | "saltelli" => Ok(Strategy::Sobol),
      other => Err(format!(
        "unknown strategy '{}', expected 'lhs' or 'sobol'",
        other
      )),
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Strategy::LatinHypercube => write!(f, "latin-hypercube"),
      Strategy::Sobol => write!(f, "sobol"),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
  pub strategy: Strategy,
  /// Samples for Latin hypercube, base rows for Sobol.
  pub count: usize,
  pub seed: Option<u64>,
  /// When not empty, the run is repeated once per seed.
  pub seeds: Vec<u64>,
  pub oversampling: usize,
  /// Relative uncertainty of the built-in parameters.
  pub sd_fraction: f64,
  pub second_order: bool,
  pub skip: Option<usize>,
  /// Sobol bounds are nominal ± `spread` standard deviations.
  pub spread: f64,
}

impl Default for SamplingConfig {
  fn default() -> SamplingConfig {
    SamplingConfig {
      strategy: Strategy::LatinHypercube,
      count: 100,
      seed: None,
      seeds: Vec::new(),
      oversampling: 2,
      sd_fraction: DEFAULT_SD_FRACTION,
      second_order: false,
      skip: None,
      spread: 3.0,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetpointConfig {
  pub heating: String,
  pub cooling: String,
  pub min_gap: f64,
}

impl Default for SetpointConfig {
  fn default() -> SetpointConfig {
    SetpointConfig {
      heating: "heating_setpoint".to_string(),
      cooling: "cooling_setpoint".to_string(),
      min_gap: DEFAULT_MIN_GAP,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
  /// Parent of the per-model simulator output directories.
  pub output_dir: PathBuf,
  pub workers: usize,
  #[serde(flatten)]
  pub simulator: Simulator,
}

impl Default for SimulationConfig {
  fn default() -> SimulationConfig {
    SimulationConfig {
      output_dir: PathBuf::from("output"),
      workers: 0,
      simulator: Simulator::default(),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
  pub output: PathBuf,
  /// Number of simulations to look for; the sample count when unset.
  pub count: Option<usize>,
}

impl Default for CollectConfig {
  fn default() -> CollectConfig {
    CollectConfig {
      output: PathBuf::from("analysis/combined_sims.csv"),
      count: None,
    }
  }
}

/// Everything a run needs. Every field has a default, so an empty file is a
/// valid configuration for the reference study.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub name: String,
  pub template: PathBuf,
  /// Data dictionary used to resolve named fields.
  pub dictionary: Option<PathBuf>,
  pub output_dir: PathBuf,
  pub provenance: PathBuf,
  pub extension: String,
  pub sampling: SamplingConfig,
  pub setpoints: SetpointConfig,
  pub distribution: Distribution,
  /// The built-in single-family house parameters when empty.
  pub parameters: Vec<ParameterSpec>,
  pub simulation: SimulationConfig,
  pub collect: CollectConfig,
}

impl Default for Config {
  fn default() -> Config {
    Config {
      name: "single_family_house".to_string(),
      template: PathBuf::from(
        "data/SingleFamilyHouse_TwoSpeed_CutoutTemperature.idf",
      ),
      dictionary: None,
      output_dir: PathBuf::from("randomized_idfs"),
      provenance: PathBuf::from("simulation_parameters.csv"),
      extension: "idf".to_string(),
      sampling: SamplingConfig::default(),
      setpoints: SetpointConfig::default(),
      distribution: Distribution::default(),
      parameters: Vec::new(),
      simulation: SimulationConfig::default(),
      collect: CollectConfig::default(),
    }
  }
}

impl Config {
  pub fn load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path).map_err(Error::io(path))?;
    let config = Config::parse(&text).map_err(|source| Error::Config {
      path: path.to_path_buf(),
      source,
    })?;
    debug!("Loaded configuration from {}.", path.display());
    Ok(config)
  }

  pub fn parse(text: &str) -> ::std::result::Result<Config, toml::de::Error> {
    toml::from_str(text)
  }

  /// The parameter schema, validated and frozen.
  pub fn schema(&self) -> Result<ParameterSchema> {
    let specs = if self.parameters.is_empty() {
      single_family_house_parameters(self.sampling.sd_fraction)
    } else {
      self.parameters.clone()
    };
    let mut builder = SchemaBuilder::new();
    for spec in specs {
      builder.register(spec)?;
    }
    builder.freeze(
      &self.setpoints.heating,
      &self.setpoints.cooling,
      self.setpoints.min_gap,
    )
  }

  pub fn sampler(&self) -> Box<dyn Sampler> {
    let sampling = &self.sampling;
    match sampling.strategy {
      Strategy::LatinHypercube => {
        let mut lhs = LatinHypercube::new(sampling.count, sampling.seed);
        lhs.oversampling = sampling.oversampling;
        Box::new(lhs)
      }
      Strategy::Sobol => {
        let mut saltelli = Saltelli::new(sampling.count);
        saltelli.second_order = sampling.second_order;
        saltelli.skip = sampling.skip;
        saltelli.spread = sampling.spread;
        Box::new(saltelli)
      }
    }
  }
}
