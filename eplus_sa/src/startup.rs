use crate::config::{Config, Strategy};
use crate::error::Result;
use crate::mutate::{FieldRef, TargetTable};
use crate::orchestrate::Distribution;
use crate::schema::ParameterSchema;
use log::LevelFilter;
use prettytable::Table;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
  name = "eplus-sa",
  about = "Generates randomized building models for sensitivity studies, runs the simulator on them and collects the results."
)]
pub struct CmdArgs {
  /// TOML configuration file. Built-in defaults reproduce the
  /// single-family house study.
  #[structopt(long = "config", short = "c", parse(from_os_str))]
  pub config: Option<PathBuf>,

  /// Log debug messages.
  #[structopt(long = "verbose", short = "v")]
  pub verbose: bool,

  #[structopt(subcommand)]
  pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
  /// Sample the parameters and write one model per sample plus the
  /// provenance table.
  #[structopt(name = "sample")]
  Sample(SampleArgs),

  /// Run the simulator on every generated model.
  #[structopt(name = "simulate")]
  Simulate {
    /// Directory holding the models. Defaults to the sampling output.
    #[structopt(long = "models", parse(from_os_str))]
    models: Option<PathBuf>,

    /// Simulator processes run at once; 0 for one per CPU.
    #[structopt(long = "workers")]
    workers: Option<usize>,
  },

  /// Combine the simulator meter reports into one table.
  #[structopt(name = "collect")]
  Collect {
    /// Number of simulations to look for. Defaults to the number of models.
    #[structopt(long = "count")]
    count: Option<usize>,

    #[structopt(long = "output", parse(from_os_str))]
    output: Option<PathBuf>,
  },

  /// Print the parameter schema with the model field each parameter
  /// is written to.
  #[structopt(name = "schema")]
  Schema,
}

#[derive(Debug, Default, StructOpt)]
pub struct SampleArgs {
  /// Samples to generate (base rows for the sobol strategy).
  #[structopt(long = "count", short = "n")]
  pub count: Option<usize>,

  #[structopt(long = "seed")]
  pub seed: Option<u64>,

  /// Repeat the run once per seed. Example: --seeds 1,2,3
  #[structopt(long = "seeds", use_delimiter = true)]
  pub seeds: Vec<u64>,

  /// Either lhs or sobol.
  #[structopt(long = "strategy")]
  pub strategy: Option<Strategy>,

  #[structopt(long = "template", parse(from_os_str))]
  pub template: Option<PathBuf>,

  #[structopt(long = "output-dir", parse(from_os_str))]
  pub output_dir: Option<PathBuf>,

  /// Size of the worker pool; 0 for one thread per CPU.
  #[structopt(long = "workers")]
  pub workers: Option<usize>,

  /// Partition the batch over this many ranks instead of a worker pool.
  #[structopt(long = "ranks")]
  pub ranks: Option<usize>,

  /// Print the provenance table instead of writing it.
  #[structopt(long = "preview")]
  pub preview: bool,
}

/// Installs the logger: info by default, debug with `verbose`.
pub fn init_logging(verbose: bool) -> ::std::result::Result<(), log::SetLoggerError> {
  let level = if verbose {
    LevelFilter::Debug
  } else {
    LevelFilter::Info
  };
  simple_logger::SimpleLogger::new().with_level(level).init()
}

/// The configuration named on the command line, or the built-in one.
pub fn load_config(args: &CmdArgs) -> Result<Config> {
  match &args.config {
    Some(path) => Config::load(path),
    None => Ok(Config::default()),
  }
}

/// Applies command-line overrides of the `sample` subcommand.
pub fn apply_overrides(config: &mut Config, args: &SampleArgs) {
  if let Some(count) = args.count {
    config.sampling.count = count;
  }
  if args.seed.is_some() {
    config.sampling.seed = args.seed;
  }
  if !args.seeds.is_empty() {
    config.sampling.seeds = args.seeds.clone();
  }
  if let Some(strategy) = args.strategy {
    config.sampling.strategy = strategy;
  }
  if let Some(template) = &args.template {
    config.template = template.clone();
  }
  if let Some(output_dir) = &args.output_dir {
    config.output_dir = output_dir.clone();
  }
  if let Some(workers) = args.workers {
    config.distribution = Distribution::Pool { workers };
  }
  if let Some(ranks) = args.ranks {
    config.distribution = Distribution::Ranks { ranks };
  }
}

fn describe_fields(fields: &[FieldRef]) -> String {
  fields
    .iter()
    .map(|f| match f {
      FieldRef::Position(p) => format!("#{}", p),
      FieldRef::Named(name) => name.to_string(),
    })
    .collect::<Vec<_>>()
    .join(", ")
}

/// The schema with bounds and mutation targets, one row per parameter.
pub fn schema_table(schema: &ParameterSchema, targets: &TargetTable) -> Table {
  let bound = |b: Option<f64>| b.map(|v| v.to_string()).unwrap_or_default();
  let mut table = Table::new();
  table.set_titles(row![
    "parameter", "nominal", "std dev", "lower", "upper", "object", "field"
  ]);
  for spec in schema.params() {
    let (object, field) = match targets.mappings().find(|m| m.parameter == spec.name) {
      Some(m) => (
        format!("{} '{}'", m.class, m.object),
        describe_fields(m.fields),
      ),
      None => (String::new(), String::new()),
    };
    table.add_row(row![
      spec.name,
      r->spec.nominal,
      r->spec.std_dev,
      r->bound(spec.lower_bound),
      r->bound(spec.upper_bound),
      object,
      field
    ]);
  }
  table
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::DEFAULT_SD_FRACTION;

  #[test]
  fn sample_overrides() {
    let args = CmdArgs::from_iter_safe(&[
      "eplus-sa", "-c", "study.toml", "sample", "-n", "10", "--seed", "42",
      "--strategy", "sobol", "--ranks", "4", "--seeds", "1,2",
    ])
    .unwrap();
    assert_eq!(args.config, Some(PathBuf::from("study.toml")));
    let sample = match args.command {
      Command::Sample(sample) => sample,
      other => panic!("unexpected command {:?}", other),
    };
    let mut config = Config::default();
    apply_overrides(&mut config, &sample);
    assert_eq!(config.sampling.count, 10);
    assert_eq!(config.sampling.seed, Some(42));
    assert_eq!(config.sampling.seeds, vec![1, 2]);
    assert_eq!(config.sampling.strategy, Strategy::Sobol);
    assert_eq!(config.distribution, Distribution::Ranks { ranks: 4 });
  }

  #[test]
  fn no_overrides_keep_config() {
    let mut config = Config::default();
    apply_overrides(&mut config, &SampleArgs::default());
    assert_eq!(config, Config::default());
  }

  #[test]
  fn schema_table_lists_targets() {
    let schema =
      ParameterSchema::single_family_house(DEFAULT_SD_FRACTION).unwrap();
    let targets = TargetTable::single_family_house(&schema);
    let table = schema_table(&schema, &targets);
    assert_eq!(table.len(), 14);
    let rendered = table.to_string();
    assert!(rendered.contains("Speed 1 Gross Rated Heating COP"));
    assert!(rendered.contains("LIVING ZONE Ventl 1"));
  }
}
