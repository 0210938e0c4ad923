#[macro_use]
extern crate log;

use anyhow::Context;
use eplus_sa::aggregate::collect_meters;
use eplus_sa::config::Config;
use eplus_sa::export::DebugExporter;
use eplus_sa::mutate::TargetTable;
use eplus_sa::pipeline::{self, Parameters};
use eplus_sa::runner::list_models;
use eplus_sa::sample::summary_table;
use eplus_sa::startup::{self, CmdArgs, Command, SampleArgs};
use std::path::PathBuf;
use structopt::StructOpt;

fn sample(mut config: Config, args: SampleArgs) -> anyhow::Result<()> {
  startup::apply_overrides(&mut config, &args);
  let mut parameters = Parameters::from_config(&config)
    .with_context(|| format!("preparing study \"{}\"", config.name))?;
  if args.preview {
    parameters.exporter = Box::new(DebugExporter::new());
  }
  let statistics = if config.sampling.seeds.is_empty() {
    pipeline::run(&mut parameters)?.statistics
  } else {
    let ensemble = pipeline::run_ensemble(&mut parameters, &config.sampling.seeds)?;
    ensemble.statistics
  };
  println!("Realized parameter values:");
  summary_table(&parameters.schema, &statistics).printstd();
  Ok(())
}

fn simulate(config: Config, models: Option<PathBuf>, workers: Option<usize>) -> anyhow::Result<()> {
  let models = models.unwrap_or_else(|| config.output_dir.clone());
  let simulation = &config.simulation;
  let summary = simulation
    .simulator
    .run_all(
      &models,
      &config.extension,
      &simulation.output_dir,
      workers.unwrap_or(simulation.workers),
    )
    .with_context(|| format!("simulating models in {}", models.display()))?;
  for failure in &summary.failed {
    println!("{}: {}", failure.model, failure.reason);
  }
  Ok(())
}

fn collect(config: Config, count: Option<usize>, output: Option<PathBuf>) -> anyhow::Result<()> {
  let count = match count.or(config.collect.count) {
    Some(count) => count,
    None => list_models(&config.output_dir, &config.extension)
      .with_context(|| format!("counting models in {}", config.output_dir.display()))?
      .len(),
  };
  let output = output.unwrap_or_else(|| config.collect.output.clone());
  collect_meters(&config.simulation.output_dir, count, &output)?;
  Ok(())
}

fn main() -> anyhow::Result<()> {
  let args = CmdArgs::from_args();
  startup::init_logging(args.verbose).context("installing the logger")?;
  let config = startup::load_config(&args)?;
  debug!("Configuration: {:?}", config);

  match args.command {
    Command::Sample(sample_args) => sample(config, sample_args),
    Command::Simulate { models, workers } => simulate(config, models, workers),
    Command::Collect { count, output } => collect(config, count, output),
    Command::Schema => {
      let schema = config.schema()?;
      let targets = TargetTable::single_family_house(&schema);
      startup::schema_table(&schema, &targets).printstd();
      Ok(())
    }
  }
}
