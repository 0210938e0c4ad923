extern crate eplus_sa;
#[macro_use]
extern crate log;
extern crate pretty_env_logger;

use eplus_sa::export::{DebugExporter, Exporter, ProvenanceRecord};
use eplus_sa::idf::ModelTemplate;
use eplus_sa::lhs::LatinHypercube;
use eplus_sa::mutate::{Mutator, TargetTable};
use eplus_sa::orchestrate::{distribute, Distribution};
use eplus_sa::sample::{summary_table, Sampler};
use eplus_sa::schema::{ParameterSpec, SchemaBuilder, DEFAULT_MIN_GAP};
use std::path::PathBuf;

// Samples only the thermostat setpoints of a house model and writes five
// variants of it. Usage: eplus_sa_demo [TEMPLATE] [OUTPUT_DIR]
fn main() -> eplus_sa::error::Result<()> {
  pretty_env_logger::init();

  let mut args = std::env::args().skip(1);
  let template_path = args
    .next()
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("eplus_sa/tests/fixtures/house.idf"));
  let output_dir = args
    .next()
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("demo_output"));

  let mut builder = SchemaBuilder::new();
  builder.register(ParameterSpec::new("heating_setpoint", 22.0, 1.1))?;
  builder.register(ParameterSpec::new("cooling_setpoint", 26.6, 1.33))?;
  let schema = builder.freeze("heating_setpoint", "cooling_setpoint", DEFAULT_MIN_GAP)?;

  // Five draws; cooling always stays at least 4 degrees above heating.
  let doe = LatinHypercube::new(5, Some(42)).generate(&schema)?;

  let template = ModelTemplate::load(&template_path)?;
  let targets = TargetTable::single_family_house(&schema);
  let mutator = Mutator::new(&template, &targets);
  let outcome = distribute(
    &mutator,
    &output_dir,
    doe.samples(),
    Distribution::Pool { workers: 2 },
  )?;
  info!(
    "{} model(s) written to {}.",
    outcome.reports.len(),
    output_dir.display()
  );

  let records: Vec<ProvenanceRecord> = outcome
    .reports
    .iter()
    .map(|report| ProvenanceRecord {
      file_name: report.file_name.clone(),
      values: doe.samples()[report.index].values().to_vec(),
      run_id: None,
    })
    .collect();
  DebugExporter::new().export(&schema, &records)?;
  summary_table(&schema, &doe.statistics(&schema)).printstd();
  Ok(())
}
