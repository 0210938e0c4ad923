use crate::accumulate::Acc;
use crate::config::Config;
use crate::dictionary::DataDictionary;
use crate::error::Result;
use crate::export::{CsvExporter, Exporter, ProvenanceRecord, PROVENANCE_FILE};
use crate::idf::ModelTemplate;
use crate::mutate::{Mutator, TargetTable};
use crate::orchestrate::{distribute, prepare_output_dir, Distribution};
use crate::sample::Sampler;
use crate::schema::ParameterSchema;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Pipeline parameters.
pub struct Parameters {
  /// The name of the study, used in logs.
  pub name: String,

  pub schema: ParameterSchema,

  /// Produces the design of experiments. Reseeded once per ensemble member.
  pub sampler: Box<dyn Sampler>,

  /// Read-only model every sample is applied to.
  pub template: ModelTemplate,

  /// Resolves named fields; the template's field labels are used without it.
  pub dictionary: Option<DataDictionary>,

  pub targets: TargetTable,

  /// Emptied before the batch writes into it.
  pub output_dir: PathBuf,

  /// Extension of the generated model files.
  pub extension: String,

  pub distribution: Distribution,

  /// Receives the provenance of the whole run.
  pub exporter: Box<dyn Exporter>,
}

impl Parameters {
  /// Builds the parameters described by `config`, loading the template and
  /// the data dictionary. Provenance goes to a CSV file.
  pub fn from_config(config: &Config) -> Result<Parameters> {
    let schema = config.schema()?;
    let template = ModelTemplate::load(&config.template)?;
    info!(
      "Loaded {} objects from {}.",
      template.objects().len(),
      config.template.display()
    );
    let dictionary = match &config.dictionary {
      Some(path) => Some(DataDictionary::load(path)?),
      None => None,
    };
    let targets = TargetTable::single_family_house(&schema);
    Ok(Parameters {
      name: config.name.clone(),
      sampler: config.sampler(),
      template,
      dictionary,
      targets,
      schema,
      output_dir: config.output_dir.clone(),
      extension: config.extension.clone(),
      distribution: config.distribution,
      exporter: Box::new(CsvExporter::new(&config.provenance)),
    })
  }
}

/// What one run produced.
#[derive(Clone, Debug)]
pub struct RunSummary {
  pub strategy: &'static str,
  pub seed: Option<u64>,
  pub output_dir: PathBuf,
  pub requested: usize,
  pub generated: usize,
  /// Draws discarded by the sampler.
  pub rejected: usize,
  /// Constraint breaches kept in the design.
  pub violations: usize,
  pub written: usize,
  /// 0-based indices of samples whose model could not be written.
  pub failed: Vec<usize>,
  /// Unresolved targets summed over all samples.
  pub target_failures: usize,
  /// Realized-value statistics per parameter, in schema order.
  pub statistics: Vec<Acc>,
  pub elapsed: Duration,
}

impl RunSummary {
  fn log(&self) {
    info!(
      "{} design{}: {} of {} requested sample(s) generated, {} written to {} in {:.2}s.",
      self.strategy,
      self.seed.map(|s| format!(" (seed {})", s)).unwrap_or_default(),
      self.generated,
      self.requested,
      self.written,
      self.output_dir.display(),
      self.elapsed.as_secs_f64()
    );
    if self.rejected > 0 {
      info!("{} draw(s) discarded by the constraints.", self.rejected);
    }
    if self.violations > 0 {
      warn!("{} constraint violation(s) kept in the design.", self.violations);
    }
    if !self.failed.is_empty() {
      warn!(
        "{} model(s) could not be written: {:?}",
        self.failed.len(),
        self.failed.iter().map(|i| i + 1).collect::<Vec<_>>()
      );
    }
    if self.target_failures > 0 {
      warn!("{} target(s) could not be resolved.", self.target_failures);
    }
  }
}

/// Ensemble members in seed order, with statistics merged over all of them.
#[derive(Clone, Debug)]
pub struct EnsembleSummary {
  pub runs: Vec<RunSummary>,
  pub statistics: Vec<Acc>,
}

fn run_design(
  parameters: &Parameters,
  output_dir: &Path,
  run_id: Option<u64>,
) -> Result<(RunSummary, Vec<ProvenanceRecord>)> {
  let start = Instant::now();
  let doe = parameters.sampler.generate(&parameters.schema)?;
  let mutator = Mutator::new(&parameters.template, &parameters.targets)
    .with_dictionary(parameters.dictionary.as_ref())
    .with_extension(&parameters.extension);
  let outcome = distribute(
    &mutator,
    output_dir,
    doe.samples(),
    parameters.distribution,
  )?;

  // Provenance assembly starts once every worker has finished.
  let records: Vec<ProvenanceRecord> = outcome
    .reports
    .iter()
    .map(|report| ProvenanceRecord {
      file_name: report.file_name.clone(),
      values: doe.samples()[report.index].values().to_vec(),
      run_id,
    })
    .collect();

  let summary = RunSummary {
    strategy: doe.strategy,
    seed: doe.seed,
    output_dir: output_dir.to_path_buf(),
    requested: doe.requested,
    generated: doe.len(),
    rejected: doe.rejected,
    violations: doe.violations.len(),
    written: outcome.reports.len(),
    failed: outcome.failed.iter().map(|f| f.index).collect(),
    target_failures: outcome.target_failures(),
    statistics: doe.statistics(&parameters.schema),
    elapsed: start.elapsed(),
  };
  summary.log();
  Ok((summary, records))
}

/// Samples, writes one model per sample into the output directory and
/// exports the provenance. Per-sample and per-target failures end up in the
/// summary; only batch-level problems are errors.
pub fn run(parameters: &mut Parameters) -> Result<RunSummary> {
  info!("Running sampling pipeline \"{}\".", parameters.name);
  let (summary, records) =
    run_design(parameters, &parameters.output_dir, None)?;
  parameters.exporter.export(&parameters.schema, &records)?;
  Ok(summary)
}

/// Repeats the run once per seed. Member `s` writes its models and its own
/// provenance table into `<output_dir>/seed_<s>/`; the exporter receives the
/// records of every member, tagged with their seed.
pub fn run_ensemble(
  parameters: &mut Parameters,
  seeds: &[u64],
) -> Result<EnsembleSummary> {
  info!(
    "Running sampling pipeline \"{}\" for {} seed(s).",
    parameters.name,
    seeds.len()
  );
  let root = parameters.output_dir.clone();
  prepare_output_dir(&root)?;

  let mut runs = Vec::with_capacity(seeds.len());
  let mut records = Vec::new();
  let mut statistics = vec![Acc::new(); parameters.schema.len()];
  for &seed in seeds {
    parameters.sampler.reseed(seed);
    if parameters.sampler.seed() != Some(seed) {
      warn!(
        "The {} strategy ignores seeds; every member repeats the same design.",
        parameters.sampler.name()
      );
    }
    let dir = root.join(format!("seed_{}", seed));
    let (summary, member) = run_design(parameters, &dir, Some(seed))?;
    CsvExporter::new(&dir.join(PROVENANCE_FILE))
      .export(&parameters.schema, &member)?;
    for (total, acc) in statistics.iter_mut().zip(&summary.statistics) {
      total.merge(acc);
    }
    records.extend(member);
    runs.push(summary);
  }
  parameters.exporter.export(&parameters.schema, &records)?;
  Ok(EnsembleSummary { runs, statistics })
}
