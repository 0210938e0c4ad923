extern crate eplus_sa;
extern crate tempfile;

use eplus_sa::dictionary::DataDictionary;
use eplus_sa::export::{CsvExporter, PROVENANCE_FILE};
use eplus_sa::idf::ModelTemplate;
use eplus_sa::lhs::LatinHypercube;
use eplus_sa::mutate::{format_value, MutationOutcome, Mutator, TargetTable};
use eplus_sa::orchestrate::Distribution;
use eplus_sa::pipeline::{self, Parameters};
use eplus_sa::sample::Sampler;
use eplus_sa::schema::{ParameterSchema, ParameterSpec, SchemaBuilder, DEFAULT_SD_FRACTION};
use eplus_sa::sobol::Saltelli;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

fn house_text() -> String {
  fs::read_to_string(fixture("house.idf")).unwrap()
}

fn schema() -> ParameterSchema {
  ParameterSchema::single_family_house(DEFAULT_SD_FRACTION).unwrap()
}

fn parameters(
  root: &Path,
  template: ModelTemplate,
  sampler: Box<dyn Sampler>,
  distribution: Distribution,
) -> Parameters {
  let schema = schema();
  let targets = TargetTable::single_family_house(&schema);
  Parameters {
    name: "house".to_string(),
    schema,
    sampler,
    template,
    dictionary: None,
    targets,
    output_dir: root.join("randomized_idfs"),
    extension: "idf".to_string(),
    distribution,
    exporter: Box::new(CsvExporter::new(&root.join(PROVENANCE_FILE))),
  }
}

fn sorted_entries(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = fs::read_dir(dir)
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}

fn field(template: &ModelTemplate, class: &str, name: &str, position: usize) -> String {
  let id = template.find(class, name).unwrap();
  template.object(id).fields()[position].value.clone()
}

#[test]
fn stale_output_is_replaced_by_the_batch() {
  let root = tempfile::tempdir().unwrap();
  let out = root.path().join("randomized_idfs");
  fs::create_dir_all(out.join("old_run")).unwrap();
  fs::write(out.join("randomized_99.idf"), "stale").unwrap();
  fs::write(out.join("notes.txt"), "stale").unwrap();

  let template = ModelTemplate::parse(house_text()).unwrap();
  let mut params = parameters(
    root.path(),
    template,
    Box::new(LatinHypercube::new(10, Some(42))),
    Distribution::Pool { workers: 4 },
  );
  let summary = pipeline::run(&mut params).unwrap();
  assert_eq!(summary.generated, 10);
  assert_eq!(summary.written, 10);
  assert!(summary.failed.is_empty());
  assert_eq!(summary.target_failures, 0);

  let mut expected: Vec<String> =
    (1..=10).map(|i| format!("randomized_{}.idf", i)).collect();
  expected.sort();
  assert_eq!(sorted_entries(&out), expected);

  let provenance = fs::read_to_string(root.path().join(PROVENANCE_FILE)).unwrap();
  let lines: Vec<&str> = provenance.lines().collect();
  assert_eq!(lines.len(), 11);
  assert!(lines[0].starts_with("IDF_file,heating_setpoint,cooling_setpoint,"));
  assert!(!lines[0].ends_with(",seed"));
  for (i, line) in lines[1..].iter().enumerate() {
    assert!(line.starts_with(&format!("randomized_{}.idf,", i + 1)), "{}", line);
  }
}

#[test]
fn generated_models_reflect_their_samples() {
  let template = ModelTemplate::parse(house_text()).unwrap();
  let schema = schema();
  let targets = TargetTable::single_family_house(&schema);
  let doe = LatinHypercube::new(3, Some(7)).generate(&schema).unwrap();
  let mutator = Mutator::new(&template, &targets);

  for (i, sample) in doe.samples().iter().enumerate() {
    let (copy, report) = mutator.apply(i, sample);
    assert_eq!(report.applied(), 14);
    let model = ModelTemplate::parse(copy.render()).unwrap();
    let value = |name: &str| sample.value_of(&schema, name).unwrap();

    assert_eq!(
      field(&model, "Schedule:Compact", "Dual Heating Setpoints", 6),
      format_value(value("heating_setpoint"), Some(2))
    );
    assert_eq!(
      field(&model, "Lights", "LIVING ZONE Lights", 5),
      format_value(value("watts_lights"), None)
    );
    let cop = format_value(value("heating_COP"), None);
    assert_eq!(field(&model, "Coil:Heating:DX:MultiSpeed", "Heat Pump DX Heating Coil 1", 20), cop);
    assert_eq!(field(&model, "Coil:Heating:DX:MultiSpeed", "Heat Pump DX Heating Coil 1", 23), cop);
    assert_eq!(
      field(&model, "WindowMaterial:Glazing", "CLEAR 3MM", 5),
      format_value(value("solar_transmittance"), Some(3))
    );
    // Thickness sits right before the transmittance and is not a target.
    assert_eq!(field(&model, "WindowMaterial:Glazing", "CLEAR 3MM", 4), "0.003");
    assert_eq!(field(&model, "Fan:OnOff", "Supply Fan 1", 6), "0.9");
  }
}

#[test]
fn repeated_runs_are_byte_identical() {
  let first = tempfile::tempdir().unwrap();
  let second = tempfile::tempdir().unwrap();
  for root in &[&first, &second] {
    let template = ModelTemplate::parse(house_text()).unwrap();
    let mut params = parameters(
      root.path(),
      template,
      Box::new(LatinHypercube::new(5, Some(11))),
      Distribution::Ranks { ranks: 2 },
    );
    pipeline::run(&mut params).unwrap();
  }
  for i in 1..=5 {
    let name = format!("randomized_{}.idf", i);
    let a = fs::read(first.path().join("randomized_idfs").join(&name)).unwrap();
    let b = fs::read(second.path().join("randomized_idfs").join(&name)).unwrap();
    assert_eq!(a, b, "{} differs between runs", name);
  }
  assert_eq!(
    fs::read(first.path().join(PROVENANCE_FILE)).unwrap(),
    fs::read(second.path().join(PROVENANCE_FILE)).unwrap()
  );
}

#[test]
fn untouched_text_survives_mutation() {
  let text = house_text();
  let template = ModelTemplate::parse(text.clone()).unwrap();
  let schema = schema();
  let targets = TargetTable::single_family_house(&schema);
  let doe = LatinHypercube::new(1, Some(3)).generate(&schema).unwrap();
  let (copy, _) = Mutator::new(&template, &targets).apply(0, &doe.samples()[0]);
  let rendered = copy.render();
  assert!(rendered.starts_with("!-Generator IDFEditor 1.51\n!-Option SortedOrder\n"));
  assert!(rendered.contains("    Heat Pump DX Heating Coil 1,  !- Name\n"));
  assert!(rendered.contains("    autocalculate;           !- Volume {m3}\n"));
  assert_eq!(rendered.lines().count(), text.lines().count());
}

#[test]
fn missing_object_fails_only_its_target() {
  let text = house_text().replace("GARAGE ZONE Infil 1", "GARAGE ZONE Infil 2");
  let template = ModelTemplate::parse(text).unwrap();
  let schema = schema();
  let targets = TargetTable::single_family_house(&schema);
  let doe = LatinHypercube::new(2, Some(5)).generate(&schema).unwrap();
  let mutator = Mutator::new(&template, &targets);

  for (i, sample) in doe.samples().iter().enumerate() {
    let (copy, report) = mutator.apply(i, sample);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].parameter, "infil_flow_rate_garage");
    assert_eq!(failures[0].outcome, MutationOutcome::TargetNotFound);
    assert_eq!(report.applied(), 13);

    let model = ModelTemplate::parse(copy.render()).unwrap();
    assert_eq!(
      field(&model, "ZoneInfiltration:DesignFlowRate", "GARAGE ZONE Infil 2", 5),
      "0.01"
    );
    assert_eq!(
      field(&model, "ZoneInfiltration:DesignFlowRate", "ATTIC ZONE Infil 1", 5),
      format_value(sample.value_of(&schema, "infil_flow_rate_attic").unwrap(), None)
    );
  }
}

#[test]
fn missing_object_does_not_stop_the_batch() {
  let root = tempfile::tempdir().unwrap();
  let text = house_text().replace("Supply Fan 1", "Supply Fan 9");
  let template = ModelTemplate::parse(text).unwrap();
  let mut params = parameters(
    root.path(),
    template,
    Box::new(LatinHypercube::new(4, Some(9))),
    Distribution::Pool { workers: 2 },
  );
  let summary = pipeline::run(&mut params).unwrap();
  assert_eq!(summary.written, 4);
  // Fan efficiency and pressure rise, for every sample.
  assert_eq!(summary.target_failures, 8);
}

#[test]
fn non_numeric_schedule_value_is_kept() {
  let text = house_text().replacen("    22.0;", "    Day Type;", 1);
  let template = ModelTemplate::parse(text).unwrap();
  let schema = schema();
  let targets = TargetTable::single_family_house(&schema);
  let doe = LatinHypercube::new(1, Some(1)).generate(&schema).unwrap();
  let (copy, report) = Mutator::new(&template, &targets).apply(0, &doe.samples()[0]);

  let heating = report
    .outcomes
    .iter()
    .find(|o| o.parameter == "heating_setpoint")
    .unwrap();
  assert_eq!(heating.outcome, MutationOutcome::FieldNotNumeric);
  assert!(!heating.is_failure());
  assert_eq!(report.failures().count(), 0);

  let model = ModelTemplate::parse(copy.render()).unwrap();
  assert_eq!(field(&model, "Schedule:Compact", "Dual Heating Setpoints", 6), "Day Type");
  assert_ne!(field(&model, "Schedule:Compact", "Dual Cooling Setpoints", 6), "26.6");
}

#[test]
fn dictionary_resolves_unlabeled_fields() {
  // Strip every `!-` label so that named fields can only come from the
  // dictionary.
  let unlabeled: String = house_text()
    .lines()
    .map(|line| match line.find("!-") {
      Some(at) if !line.trim_start().starts_with("!-") => line[..at].trim_end(),
      _ => line,
    })
    .collect::<Vec<_>>()
    .join("\n");
  let template = ModelTemplate::parse(unlabeled).unwrap();
  let dictionary = DataDictionary::load(&fixture("mini.idd")).unwrap();
  let schema = schema();
  let targets = TargetTable::single_family_house(&schema);
  let doe = LatinHypercube::new(1, Some(2)).generate(&schema).unwrap();
  let sample = &doe.samples()[0];

  let (_, without) = Mutator::new(&template, &targets).apply(0, sample);
  assert_eq!(without.failures().count(), 4);

  let mutator = Mutator::new(&template, &targets).with_dictionary(Some(&dictionary));
  let (copy, with) = mutator.apply(0, sample);
  assert_eq!(with.failures().count(), 0);
  let model = ModelTemplate::parse(copy.render()).unwrap();
  assert_eq!(
    field(&model, "ElectricEquipment", "LIVING ZONE ElecEq", 5),
    format_value(sample.value_of(&schema, "watts_equip").unwrap(), None)
  );
}

#[test]
fn ensemble_members_get_their_own_directories() {
  let root = tempfile::tempdir().unwrap();
  let template = ModelTemplate::parse(house_text()).unwrap();
  let mut params = parameters(
    root.path(),
    template,
    Box::new(LatinHypercube::new(3, None)),
    Distribution::Pool { workers: 2 },
  );
  let ensemble = pipeline::run_ensemble(&mut params, &[3, 4]).unwrap();
  assert_eq!(ensemble.runs.len(), 2);
  assert_eq!(ensemble.runs[0].seed, Some(3));
  assert_eq!(ensemble.statistics[0].count(), 6);

  let out = root.path().join("randomized_idfs");
  assert_eq!(sorted_entries(&out), vec!["seed_3", "seed_4"]);
  for seed in &["seed_3", "seed_4"] {
    let member = out.join(seed);
    assert_eq!(sorted_entries(&member).len(), 4);
    let provenance = fs::read_to_string(member.join(PROVENANCE_FILE)).unwrap();
    assert_eq!(provenance.lines().count(), 4);
  }
  assert_ne!(
    fs::read(out.join("seed_3").join("randomized_1.idf")).unwrap(),
    fs::read(out.join("seed_4").join("randomized_1.idf")).unwrap()
  );

  let combined = fs::read_to_string(root.path().join(PROVENANCE_FILE)).unwrap();
  let lines: Vec<&str> = combined.lines().collect();
  assert_eq!(lines.len(), 7);
  assert!(lines[0].ends_with(",seed"));
  assert!(lines[1].ends_with(",3"));
  assert!(lines[6].ends_with(",4"));
}

#[test]
fn sobol_design_writes_every_row() {
  let root = tempfile::tempdir().unwrap();
  let template = ModelTemplate::parse(house_text()).unwrap();
  let saltelli = Saltelli::new(4);
  // Thirteen free parameters plus the setpoint gap.
  let rows = saltelli.row_count(14);
  let mut params = parameters(
    root.path(),
    template,
    Box::new(saltelli),
    Distribution::Ranks { ranks: 3 },
  );
  let summary = pipeline::run(&mut params).unwrap();
  assert_eq!(summary.strategy, "sobol");
  assert_eq!(summary.generated, rows);
  assert_eq!(summary.written, rows);
  assert_eq!(sorted_entries(&root.path().join("randomized_idfs")).len(), rows);
}

#[test]
fn sobol_rows_breaking_constraints_are_still_written() {
  let root = tempfile::tempdir().unwrap();
  let template = ModelTemplate::parse(house_text()).unwrap();
  let mut builder = SchemaBuilder::new();
  builder
    .register(ParameterSpec::new("heating_setpoint", 22.0, 1.1))
    .unwrap();
  builder
    .register(ParameterSpec::new("cooling_setpoint", 26.6, 1.33))
    .unwrap();
  // Three deviations below nominal is well below zero.
  builder
    .register(ParameterSpec::new("infil_flow_rate_living", 0.01, 0.01).non_negative())
    .unwrap();
  let schema = builder
    .freeze("heating_setpoint", "cooling_setpoint", 4.0)
    .unwrap();

  let saltelli = Saltelli::new(4);
  let rows = saltelli.row_count(3);
  let mut params = parameters(
    root.path(),
    template,
    Box::new(saltelli),
    Distribution::Ranks { ranks: 2 },
  );
  params.targets = TargetTable::single_family_house(&schema);
  params.schema = schema;

  let summary = pipeline::run(&mut params).unwrap();
  assert_eq!(summary.generated, rows);
  assert!(summary.violations > 0);
  assert_eq!(summary.written, rows);
  assert!(summary.failed.is_empty());
  assert_eq!(sorted_entries(&root.path().join("randomized_idfs")).len(), rows);
  let provenance = fs::read_to_string(root.path().join(PROVENANCE_FILE)).unwrap();
  assert_eq!(provenance.lines().count(), rows + 1);
}
