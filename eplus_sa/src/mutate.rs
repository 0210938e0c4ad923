use crate::dictionary::DataDictionary;
use crate::error::Result;
use crate::idf::{is_numeric, ModelInstance, ModelTemplate, ObjectId};
use crate::sample::Sample;
use crate::schema::{ParamIdx, ParameterSchema};
use std::fmt;
use std::path::Path;

/// Where a value goes inside an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldRef {
  /// Position in the object, the class keyword being position 0.
  Position(usize),
  /// Field name as listed in the data dictionary or the model's `!-` labels.
  Named(&'static str),
}

impl fmt::Display for FieldRef {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      FieldRef::Position(p) => write!(f, "field #{}", p),
      FieldRef::Named(name) => write!(f, "field '{}'", name),
    }
  }
}

/// How one parameter is written into the model.
#[derive(Clone, Debug, PartialEq)]
pub struct Mapping {
  pub parameter: &'static str,
  pub class: &'static str,
  pub object: &'static str,
  /// Every field listed receives the same value.
  pub fields: &'static [FieldRef],
  /// Leave fields that do not currently hold a number alone.
  pub numeric_guard: bool,
  /// Decimal places to round to before writing.
  pub precision: Option<usize>,
}

const fn mapping(
  parameter: &'static str,
  class: &'static str,
  object: &'static str,
  fields: &'static [FieldRef],
) -> Mapping {
  Mapping {
    parameter,
    class,
    object,
    fields,
    numeric_guard: false,
    precision: None,
  }
}

const fn rounded(
  parameter: &'static str,
  class: &'static str,
  object: &'static str,
  fields: &'static [FieldRef],
  precision: usize,
) -> Mapping {
  Mapping {
    parameter,
    class,
    object,
    fields,
    numeric_guard: false,
    precision: Some(precision),
  }
}

// Value of a single-period compact schedule: Through, For, Until, value.
const SCHEDULE_VALUE: &[FieldRef] = &[FieldRef::Position(6)];

const fn schedule(parameter: &'static str, object: &'static str) -> Mapping {
  Mapping {
    parameter,
    class: "SCHEDULE:COMPACT",
    object,
    fields: SCHEDULE_VALUE,
    numeric_guard: true,
    precision: Some(2),
  }
}

/// Targets of the single-family house model, one entry per parameter of
/// `ParameterSchema::single_family_house`.
pub const SINGLE_FAMILY_HOUSE: &[Mapping] = &[
  schedule("heating_setpoint", "Dual Heating Setpoints"),
  schedule("cooling_setpoint", "Dual Cooling Setpoints"),
  mapping(
    "people_per_area",
    "PEOPLE",
    "LIVING ZONE People",
    &[FieldRef::Position(5)],
  ),
  mapping(
    "infil_flow_rate_living",
    "ZONEINFILTRATION:DESIGNFLOWRATE",
    "LIVING ZONE Infil 1",
    &[FieldRef::Position(5)],
  ),
  mapping(
    "infil_flow_rate_garage",
    "ZONEINFILTRATION:DESIGNFLOWRATE",
    "GARAGE ZONE Infil 1",
    &[FieldRef::Position(5)],
  ),
  mapping(
    "infil_flow_rate_attic",
    "ZONEINFILTRATION:DESIGNFLOWRATE",
    "ATTIC ZONE Infil 1",
    &[FieldRef::Position(5)],
  ),
  mapping(
    "watts_equip",
    "ELECTRICEQUIPMENT",
    "LIVING ZONE ElecEq",
    &[FieldRef::Named("Design Level")],
  ),
  mapping(
    "watts_lights",
    "LIGHTS",
    "LIVING ZONE Lights",
    &[FieldRef::Named("Lighting Level")],
  ),
  mapping(
    "heating_COP",
    "COIL:HEATING:DX:MULTISPEED",
    "Heat Pump DX Heating Coil 1",
    &[
      FieldRef::Named("Speed 1 Gross Rated Heating COP"),
      FieldRef::Named("Speed 2 Gross Rated Heating COP"),
    ],
  ),
  rounded(
    "fan_efficiency",
    "FAN:ONOFF",
    "Supply Fan 1",
    &[FieldRef::Position(3)],
    3,
  ),
  rounded(
    "pressure_rise",
    "FAN:ONOFF",
    "Supply Fan 1",
    &[FieldRef::Position(4)],
    1,
  ),
  rounded(
    "solar_transmittance",
    "WINDOWMATERIAL:GLAZING",
    "CLEAR 3MM",
    &[FieldRef::Named("Solar Transmittance at Normal Incidence")],
    3,
  ),
  rounded(
    "burner_eff",
    "COIL:HEATING:FUEL",
    "Supp Heating Coil 1",
    &[FieldRef::Position(4)],
    3,
  ),
  rounded(
    "vent_flow_rate",
    "ZONEVENTILATION:DESIGNFLOWRATE",
    "LIVING ZONE Ventl 1",
    &[FieldRef::Position(5)],
    6,
  ),
];

/// Mappings bound to the schema positions of their parameters.
#[derive(Clone, Debug)]
pub struct TargetTable {
  bindings: Vec<(ParamIdx, Mapping)>,
}

impl TargetTable {
  /// Binds `mappings` to `schema`. Mappings for parameters the schema does
  /// not have are dropped, so a reduced schema leaves the corresponding
  /// template values as they are.
  pub fn bind(schema: &ParameterSchema, mappings: &[Mapping]) -> TargetTable {
    let mut bindings = Vec::new();
    for mapping in mappings {
      match schema.find(mapping.parameter) {
        Some(idx) => bindings.push((idx, mapping.clone())),
        None => debug!(
          "Parameter {} is not sampled; its target keeps the template value.",
          mapping.parameter
        ),
      }
    }
    for name in schema.names() {
      if !mappings.iter().any(|m| m.parameter == name) {
        warn!("Parameter {} has no target in the model.", name);
      }
    }
    TargetTable { bindings }
  }

  pub fn single_family_house(schema: &ParameterSchema) -> TargetTable {
    TargetTable::bind(schema, SINGLE_FAMILY_HOUSE)
  }

  pub fn len(&self) -> usize {
    self.bindings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }

  pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
    self.bindings.iter().map(|(_, m)| m)
  }
}

/// What happened to one mapping of one sample.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationOutcome {
  Applied,
  TargetNotFound,
  FieldNotFound(FieldRef),
  /// The guarded field held something other than a number and was left as
  /// it was.
  FieldNotNumeric,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TargetOutcome {
  pub parameter: &'static str,
  pub class: &'static str,
  pub object: &'static str,
  pub outcome: MutationOutcome,
}

impl TargetOutcome {
  /// True for outcomes that point at a mismatch between model and mapping.
  pub fn is_failure(&self) -> bool {
    match self.outcome {
      MutationOutcome::TargetNotFound | MutationOutcome::FieldNotFound(_) => true,
      _ => false,
    }
  }
}

impl fmt::Display for TargetOutcome {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.outcome {
      MutationOutcome::Applied => write!(f, "{} applied", self.parameter),
      MutationOutcome::TargetNotFound => write!(
        f,
        "{}: no {} object named '{}'",
        self.parameter, self.class, self.object
      ),
      MutationOutcome::FieldNotFound(field) => write!(
        f,
        "{}: {} object '{}' has no {}",
        self.parameter, self.class, self.object, field
      ),
      MutationOutcome::FieldNotNumeric => write!(
        f,
        "{}: {} object '{}' holds no number, left unchanged",
        self.parameter, self.class, self.object
      ),
    }
  }
}

/// Per-sample account of the mutation step.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationReport {
  pub index: usize,
  pub file_name: String,
  pub outcomes: Vec<TargetOutcome>,
}

impl MutationReport {
  pub fn applied(&self) -> usize {
    self
      .outcomes
      .iter()
      .filter(|o| o.outcome == MutationOutcome::Applied)
      .count()
  }

  pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
    self.outcomes.iter().filter(|o| o.is_failure())
  }
}

/// File name of the `index`-th (0-based) generated model.
pub fn output_name(index: usize, extension: &str) -> String {
  format!("randomized_{}.{}", index + 1, extension)
}

/// Text written for a value: rounded to `precision` places when given,
/// otherwise the shortest representation that reads back to the same value.
pub fn format_value(value: f64, precision: Option<usize>) -> String {
  match precision {
    Some(places) => {
      let scale = 10f64.powi(places as i32);
      format!("{}", (value * scale).round() / scale)
    }
    None => format!("{}", value),
  }
}

/// Writes samples into copies of a template.
pub struct Mutator<'a> {
  template: &'a ModelTemplate,
  table: &'a TargetTable,
  dictionary: Option<&'a DataDictionary>,
  extension: String,
}

impl<'a> Mutator<'a> {
  pub fn new(template: &'a ModelTemplate, table: &'a TargetTable) -> Mutator<'a> {
    Mutator {
      template,
      table,
      dictionary: None,
      extension: "idf".to_string(),
    }
  }

  /// Resolves named fields through `dictionary` before falling back to the
  /// model's field labels.
  pub fn with_dictionary(mut self, dictionary: Option<&'a DataDictionary>) -> Mutator<'a> {
    self.dictionary = dictionary;
    self
  }

  pub fn with_extension(mut self, extension: &str) -> Mutator<'a> {
    self.extension = extension.to_string();
    self
  }

  pub fn extension(&self) -> &str {
    &self.extension
  }

  /// Applies one sample to a fresh copy of the template without touching
  /// the filesystem.
  pub fn apply(&self, index: usize, sample: &Sample) -> (ModelInstance<'a>, MutationReport) {
    let mut copy = self.template.instantiate();
    let mut outcomes = Vec::with_capacity(self.table.len());
    for (idx, mapping) in &self.table.bindings {
      let outcome = self.apply_mapping(&mut copy, mapping, sample.get(*idx));
      let target = TargetOutcome {
        parameter: mapping.parameter,
        class: mapping.class,
        object: mapping.object,
        outcome,
      };
      if target.is_failure() {
        error!("Sample {}: {}", index + 1, target);
      } else if target.outcome == MutationOutcome::FieldNotNumeric {
        debug!("Sample {}: {}", index + 1, target);
      }
      outcomes.push(target);
    }
    let report = MutationReport {
      index,
      file_name: output_name(index, &self.extension),
      outcomes,
    };
    (copy, report)
  }

  /// Applies one sample and saves the copy under `output_dir`.
  pub fn mutate(&self, output_dir: &Path, index: usize, sample: &Sample) -> Result<MutationReport> {
    let (copy, report) = self.apply(index, sample);
    copy.save(&output_dir.join(&report.file_name))?;
    trace!(
      "Wrote {} ({} of {} targets applied).",
      report.file_name,
      report.applied(),
      report.outcomes.len()
    );
    Ok(report)
  }

  fn resolve(&self, id: ObjectId, field: FieldRef) -> Option<usize> {
    let object = self.template.object(id);
    let position = match field {
      FieldRef::Position(p) => Some(p),
      FieldRef::Named(name) => self
        .dictionary
        .and_then(|d| d.field_position(object.class(), name))
        .or_else(|| object.labeled_position(name)),
    }?;
    if position < object.len() {
      Some(position)
    } else {
      None
    }
  }

  // All fields of a mapping are resolved before any is written, so a
  // missing field leaves the whole object untouched.
  fn apply_mapping(&self, copy: &mut ModelInstance, mapping: &Mapping, value: f64) -> MutationOutcome {
    let id = match self.template.find(mapping.class, mapping.object) {
      Some(id) => id,
      None => return MutationOutcome::TargetNotFound,
    };
    let mut positions = Vec::with_capacity(mapping.fields.len());
    for field in mapping.fields {
      match self.resolve(id, *field) {
        Some(p) => positions.push(p),
        None => return MutationOutcome::FieldNotFound(*field),
      }
    }
    let text = format_value(value, mapping.precision);
    let mut applied = 0;
    for position in positions {
      if mapping.numeric_guard && !copy.field(id, position).map_or(false, is_numeric) {
        continue;
      }
      if copy.set_field(id, position, text.clone()) {
        applied += 1;
      }
    }
    if applied == 0 {
      MutationOutcome::FieldNotNumeric
    } else {
      MutationOutcome::Applied
    }
  }
}
