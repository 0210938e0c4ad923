use crate::accumulate::Acc;
use crate::error::Result;
use crate::schema::{ParamIdx, ParameterSchema};
use prettytable::Table;
use std::fmt;

/// One realized point of the parameter space. Values are stored in schema
/// order; a sample can only be built by the samplers of this crate and is not
/// modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
  values: Vec<f64>,
}

impl Sample {
  pub(crate) fn from_values(values: Vec<f64>) -> Sample {
    Sample { values }
  }

  pub fn get(&self, idx: ParamIdx) -> f64 {
    self.values[idx.position()]
  }

  pub fn values(&self) -> &[f64] {
    &self.values
  }

  /// Value of the parameter called `name`, if the schema has one.
  pub fn value_of(&self, schema: &ParameterSchema, name: &str) -> Option<f64> {
    schema.find(name).map(|idx| self.get(idx))
  }
}

/// A way in which a sample breaks the physical constraints of the schema.
#[derive(Clone, Debug, PartialEq)]
pub enum Violation {
  NonPositiveSetpoint { name: String, value: f64 },
  SetpointGap { gap: f64, min_gap: f64 },
  Negative { name: String, value: f64 },
  NotFinite { name: String },
  OutOfBounds {
    name: String,
    value: f64,
    lower: f64,
    upper: f64,
  },
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Violation::NonPositiveSetpoint { name, value } => {
        write!(f, "setpoint {} is not positive ({})", name, value)
      }
      Violation::SetpointGap { gap, min_gap } => write!(
        f,
        "cooling exceeds heating by {:.3}, minimum is {}",
        gap, min_gap
      ),
      Violation::Negative { name, value } => {
        write!(f, "{} is negative ({})", name, value)
      }
      Violation::NotFinite { name } => write!(f, "{} is not finite", name),
      Violation::OutOfBounds {
        name,
        value,
        lower,
        upper,
      } => write!(f, "{} = {} outside [{}, {}]", name, value, lower, upper),
    }
  }
}

/// Checks the constraints every generated sample must satisfy: finite
/// values inside their clip bounds, no negative values for `non_negative`
/// parameters, positive setpoints and the minimum setpoint gap.
pub fn physical_violations(
  schema: &ParameterSchema,
  values: &[f64],
) -> Vec<Violation> {
  let mut violations = Vec::new();
  let setpoints = schema.setpoints();
  for (spec, &value) in schema.params().iter().zip(values) {
    if !value.is_finite() {
      violations.push(Violation::NotFinite {
        name: spec.name.clone(),
      });
      continue;
    }
    if spec.non_negative && value < 0.0 {
      violations.push(Violation::Negative {
        name: spec.name.clone(),
        value,
      });
    }
    if !spec.in_bounds(value) {
      violations.push(Violation::OutOfBounds {
        name: spec.name.clone(),
        value,
        lower: spec.lower_bound.unwrap_or(f64::NEG_INFINITY),
        upper: spec.upper_bound.unwrap_or(f64::INFINITY),
      });
    }
  }
  for &idx in &[setpoints.heating, setpoints.cooling] {
    let value = values[idx.position()];
    if value <= 0.0 {
      violations.push(Violation::NonPositiveSetpoint {
        name: schema.get(idx).name.clone(),
        value,
      });
    }
  }
  let gap = values[setpoints.cooling.position()]
    - values[setpoints.heating.position()];
  // Tolerate the rounding of heating + gap - heating.
  if !(gap >= setpoints.min_gap - 1e-9) || gap <= 0.0 {
    violations.push(Violation::SetpointGap {
      gap,
      min_gap: setpoints.min_gap,
    });
  }
  violations
}

/// The ordered set of samples of one sampling run.
#[derive(Clone, Debug)]
pub struct DesignOfExperiments {
  pub strategy: &'static str,
  pub seed: Option<u64>,
  /// Number of samples the caller asked for.
  pub requested: usize,
  /// Draws discarded because they broke a constraint.
  pub rejected: usize,
  /// Constraint breaches that were recorded but kept, keyed by sample index.
  pub violations: Vec<(usize, Violation)>,
  samples: Vec<Sample>,
}

impl DesignOfExperiments {
  pub(crate) fn new(
    strategy: &'static str,
    seed: Option<u64>,
    requested: usize,
    samples: Vec<Sample>,
  ) -> DesignOfExperiments {
    DesignOfExperiments {
      strategy,
      seed,
      requested,
      rejected: 0,
      violations: Vec::new(),
      samples,
    }
  }

  pub fn samples(&self) -> &[Sample] {
    &self.samples
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  /// Realized-value statistics, one accumulator per schema parameter.
  pub fn statistics(&self, schema: &ParameterSchema) -> Vec<Acc> {
    let mut accs = vec![Acc::new(); schema.len()];
    for sample in &self.samples {
      for (acc, &value) in accs.iter_mut().zip(sample.values()) {
        acc.consume(value);
      }
    }
    accs
  }
}

/// Renders nominal values next to realized statistics.
pub fn summary_table(schema: &ParameterSchema, stats: &[Acc]) -> Table {
  let mut table = Table::new();
  table.set_titles(row![
    "parameter", "nominal", "std dev", "mean", "sd", "min", "max"
  ]);
  for (spec, acc) in schema.params().iter().zip(stats) {
    table.add_row(row![
      spec.name,
      r->format!("{:.6}", spec.nominal),
      r->format!("{:.6}", spec.std_dev),
      r->format!("{:.6}", acc.mean()),
      r->format!("{:.6}", acc.std_dev()),
      r->format!("{:.6}", acc.min()),
      r->format!("{:.6}", acc.max())
    ]);
  }
  table
}

/// A strategy producing a design of experiments over a schema.
pub trait Sampler {
  /// Short name used in logs and summaries.
  fn name(&self) -> &'static str;

  /// Seed of the underlying generator, if the strategy is randomized and
  /// was seeded.
  fn seed(&self) -> Option<u64>;

  /// Replaces the seed; used to repeat a design across an ensemble.
  fn reseed(&mut self, seed: u64);

  fn generate(&self, schema: &ParameterSchema) -> Result<DesignOfExperiments>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::{ParameterSpec, SchemaBuilder, DEFAULT_SD_FRACTION};

  fn nominal_values(schema: &ParameterSchema) -> Vec<f64> {
    schema.params().iter().map(|p| p.nominal).collect()
  }

  #[test]
  fn nominal_point_is_valid() {
    let schema =
      ParameterSchema::single_family_house(DEFAULT_SD_FRACTION).unwrap();
    assert!(physical_violations(&schema, &nominal_values(&schema)).is_empty());
  }

  #[test]
  fn narrow_gap_is_a_violation() {
    let schema =
      ParameterSchema::single_family_house(DEFAULT_SD_FRACTION).unwrap();
    let mut values = nominal_values(&schema);
    values[1] = values[0] + 3.0;
    let violations = physical_violations(&schema, &values);
    assert_eq!(violations.len(), 1);
    match &violations[0] {
      Violation::SetpointGap { min_gap, .. } => assert_eq!(*min_gap, 4.0),
      other => panic!("unexpected violation {}", other),
    }
  }

  #[test]
  fn negative_rates_are_violations() {
    let schema =
      ParameterSchema::single_family_house(DEFAULT_SD_FRACTION).unwrap();
    let mut values = nominal_values(&schema);
    let idx = schema.find("infil_flow_rate_attic").unwrap();
    values[idx.position()] = -0.001;
    let violations = physical_violations(&schema, &values);
    assert_eq!(
      violations,
      vec![Violation::Negative {
        name: "infil_flow_rate_attic".to_string(),
        value: -0.001,
      }]
    );
  }

  #[test]
  fn signed_parameters_may_go_negative() {
    let mut builder = SchemaBuilder::new();
    builder
      .register(ParameterSpec::new("heating_setpoint", 22.0, 1.1))
      .unwrap();
    builder
      .register(ParameterSpec::new("cooling_setpoint", 26.6, 1.33))
      .unwrap();
    builder
      .register(ParameterSpec::new("azimuth_offset", -10.0, 2.0))
      .unwrap();
    let schema = builder
      .freeze("heating_setpoint", "cooling_setpoint", 4.0)
      .unwrap();
    assert!(physical_violations(&schema, &[22.0, 26.6, -12.5]).is_empty());
  }

  #[test]
  fn bounded_setpoints_are_checked() {
    let mut builder = SchemaBuilder::new();
    builder
      .register(ParameterSpec::new("heating_setpoint", 22.0, 1.1).clipped(0.0, 22.5))
      .unwrap();
    builder
      .register(ParameterSpec::new("cooling_setpoint", 26.6, 1.33).clipped(0.0, 27.0))
      .unwrap();
    let schema = builder
      .freeze("heating_setpoint", "cooling_setpoint", 4.0)
      .unwrap();
    assert!(physical_violations(&schema, &[22.5, 27.0]).is_empty());
    assert_eq!(
      physical_violations(&schema, &[22.0, 28.0]),
      vec![Violation::OutOfBounds {
        name: "cooling_setpoint".to_string(),
        value: 28.0,
        lower: 0.0,
        upper: 27.0,
      }]
    );
  }

  #[test]
  fn statistics_follow_schema_order() {
    let schema =
      ParameterSchema::single_family_house(DEFAULT_SD_FRACTION).unwrap();
    let values = nominal_values(&schema);
    let doe = DesignOfExperiments::new(
      "test",
      None,
      2,
      vec![
        Sample::from_values(values.clone()),
        Sample::from_values(values.clone()),
      ],
    );
    let stats = doe.statistics(&schema);
    assert_eq!(stats.len(), schema.len());
    assert_eq!(stats[6].count(), 2);
    assert!((stats[6].mean() - 500.0).abs() < 1e-12);
    let rendered = summary_table(&schema, &stats).to_string();
    assert!(rendered.contains("watts_equip"));
  }
}
