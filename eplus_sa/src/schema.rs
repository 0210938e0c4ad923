use crate::error::{Error, Result};
use std::collections::HashMap;

/// Standard deviation as a fraction of the nominal value used by the
/// reference schema.
pub const DEFAULT_SD_FRACTION: f64 = 0.05;

/// Minimum heating/cooling setpoint gap in degrees.
pub const DEFAULT_MIN_GAP: f64 = 4.0;

/// A physical parameter of the building model with its nominal value and
/// uncertainty. Optional bounds are clip bounds: realized values outside them
/// are pulled back onto the bound instead of being rejected. Draws of a
/// `non_negative` parameter below zero are rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
  pub name: String,
  pub nominal: f64,
  pub std_dev: f64,
  #[serde(default)]
  pub lower_bound: Option<f64>,
  #[serde(default)]
  pub upper_bound: Option<f64>,
  /// Rates, powers and efficiencies: a negative draw is not physical.
  #[serde(default)]
  pub non_negative: bool,
}

impl ParameterSpec {
  pub fn new(name: &str, nominal: f64, std_dev: f64) -> ParameterSpec {
    ParameterSpec {
      name: name.to_string(),
      nominal,
      std_dev,
      lower_bound: None,
      upper_bound: None,
      non_negative: false,
    }
  }

  /// Same parameter, with negative draws rejected.
  pub fn non_negative(mut self) -> ParameterSpec {
    self.non_negative = true;
    self
  }

  /// True when `value` lies within the clip bounds, if any.
  pub fn in_bounds(&self, value: f64) -> bool {
    self.lower_bound.map_or(true, |lower| value >= lower)
      && self.upper_bound.map_or(true, |upper| value <= upper)
  }

  /// Same parameter with clip bounds attached.
  pub fn clipped(mut self, lower: f64, upper: f64) -> ParameterSpec {
    self.lower_bound = Some(lower);
    self.upper_bound = Some(upper);
    self
  }

  /// Pulls `value` back into the clip bounds, if any.
  pub fn clip(&self, value: f64) -> f64 {
    let mut value = value;
    if let Some(lower) = self.lower_bound {
      value = value.max(lower);
    }
    if let Some(upper) = self.upper_bound {
      value = value.min(upper);
    }
    value
  }

  fn check(&self) -> Result<()> {
    if !self.nominal.is_finite() {
      return Err(Error::invalid(&self.name, "nominal value must be finite"));
    }
    if !(self.std_dev > 0.0) || !self.std_dev.is_finite() {
      return Err(Error::invalid(
        &self.name,
        format!("standard deviation must be positive, got {}", self.std_dev),
      ));
    }
    if let (Some(lower), Some(upper)) = (self.lower_bound, self.upper_bound) {
      if lower > upper {
        return Err(Error::invalid(
          &self.name,
          format!("lower bound {} exceeds upper bound {}", lower, upper),
        ));
      }
    }
    Ok(())
  }
}

/// Parameters of the single-family house study. Every uncertainty is
/// `sd_fraction` of the nominal value except burner efficiency, whose
/// deviation is `sd_fraction` in absolute terms. Everything but the
/// setpoints is a rate, power or efficiency and may not go negative.
pub fn single_family_house_parameters(sd_fraction: f64) -> Vec<ParameterSpec> {
  let setpoint = |name: &str, nominal: f64| {
    ParameterSpec::new(name, nominal, nominal * sd_fraction)
  };
  let spec = |name: &str, nominal: f64| setpoint(name, nominal).non_negative();
  vec![
    setpoint("heating_setpoint", 22.0),
    setpoint("cooling_setpoint", 26.6),
    spec("people_per_area", 3.0),
    spec("infil_flow_rate_living", 0.01),
    spec("infil_flow_rate_garage", 0.01),
    spec("infil_flow_rate_attic", 0.01),
    spec("watts_equip", 500.0),
    spec("watts_lights", 1000.0),
    spec("heating_COP", 4.0),
    spec("fan_efficiency", 0.7),
    spec("pressure_rise", 400.0),
    spec("solar_transmittance", 0.837).clipped(0.0, 1.0),
    ParameterSpec::new("burner_eff", 0.8, sd_fraction)
      .non_negative()
      .clipped(0.7, 0.9),
    spec("vent_flow_rate", 0.131944),
  ]
}

/// A thin wrapper around the position of a parameter in its schema. Samples
/// store values positionally, so lookups by name go through the schema once
/// and the resulting index is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamIdx(usize);

impl ParamIdx {
  pub fn position(self) -> usize {
    self.0
  }
}

/// The heating/cooling setpoint pair. Cooling is never sampled directly; it is
/// derived from heating plus a separately sampled gap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetpointPair {
  pub heating: ParamIdx,
  pub cooling: ParamIdx,
  pub min_gap: f64,
}

/// The pseudo-dimension standing in for the cooling setpoint during sampling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GapSpec {
  pub mean: f64,
  pub std_dev: f64,
  pub min: f64,
}

/// Closed, ordered set of parameters. Every sample carries exactly one value
/// per parameter, in this order.
#[derive(Clone, Debug)]
pub struct ParameterSchema {
  params: Vec<ParameterSpec>,
  name_index: HashMap<String, ParamIdx>,
  setpoints: SetpointPair,
}

impl ParameterSchema {
  /// The fourteen parameters of the single-family house study, frozen with
  /// the default setpoint pair and minimum gap.
  pub fn single_family_house(sd_fraction: f64) -> Result<ParameterSchema> {
    let mut builder = SchemaBuilder::new();
    for spec in single_family_house_parameters(sd_fraction) {
      builder.register(spec)?;
    }
    builder.freeze("heating_setpoint", "cooling_setpoint", DEFAULT_MIN_GAP)
  }

  pub fn len(&self) -> usize {
    self.params.len()
  }

  pub fn is_empty(&self) -> bool {
    self.params.is_empty()
  }

  pub fn params(&self) -> &[ParameterSpec] {
    &self.params
  }

  pub fn get(&self, idx: ParamIdx) -> &ParameterSpec {
    &self.params[idx.0]
  }

  pub fn find(&self, name: &str) -> Option<ParamIdx> {
    self.name_index.get(name).cloned()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.params.iter().map(|p| p.name.as_str())
  }

  /// Indices in schema order.
  pub fn indices(&self) -> impl Iterator<Item = ParamIdx> {
    (0..self.params.len()).map(ParamIdx)
  }

  pub fn setpoints(&self) -> SetpointPair {
    self.setpoints
  }

  /// Mean and spread of the cooling-minus-heating gap, propagated from both
  /// setpoint uncertainties.
  pub fn gap(&self) -> GapSpec {
    let heating = self.get(self.setpoints.heating);
    let cooling = self.get(self.setpoints.cooling);
    GapSpec {
      mean: cooling.nominal - heating.nominal,
      std_dev: (heating.std_dev.powi(2) + cooling.std_dev.powi(2)).sqrt(),
      min: self.setpoints.min_gap,
    }
  }
}

/// Mutable builder for a `ParameterSchema`.
pub struct SchemaBuilder {
  params: Vec<ParameterSpec>,
  name_index: HashMap<String, ParamIdx>,
}

impl SchemaBuilder {
  pub fn new() -> SchemaBuilder {
    SchemaBuilder {
      params: Vec::new(),
      name_index: HashMap::new(),
    }
  }

  /// Registers a parameter and returns its index. Names must be unique.
  pub fn register(&mut self, spec: ParameterSpec) -> Result<ParamIdx> {
    if self.name_index.contains_key(&spec.name) {
      return Err(Error::DuplicateParameter(spec.name));
    }
    spec.check()?;
    let idx = ParamIdx(self.params.len());
    self.name_index.insert(spec.name.clone(), idx);
    self.params.push(spec);
    Ok(idx)
  }

  pub fn find(&self, name: &str) -> Option<ParamIdx> {
    self.name_index.get(name).cloned()
  }

  /// Closes the schema. The named setpoints must exist and cooling must sit
  /// above heating by at least `min_gap` at nominal values.
  pub fn freeze(
    self,
    heating: &str,
    cooling: &str,
    min_gap: f64,
  ) -> Result<ParameterSchema> {
    let heating_idx = self
      .find(heating)
      .ok_or_else(|| Error::UnknownParameter(heating.to_string()))?;
    let cooling_idx = self
      .find(cooling)
      .ok_or_else(|| Error::UnknownParameter(cooling.to_string()))?;
    if heating_idx == cooling_idx {
      return Err(Error::invalid(
        cooling,
        "heating and cooling setpoints must be distinct parameters",
      ));
    }
    if !(min_gap >= 0.0) {
      return Err(Error::invalid(
        cooling,
        format!("minimum gap must be non-negative, got {}", min_gap),
      ));
    }
    let nominal_gap =
      self.params[cooling_idx.0].nominal - self.params[heating_idx.0].nominal;
    if nominal_gap < min_gap {
      return Err(Error::invalid(
        cooling,
        format!(
          "nominal gap {} to '{}' is below the minimum gap {}",
          nominal_gap, heating, min_gap
        ),
      ));
    }
    Ok(ParameterSchema {
      params: self.params,
      name_index: self.name_index,
      setpoints: SetpointPair {
        heating: heating_idx,
        cooling: cooling_idx,
        min_gap,
      },
    })
  }
}

impl Default for SchemaBuilder {
  fn default() -> SchemaBuilder {
    SchemaBuilder::new()
  }
}
