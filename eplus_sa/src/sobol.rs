use crate::error::{Error, Result};
use crate::sample::{physical_violations, DesignOfExperiments, Sample, Sampler, Violation};
use crate::schema::ParameterSchema;

const BITS: usize = 32;

/// Joe & Kuo direction numbers (new-joe-kuo-6.21201) for dimensions 2..=40:
/// degree `s`, polynomial coefficients `a` and initial odd integers `m`.
/// Dimension 1 is the van der Corput sequence and needs no entry.
const DIRECTIONS: &[(u32, u32, &[u32])] = &[
  (1, 0, &[1]),
  (2, 1, &[1, 3]),
  (3, 1, &[1, 3, 1]),
  (3, 2, &[1, 1, 1]),
  (4, 1, &[1, 1, 3, 3]),
  (4, 4, &[1, 3, 5, 13]),
  (5, 2, &[1, 1, 5, 5, 17]),
  (5, 4, &[1, 1, 5, 5, 5]),
  (5, 7, &[1, 1, 7, 11, 19]),
  (5, 11, &[1, 1, 5, 1, 1]),
  (5, 13, &[1, 1, 1, 3, 11]),
  (5, 14, &[1, 3, 5, 5, 31]),
  (6, 1, &[1, 3, 3, 9, 7, 49]),
  (6, 13, &[1, 1, 1, 15, 21, 21]),
  (6, 16, &[1, 3, 1, 13, 27, 49]),
  (6, 19, &[1, 1, 1, 15, 7, 5]),
  (6, 22, &[1, 3, 1, 15, 13, 25]),
  (6, 25, &[1, 1, 5, 5, 19, 61]),
  (7, 1, &[1, 3, 7, 11, 23, 15, 103]),
  (7, 4, &[1, 3, 7, 13, 13, 15, 69]),
  (7, 7, &[1, 1, 3, 13, 7, 35, 63]),
  (7, 8, &[1, 3, 5, 9, 1, 25, 53]),
  (7, 14, &[1, 3, 1, 13, 9, 35, 107]),
  (7, 19, &[1, 3, 1, 5, 27, 61, 31]),
  (7, 21, &[1, 1, 5, 11, 19, 41, 61]),
  (7, 28, &[1, 3, 5, 3, 3, 13, 69]),
  (7, 31, &[1, 1, 7, 13, 1, 19, 1]),
  (7, 32, &[1, 3, 7, 5, 13, 19, 59]),
  (7, 37, &[1, 1, 3, 9, 25, 29, 41]),
  (7, 41, &[1, 3, 5, 13, 23, 1, 55]),
  (7, 42, &[1, 3, 7, 3, 13, 59, 17]),
  (7, 50, &[1, 3, 1, 3, 5, 53, 69]),
  (7, 55, &[1, 1, 5, 5, 23, 33, 13]),
  (7, 56, &[1, 1, 7, 7, 1, 61, 123]),
  (7, 59, &[1, 1, 7, 9, 13, 61, 49]),
  (7, 62, &[1, 3, 3, 5, 3, 55, 33]),
  (8, 14, &[1, 3, 1, 15, 31, 13, 49, 245]),
  (8, 21, &[1, 3, 5, 15, 31, 59, 63, 97]),
  (8, 22, &[1, 3, 1, 11, 11, 11, 77, 249]),
];

/// Highest dimension the generator supports.
pub const MAX_DIMS: usize = DIRECTIONS.len() + 1;

/// Unscrambled base-2 Sobol sequence in Gray-code order. The first point is
/// the origin.
pub struct SobolSequence {
  directions: Vec<[u32; BITS]>,
  state: Vec<u32>,
  index: u64,
}

impl SobolSequence {
  pub fn new(dims: usize) -> Result<SobolSequence> {
    if dims > MAX_DIMS {
      return Err(Error::TooManyDimensions {
        requested: dims,
        max: MAX_DIMS,
      });
    }
    let directions = (0..dims).map(direction_numbers).collect();
    Ok(SobolSequence {
      directions,
      state: vec![0; dims],
      index: 0,
    })
  }

  pub fn dims(&self) -> usize {
    self.state.len()
  }

  /// Returns the next point in `[0, 1)^dims`.
  pub fn next_point(&mut self) -> Vec<f64> {
    if self.index > 0 {
      // Flip the direction number of the lowest zero bit of index - 1.
      let bit = (self.index - 1).trailing_ones() as usize;
      for (x, v) in self.state.iter_mut().zip(&self.directions) {
        *x ^= v[bit];
      }
    }
    self.index += 1;
    let scale = (1u64 << BITS) as f64;
    self.state.iter().map(|&x| x as f64 / scale).collect()
  }

  pub fn skip(&mut self, n: usize) {
    for _ in 0..n {
      self.next_point();
    }
  }
}

fn direction_numbers(dim: usize) -> [u32; BITS] {
  let mut v = [0u32; BITS];
  if dim == 0 {
    for (k, slot) in v.iter_mut().enumerate() {
      *slot = 1 << (31 - k);
    }
    return v;
  }
  let (s, a, m) = DIRECTIONS[dim - 1];
  let s = s as usize;
  for k in 0..s {
    v[k] = m[k] << (31 - k);
  }
  for k in s..BITS {
    v[k] = v[k - s] ^ (v[k - s] >> s);
    for l in 1..s {
      if (a >> (s - 1 - l)) & 1 == 1 {
        v[k] ^= v[k - l];
      }
    }
  }
  v
}

/// Sampling bounds of one free dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
  pub name: String,
  pub lower: f64,
  pub upper: f64,
}

/// Saltelli cross-sampling over a Sobol sequence, for variance-based
/// sensitivity indices. The cooling setpoint is replaced by a gap dimension
/// appended after the other free parameters. Every point is kept; constraint
/// breaches are recorded on the design and logged.
#[derive(Clone, Debug)]
pub struct Saltelli {
  pub base_count: usize,
  pub second_order: bool,
  /// Leading sequence points to drop. `None` skips the smallest power of two
  /// not below `base_count`.
  pub skip: Option<usize>,
  /// Half-width of the sampling interval in standard deviations.
  pub spread: f64,
}

impl Saltelli {
  pub fn new(base_count: usize) -> Saltelli {
    Saltelli {
      base_count,
      second_order: false,
      skip: None,
      spread: 3.0,
    }
  }

  /// Number of rows a design over `dims` free dimensions will have.
  pub fn row_count(&self, dims: usize) -> usize {
    if self.second_order {
      self.base_count * (2 * dims + 2)
    } else {
      self.base_count * (dims + 2)
    }
  }

  /// Bounds of the free dimensions: every parameter but cooling, in schema
  /// order, followed by the gap.
  pub fn bounds(&self, schema: &ParameterSchema) -> Result<Vec<Bound>> {
    let cooling = schema.setpoints().cooling;
    let mut bounds = Vec::with_capacity(schema.len());
    for idx in schema.indices().filter(|idx| *idx != cooling) {
      let spec = schema.get(idx);
      let half = self.spread * spec.std_dev;
      let lower = spec.lower_bound.map_or(spec.nominal - half, |lb| {
        lb.max(spec.nominal - half)
      });
      let upper = spec.upper_bound.map_or(spec.nominal + half, |ub| {
        ub.min(spec.nominal + half)
      });
      bounds.push(Bound {
        name: spec.name.clone(),
        lower,
        upper,
      });
    }
    let gap = schema.gap();
    bounds.push(Bound {
      name: "gap".to_string(),
      lower: gap.min,
      upper: gap.mean + self.spread * gap.std_dev,
    });
    for bound in &bounds {
      if !(bound.lower < bound.upper) {
        return Err(Error::invalid(
          &bound.name,
          format!("empty sampling interval [{}, {}]", bound.lower, bound.upper),
        ));
      }
    }
    Ok(bounds)
  }

  fn skip_count(&self) -> usize {
    self
      .skip
      .unwrap_or_else(|| self.base_count.max(1).next_power_of_two())
  }

  /// Rows in the unit hypercube, before scaling to bounds.
  fn unit_rows(&self, dims: usize) -> Result<Vec<Vec<f64>>> {
    let mut sequence = SobolSequence::new(2 * dims)?;
    sequence.skip(self.skip_count());
    let mut rows = Vec::with_capacity(self.row_count(dims));
    for _ in 0..self.base_count {
      let base = sequence.next_point();
      let (a, b) = base.split_at(dims);
      rows.push(a.to_vec());
      for k in 0..dims {
        let mut ab = a.to_vec();
        ab[k] = b[k];
        rows.push(ab);
      }
      if self.second_order {
        for k in 0..dims {
          let mut ba = b.to_vec();
          ba[k] = a[k];
          rows.push(ba);
        }
      }
      rows.push(b.to_vec());
    }
    Ok(rows)
  }
}

impl Sampler for Saltelli {
  fn name(&self) -> &'static str {
    "sobol"
  }

  fn seed(&self) -> Option<u64> {
    None
  }

  fn reseed(&mut self, _seed: u64) {}

  fn generate(&self, schema: &ParameterSchema) -> Result<DesignOfExperiments> {
    if !self.base_count.is_power_of_two() {
      warn!(
        "Sobol base count {} is not a power of two; balance properties \
         of the sequence are lost.",
        self.base_count
      );
    }
    let bounds = self.bounds(schema)?;
    let dims = bounds.len();
    let setpoints = schema.setpoints();
    let cooling = setpoints.cooling.position();
    let heating = setpoints.heating.position();

    let mut samples = Vec::with_capacity(self.row_count(dims));
    let mut violations = Vec::new();
    for (row, unit) in self.unit_rows(dims)?.into_iter().enumerate() {
      let scaled: Vec<f64> = unit
        .iter()
        .zip(&bounds)
        .map(|(u, b)| b.lower + u * (b.upper - b.lower))
        .collect();

      // Reinsert cooling at its schema position; the gap column goes away.
      let (free, gap) = scaled.split_at(dims - 1);
      let mut values = Vec::with_capacity(schema.len());
      values.extend_from_slice(&free[..cooling]);
      values.push(free[heating_in_free(heating, cooling)] + gap[0]);
      values.extend_from_slice(&free[cooling..]);

      for (value, bound) in free.iter().zip(&bounds) {
        if *value < bound.lower || *value > bound.upper {
          violations.push((
            row,
            Violation::OutOfBounds {
              name: bound.name.clone(),
              value: *value,
              lower: bound.lower,
              upper: bound.upper,
            },
          ));
        }
      }
      for violation in physical_violations(schema, &values) {
        violations.push((row, violation));
      }
      samples.push(Sample::from_values(values));
    }

    if violations.is_empty() {
      info!("Generated {} Sobol sample(s), no invalid samples.", samples.len());
    } else {
      warn!(
        "Generated {} Sobol sample(s), {} constraint violation(s) kept.",
        samples.len(),
        violations.len()
      );
      for (row, violation) in &violations {
        warn!("Sample {}: {}", row + 1, violation);
      }
    }
    let requested = samples.len();
    let mut doe = DesignOfExperiments::new(self.name(), None, requested, samples);
    doe.violations = violations;
    Ok(doe)
  }
}

/// Position of the heating setpoint among the free dimensions.
fn heating_in_free(heating: usize, cooling: usize) -> usize {
  if heating < cooling {
    heating
  } else {
    heating - 1
  }
}
