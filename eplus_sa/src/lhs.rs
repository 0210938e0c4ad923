use crate::error::{Error, Result};
use crate::sample::{physical_violations, DesignOfExperiments, Sample, Sampler};
use crate::schema::ParameterSchema;
use rand::distributions::Open01;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use statrs::distribution::{ContinuousCDF, Normal};

/// Draws `n` points of the unit hypercube `(0, 1)^dims`. Every dimension is
/// cut into `n` equal-probability bins, each bin is hit exactly once, and the
/// bin order is permuted independently per dimension. The position inside a
/// bin is uniform.
pub fn unit_hypercube<R: Rng>(rng: &mut R, n: usize, dims: usize) -> Vec<Vec<f64>> {
  let mut points = vec![vec![0.0; dims]; n];
  let mut bins: Vec<usize> = (0..n).collect();
  for dim in 0..dims {
    bins.shuffle(rng);
    for (point, &bin) in points.iter_mut().zip(&bins) {
      let jitter: f64 = rng.sample(Open01);
      point[dim] = (bin as f64 + jitter) / n as f64;
    }
  }
  points
}

/// Latin-Hypercube strategy. Oversamples the hypercube, maps each coordinate
/// through the normal inverse CDF of its parameter and keeps the first
/// `count` draws that satisfy the physical constraints. If the pool runs dry
/// the design is returned short with a warning; nothing is redrawn.
#[derive(Clone, Debug)]
pub struct LatinHypercube {
  pub count: usize,
  pub seed: Option<u64>,
  /// Pool size as a multiple of `count`.
  pub oversampling: usize,
}

impl LatinHypercube {
  pub fn new(count: usize, seed: Option<u64>) -> LatinHypercube {
    LatinHypercube {
      count,
      seed,
      oversampling: 2,
    }
  }

  fn rng(&self) -> StdRng {
    match self.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    }
  }
}

/// Inverse-CDF transforms, one per hypercube dimension. Dimension 0 is the
/// heating setpoint, dimension 1 the gap, the rest follow schema order
/// skipping both setpoints.
struct Marginals {
  heating: Normal,
  gap: Normal,
  others: Vec<(usize, Normal)>,
}

impl Marginals {
  fn new(schema: &ParameterSchema) -> Result<Marginals> {
    let normal = |name: &str, mean: f64, sd: f64| {
      Normal::new(mean, sd).map_err(|e| Error::invalid(name, e.to_string()))
    };
    let setpoints = schema.setpoints();
    let heating = schema.get(setpoints.heating);
    let gap = schema.gap();
    let mut others = Vec::new();
    for idx in schema.indices() {
      if idx == setpoints.heating || idx == setpoints.cooling {
        continue;
      }
      let spec = schema.get(idx);
      others.push((idx.position(), normal(&spec.name, spec.nominal, spec.std_dev)?));
    }
    Ok(Marginals {
      heating: normal(&heating.name, heating.nominal, heating.std_dev)?,
      gap: normal("gap", gap.mean, gap.std_dev)?,
      others,
    })
  }

  fn dims(&self) -> usize {
    2 + self.others.len()
  }
}

impl Sampler for LatinHypercube {
  fn name(&self) -> &'static str {
    "latin-hypercube"
  }

  fn seed(&self) -> Option<u64> {
    self.seed
  }

  fn reseed(&mut self, seed: u64) {
    self.seed = Some(seed);
  }

  fn generate(&self, schema: &ParameterSchema) -> Result<DesignOfExperiments> {
    let marginals = Marginals::new(schema)?;
    let setpoints = schema.setpoints();
    let gap = schema.gap();
    let pool_size = self.count * self.oversampling.max(1);
    let mut rng = self.rng();
    let pool = unit_hypercube(&mut rng, pool_size, marginals.dims());

    let mut samples = Vec::with_capacity(self.count);
    let mut rejected = 0;
    for point in &pool {
      if samples.len() >= self.count {
        break;
      }
      let mut values = vec![0.0; schema.len()];
      // Setpoints are clipped like every other parameter; a clip that
      // narrows the gap below the floor is caught by the checks below.
      let heating = schema
        .get(setpoints.heating)
        .clip(marginals.heating.inverse_cdf(point[0]));
      let delta = marginals.gap.inverse_cdf(point[1]).max(gap.min);
      values[setpoints.heating.position()] = heating;
      values[setpoints.cooling.position()] =
        schema.get(setpoints.cooling).clip(heating + delta);
      for ((position, normal), u) in marginals.others.iter().zip(&point[2..]) {
        values[*position] =
          schema.params()[*position].clip(normal.inverse_cdf(*u));
      }

      let violations = physical_violations(schema, &values);
      if violations.is_empty() {
        samples.push(Sample::from_values(values));
      } else {
        debug!("Discarding draw: {}", violations[0]);
        rejected += 1;
      }
    }

    if samples.len() < self.count {
      warn!(
        "Only {} of {} requested samples satisfied the constraints.",
        samples.len(),
        self.count
      );
    }
    info!(
      "Generated {} valid Latin hypercube sample(s) from a pool of {}.",
      samples.len(),
      pool_size
    );
    let mut doe =
      DesignOfExperiments::new(self.name(), self.seed, self.count, samples);
    doe.rejected = rejected;
    Ok(doe)
  }
}
