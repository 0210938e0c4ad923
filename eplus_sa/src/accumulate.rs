/// Running summary of the realized values of one parameter across a design.
/// Uses Welford's update so that long designs do not lose precision, and
/// supports merging summaries built on disjoint sets of samples (per worker
/// or per ensemble seed).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Acc {
  count: u64,
  mean: f64,
  // Sum of squared deviations from the running mean.
  m2: f64,
  min: f64,
  max: f64,
}

impl Acc {
  pub fn new() -> Acc {
    Acc {
      count: 0,
      mean: 0.0,
      m2: 0.0,
      min: f64::INFINITY,
      max: f64::NEG_INFINITY,
    }
  }

  /// Records one realized value. NaNs are ignored.
  pub fn consume(&mut self, value: f64) {
    if value.is_nan() {
      return;
    }
    self.count += 1;
    let delta = value - self.mean;
    self.mean += delta / self.count as f64;
    self.m2 += delta * (value - self.mean);
    self.min = self.min.min(value);
    self.max = self.max.max(value);
  }

  /// Folds `other` into `self`, as if every value consumed by `other` had
  /// been consumed here.
  pub fn merge(&mut self, other: &Acc) {
    if other.count == 0 {
      return;
    }
    if self.count == 0 {
      *self = *other;
      return;
    }
    let total = self.count + other.count;
    let delta = other.mean - self.mean;
    self.mean += delta * other.count as f64 / total as f64;
    self.m2 += other.m2
      + delta.powi(2) * (self.count as f64 * other.count as f64)
        / total as f64;
    self.count = total;
    self.min = self.min.min(other.min);
    self.max = self.max.max(other.max);
  }

  pub fn count(&self) -> u64 {
    self.count
  }

  pub fn mean(&self) -> f64 {
    if self.count == 0 {
      f64::NAN
    } else {
      self.mean
    }
  }

  /// Sample standard deviation; NaN with fewer than two values.
  pub fn std_dev(&self) -> f64 {
    if self.count < 2 {
      f64::NAN
    } else {
      (self.m2 / (self.count - 1) as f64).sqrt()
    }
  }

  pub fn min(&self) -> f64 {
    self.min
  }

  pub fn max(&self) -> f64 {
    self.max
  }
}

impl Default for Acc {
  fn default() -> Acc {
    Acc::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mean_and_deviation() {
    let mut acc = Acc::new();
    for v in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
      acc.consume(*v);
    }
    assert_eq!(acc.count(), 8);
    assert!((acc.mean() - 5.0).abs() < 1e-12);
    assert!((acc.std_dev() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    assert_eq!(acc.min(), 2.0);
    assert_eq!(acc.max(), 9.0);
  }

  #[test]
  fn nan_is_ignored() {
    let mut acc = Acc::new();
    acc.consume(f64::NAN);
    acc.consume(1.0);
    assert_eq!(acc.count(), 1);
    assert!(acc.std_dev().is_nan());
  }

  #[test]
  fn merge_matches_sequential_consumption() {
    let values = [0.3, 1.7, 2.2, 9.1, -4.0, 0.0, 3.3];
    let mut whole = Acc::new();
    values.iter().for_each(|v| whole.consume(*v));

    let mut left = Acc::new();
    let mut right = Acc::new();
    values[..3].iter().for_each(|v| left.consume(*v));
    values[3..].iter().for_each(|v| right.consume(*v));
    left.merge(&right);

    assert_eq!(left.count(), whole.count());
    assert!((left.mean() - whole.mean()).abs() < 1e-12);
    assert!((left.std_dev() - whole.std_dev()).abs() < 1e-12);
    assert_eq!(left.min(), -4.0);
    assert_eq!(left.max(), 9.1);
  }

  #[test]
  fn merge_into_empty() {
    let mut other = Acc::new();
    other.consume(2.5);
    let mut acc = Acc::new();
    acc.merge(&other);
    assert_eq!(acc, other);
  }
}
