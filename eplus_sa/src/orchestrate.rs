use crate::error::{Error, Result};
use crate::mutate::{output_name, MutationReport, Mutator};
use crate::sample::Sample;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;

/// How the samples of a batch are spread over workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Distribution {
  /// A shared pool of `workers` threads; 0 picks one per CPU.
  Pool {
    #[serde(default)]
    workers: usize,
  },
  /// `ranks` independent workers, rank `r` taking samples `r, r + ranks, ..`.
  /// Rank 0 prepares the output directory while the others wait on a
  /// barrier.
  Ranks {
    #[serde(default)]
    ranks: usize,
  },
}

impl Default for Distribution {
  fn default() -> Distribution {
    Distribution::Pool { workers: 0 }
  }
}

/// A sample whose model could not be written.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleFailure {
  pub index: usize,
  pub file_name: String,
  pub reason: String,
}

/// Result of one batch, gathered from every worker.
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
  /// Reports of the written models, in sample order.
  pub reports: Vec<MutationReport>,
  pub failed: Vec<SampleFailure>,
}

impl BatchOutcome {
  pub fn file_names(&self) -> impl Iterator<Item = &str> {
    self.reports.iter().map(|r| r.file_name.as_str())
  }

  /// Unresolved targets summed over all samples.
  pub fn target_failures(&self) -> usize {
    self.reports.iter().map(|r| r.failures().count()).sum()
  }

  fn gather(
    mut results: Vec<(usize, Result<MutationReport>)>,
    extension: &str,
  ) -> BatchOutcome {
    results.sort_by_key(|(index, _)| *index);
    let mut outcome = BatchOutcome::default();
    for (index, result) in results {
      match result {
        Ok(report) => outcome.reports.push(report),
        Err(err) => {
          error!("Sample {}: model not written: {}", index + 1, err);
          outcome.failed.push(SampleFailure {
            index,
            file_name: output_name(index, extension),
            reason: err.to_string(),
          });
        }
      }
    }
    outcome
  }
}

/// Creates `dir` if needed and removes everything inside it. Returns the
/// number of entries removed.
pub fn prepare_output_dir(dir: &Path) -> Result<usize> {
  fs::create_dir_all(dir).map_err(Error::io(dir))?;
  let mut removed = 0;
  for entry in fs::read_dir(dir).map_err(Error::io(dir))? {
    let path = entry.map_err(Error::io(dir))?.path();
    let file_type = fs::symlink_metadata(&path)
      .map_err(Error::io(&path))?
      .file_type();
    if file_type.is_dir() {
      fs::remove_dir_all(&path).map_err(Error::io(&path))?;
    } else {
      fs::remove_file(&path).map_err(Error::io(&path))?;
    }
    removed += 1;
  }
  if removed > 0 {
    debug!("Removed {} stale entries from {}.", removed, dir.display());
  }
  Ok(removed)
}

/// Writes one model per sample into `output_dir`, which is emptied first.
/// Every sample is handled by exactly one worker. A sample that cannot be
/// written is recorded in the outcome and does not stop the batch.
pub fn distribute(
  mutator: &Mutator,
  output_dir: &Path,
  samples: &[Sample],
  distribution: Distribution,
) -> Result<BatchOutcome> {
  let results: Vec<(usize, Result<MutationReport>)> = match distribution {
    Distribution::Pool { workers } => {
      prepare_output_dir(output_dir)?;
      let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
      info!(
        "Writing {} model(s) with {} worker thread(s).",
        samples.len(),
        pool.current_num_threads()
      );
      pool.install(|| {
        samples
          .par_iter()
          .enumerate()
          .map(|(i, sample)| (i, mutator.mutate(output_dir, i, sample)))
          .collect()
      })
    }
    Distribution::Ranks { ranks } => {
      let ranks = ranks.max(1);
      info!("Writing {} model(s) across {} rank(s).", samples.len(), ranks);
      run_ranks(mutator, output_dir, samples, ranks)?
    }
  };
  Ok(BatchOutcome::gather(results, mutator.extension()))
}

fn run_ranks(
  mutator: &Mutator,
  output_dir: &Path,
  samples: &[Sample],
  ranks: usize,
) -> Result<Vec<(usize, Result<MutationReport>)>> {
  let barrier = Barrier::new(ranks);
  let ready = AtomicBool::new(false);
  let prepare_error: Mutex<Option<Error>> = Mutex::new(None);

  let gathered = thread::scope(|scope| {
    let handles: Vec<_> = (0..ranks)
      .map(|rank| {
        let barrier = &barrier;
        let ready = &ready;
        let prepare_error = &prepare_error;
        scope.spawn(move || {
          if rank == 0 {
            match prepare_output_dir(output_dir) {
              Ok(_) => ready.store(true, Ordering::SeqCst),
              Err(err) => {
                if let Ok(mut slot) = prepare_error.lock() {
                  *slot = Some(err);
                }
              }
            }
          }
          // No rank writes before the directory is ready.
          barrier.wait();
          if !ready.load(Ordering::SeqCst) {
            return Vec::new();
          }
          let local: Vec<_> = (rank..samples.len())
            .step_by(ranks)
            .map(|i| (i, mutator.mutate(output_dir, i, &samples[i])))
            .collect();
          debug!("Rank {} wrote {} model(s).", rank, local.len());
          local
        })
      })
      .collect();

    // Every rank is joined; an unjoined panicked thread would make the
    // scope itself panic.
    let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
    gather_ranks(joined, samples.len())
  })?;

  let prepare_error = match prepare_error.into_inner() {
    Ok(slot) => slot,
    Err(poisoned) => poisoned.into_inner(),
  };
  if let Some(err) = prepare_error {
    return Err(err);
  }
  Ok(gathered)
}

/// Concatenates the per-rank results, or names the first rank that panicked.
fn gather_ranks<T>(joined: Vec<thread::Result<Vec<T>>>, capacity: usize) -> Result<Vec<T>> {
  let mut gathered = Vec::with_capacity(capacity);
  let mut panicked = Vec::new();
  for (rank, result) in joined.into_iter().enumerate() {
    match result {
      Ok(local) => gathered.extend(local),
      Err(_) => panicked.push(rank),
    }
  }
  match panicked.first() {
    Some(&rank) => {
      error!("Rank(s) {:?} panicked.", panicked);
      Err(Error::WorkerPanic(rank))
    }
    None => Ok(gathered),
  }
}
