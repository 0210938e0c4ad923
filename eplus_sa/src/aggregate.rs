use crate::error::{Error, Result};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Meter report written by the simulator in each run directory.
pub const METER_FILE: &str = "eplusmtr.csv";

/// Joules per kilowatt-hour.
pub const J_PER_KWH: f64 = 3.6e6;

/// British thermal units per joule.
pub const BTU_PER_J: f64 = 0.000947817;

/// What `collect_meters` found.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregation {
  pub simulations: usize,
  pub rows: usize,
  /// Sample numbers (1-based) without a meter report.
  pub missing: Vec<usize>,
}

struct MeterTable {
  headers: Vec<String>,
  rows: Vec<Vec<String>>,
}

fn read_meters(path: &Path) -> Result<Option<MeterTable>> {
  if !path.is_file() {
    return Ok(None);
  }
  let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
  let headers = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
  let mut rows = Vec::new();
  for record in reader.records() {
    rows.push(record?.iter().map(str::to_string).collect());
  }
  Ok(Some(MeterTable { headers, rows }))
}

// A derived column: source column, new name, factor.
type Conversion = (usize, String, f64);

fn conversions(headers: &[String]) -> Vec<Conversion> {
  let mut out = Vec::new();
  for (i, h) in headers.iter().enumerate() {
    if h.contains("[J](") {
      out.push((i, h.replace("[J]", "[KJ]"), 1e-3));
      out.push((i, h.replace("[J]", "[kWh]"), 1.0 / J_PER_KWH));
    }
  }
  for (i, h) in headers.iter().enumerate() {
    if h.contains("[J](") && (h.contains("HVAC") || h.contains("NaturalGas")) {
      out.push((i, h.replace("[J]", "[BTU]"), BTU_PER_J));
    }
  }
  out
}

/// Combines `<sim_dir>/randomized_<i>/eplusmtr.csv` for `i` in `1..=count`
/// into one CSV at `output`, adding a `Simulation_ID` column and kJ, kWh
/// and BTU columns for every joule meter. Missing reports are warned about
/// and skipped; finding none at all is an error.
pub fn collect_meters(sim_dir: &Path, count: usize, output: &Path) -> Result<Aggregation> {
  let tables: Vec<(usize, Option<MeterTable>)> = (1..=count)
    .into_par_iter()
    .map(|i| {
      let path = sim_dir.join(format!("randomized_{}", i)).join(METER_FILE);
      read_meters(&path).map(|t| (i, t))
    })
    .collect::<Result<_>>()?;

  let mut aggregation = Aggregation::default();
  let mut headers: Option<Vec<String>> = None;
  for (i, table) in &tables {
    match table {
      Some(table) => {
        aggregation.simulations += 1;
        if headers.is_none() {
          headers = Some(table.headers.clone());
        }
      }
      None => {
        warn!("Meter report not found for simulation {}.", i);
        aggregation.missing.push(*i);
      }
    }
  }
  let headers = match headers {
    Some(headers) => headers,
    None => {
      return Err(Error::NoResults {
        dir: sim_dir.to_path_buf(),
      })
    }
  };

  if let Some(parent) = output.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent).map_err(Error::io(parent))?;
    }
  }
  let conversions = conversions(&headers);
  let mut writer = csv::Writer::from_path(output)?;
  let mut header_row = headers.clone();
  header_row.push("Simulation_ID".to_string());
  header_row.extend(conversions.iter().map(|(_, name, _)| name.clone()));
  writer.write_record(&header_row)?;

  for (i, table) in &tables {
    let table = match table {
      Some(table) => table,
      None => continue,
    };
    // Columns are matched by name; a report with a different layout
    // leaves the unknown columns empty.
    let positions: Vec<Option<usize>> = headers
      .iter()
      .map(|h| table.headers.iter().position(|t| t == h))
      .collect();
    for row in &table.rows {
      let mut out: Vec<String> = positions
        .iter()
        .map(|p| p.and_then(|p| row.get(p)).cloned().unwrap_or_default())
        .collect();
      let values = out.clone();
      out.push(i.to_string());
      for (column, _, factor) in &conversions {
        let converted = values[*column]
          .trim()
          .parse::<f64>()
          .map(|v| format!("{:.2}", v * factor))
          .unwrap_or_default();
        out.push(converted);
      }
      writer.write_record(&out)?;
      aggregation.rows += 1;
    }
  }
  writer.flush().map_err(Error::io(output))?;
  info!(
    "Combined {} simulation(s) into {} row(s) at {}.",
    aggregation.simulations,
    aggregation.rows,
    output.display()
  );
  Ok(aggregation)
}
