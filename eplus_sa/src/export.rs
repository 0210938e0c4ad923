use crate::error::{Error, Result};
use crate::schema::ParameterSchema;
use prettytable::format::Alignment;
use prettytable::{Cell, Row, Table};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the provenance table written next to the generated models.
pub const PROVENANCE_FILE: &str = "simulation_parameters.csv";

/// Links one generated model file to the sample it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvenanceRecord {
  pub file_name: String,
  /// Realized values in schema order.
  pub values: Vec<f64>,
  /// Seed of the ensemble member the sample belongs to.
  pub run_id: Option<u64>,
}

/// An interface to a sink accepting the provenance of a batch.
pub trait Exporter {
  /// Exports every record of a batch at once. Records are in sample order.
  fn export(
    &mut self,
    schema: &ParameterSchema,
    records: &[ProvenanceRecord],
  ) -> Result<()>;
}

/// Writes provenance as CSV: the file name, one column per parameter in
/// schema order and, when any record carries one, the seed.
pub struct CsvExporter {
  path: PathBuf,
}

impl CsvExporter {
  pub fn new(path: &Path) -> CsvExporter {
    CsvExporter {
      path: path.to_path_buf(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Exporter for CsvExporter {
  fn export(
    &mut self,
    schema: &ParameterSchema,
    records: &[ProvenanceRecord],
  ) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).map_err(Error::io(parent))?;
      }
    }
    let with_seed = records.iter().any(|r| r.run_id.is_some());
    let mut writer = csv::Writer::from_path(&self.path)?;

    let mut header = vec!["IDF_file".to_string()];
    header.extend(schema.names().map(str::to_string));
    if with_seed {
      header.push("seed".to_string());
    }
    writer.write_record(&header)?;

    for record in records {
      let mut row = Vec::with_capacity(header.len());
      row.push(record.file_name.clone());
      row.extend(record.values.iter().map(|v| v.to_string()));
      if with_seed {
        row.push(record.run_id.map(|s| s.to_string()).unwrap_or_default());
      }
      writer.write_record(&row)?;
    }
    writer.flush().map_err(Error::io(&self.path))?;
    info!(
      "Provenance of {} sample(s) saved to {}.",
      records.len(),
      self.path.display()
    );
    Ok(())
  }
}

/// Prints the provenance as a table on stdout.
pub struct DebugExporter {
  /// Rows printed at most; the rest are summarized in a count.
  pub max_rows: usize,
}

impl DebugExporter {
  pub fn new() -> DebugExporter {
    DebugExporter { max_rows: 20 }
  }
}

impl Default for DebugExporter {
  fn default() -> DebugExporter {
    DebugExporter::new()
  }
}

/// Provenance rendered as a table, truncated to `max_rows` rows.
pub fn provenance_table(
  schema: &ParameterSchema,
  records: &[ProvenanceRecord],
  max_rows: usize,
) -> Table {
  let mut table = Table::new();
  let mut titles = vec![Cell::new("IDF_file")];
  titles.extend(schema.names().map(Cell::new));
  table.set_titles(Row::new(titles));
  for record in records.iter().take(max_rows) {
    let mut cells = vec![Cell::new(&record.file_name)];
    cells.extend(
      record
        .values
        .iter()
        .map(|v| Cell::new_align(&format!("{:.4}", v), Alignment::RIGHT)),
    );
    table.add_row(Row::new(cells));
  }
  table
}

impl Exporter for DebugExporter {
  fn export(
    &mut self,
    schema: &ParameterSchema,
    records: &[ProvenanceRecord],
  ) -> Result<()> {
    println!("Provenance:");
    provenance_table(schema, records, self.max_rows).printstd();
    if records.len() > self.max_rows {
      println!("... and {} more.", records.len() - self.max_rows);
    }
    println!();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::{ParameterSpec, SchemaBuilder};

  fn schema() -> ParameterSchema {
    let mut builder = SchemaBuilder::new();
    builder
      .register(ParameterSpec::new("heating_setpoint", 22.0, 1.1))
      .unwrap();
    builder
      .register(ParameterSpec::new("cooling_setpoint", 26.6, 1.33))
      .unwrap();
    builder
      .freeze("heating_setpoint", "cooling_setpoint", 4.0)
      .unwrap()
  }

  fn record(i: usize, run_id: Option<u64>) -> ProvenanceRecord {
    ProvenanceRecord {
      file_name: format!("randomized_{}.idf", i),
      values: vec![21.5, 26.25],
      run_id,
    }
  }

  #[test]
  fn csv_columns_follow_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join(PROVENANCE_FILE);
    let mut exporter = CsvExporter::new(&path);
    exporter
      .export(&schema(), &[record(1, None), record(2, None)])
      .unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "IDF_file,heating_setpoint,cooling_setpoint");
    assert_eq!(lines[1], "randomized_1.idf,21.5,26.25");
    assert_eq!(lines.len(), 3);
  }

  #[test]
  fn seed_column_for_ensemble_members() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(PROVENANCE_FILE);
    CsvExporter::new(&path)
      .export(&schema(), &[record(1, Some(7))])
      .unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("IDF_file,heating_setpoint,cooling_setpoint,seed\n"));
    assert!(text.contains("randomized_1.idf,21.5,26.25,7"));
  }

  #[test]
  fn table_is_truncated() {
    let records: Vec<_> = (1..=5).map(|i| record(i, None)).collect();
    let table = provenance_table(&schema(), &records, 3);
    assert_eq!(table.len(), 3);
    assert!(table.to_string().contains("randomized_3.idf"));
  }
}
