//! Record types shared by every pipeline stage.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Structure records (input)
// ---------------------------------------------------------------------------

/// One uploaded molecule: a SMILES string and the identifier that keys it
/// through every later stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub id: String,
    pub smiles: String,
}

impl StructureRecord {
    pub fn new(id: impl Into<String>, smiles: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            smiles: smiles.into(),
        }
    }
}

/// Reads the upload format: comma separated, no header, `SMILES,ID` per row.
pub fn read_structures(path: &Path) -> Result<Vec<StructureRecord>> {
    if !path.exists() {
        return Err(PipelineError::MissingInput(format!(
            "input file not found: {}",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::csv(path, e))?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| PipelineError::csv(path, e))?;
        if row.iter().all(|f| f.is_empty()) {
            continue;
        }
        if row.len() < 2 {
            return Err(PipelineError::SchemaMismatch(format!(
                "{} line {}: expected 'SMILES,ID', found {} field(s)",
                path.display(),
                line + 1,
                row.len()
            )));
        }
        records.push(StructureRecord::new(&row[1], &row[0]));
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Feature table (assembled model input)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub id: String,
    /// One entry per feature column; None is a missing value.
    pub values: Vec<Option<f64>>,
}

/// Identifier column plus an ordered list of numeric feature columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub id_column: String,
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(id_column: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            id_column: id_column.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.id.as_str())
    }

    /// Identifier first, then features. Missing values become empty cells.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| PipelineError::csv(path, e))?;
        let header = std::iter::once(self.id_column.as_str()).chain(self.columns.iter().map(String::as_str));
        writer.write_record(header).map_err(|e| PipelineError::csv(path, e))?;
        for row in &self.rows {
            let cells = std::iter::once(row.id.clone())
                .chain(row.values.iter().map(|v| v.map(format_value).unwrap_or_default()));
            writer.write_record(cells).map_err(|e| PipelineError::csv(path, e))?;
        }
        writer.flush().map_err(|e| PipelineError::io(path, e))?;
        Ok(())
    }
}

/// Empty or non-numeric cells are missing values.
pub fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

// ---------------------------------------------------------------------------
// Predictions (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub value: f64,
}

/// Model output paired positionally with the identifiers it was scored for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    pub id_column: String,
    pub value_column: String,
    pub records: Vec<PredictionRecord>,
}

impl PredictionTable {
    pub fn new(id_column: impl Into<String>, value_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            value_column: value_column.into(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| PipelineError::csv(path, e))?;
        writer
            .write_record([self.id_column.as_str(), self.value_column.as_str()])
            .map_err(|e| PipelineError::csv(path, e))?;
        for record in &self.records {
            writer
                .write_record([record.id.clone(), record.value.to_string()])
                .map_err(|e| PipelineError::csv(path, e))?;
        }
        writer.flush().map_err(|e| PipelineError::io(path, e))?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| PipelineError::csv(path, e))?;
        let headers = reader.headers().map_err(|e| PipelineError::csv(path, e))?.clone();
        if headers.len() != 2 {
            return Err(PipelineError::SchemaMismatch(format!(
                "{}: expected 2 columns, found {}",
                path.display(),
                headers.len()
            )));
        }
        let mut table = PredictionTable::new(&headers[0], &headers[1]);
        for row in reader.records() {
            let row = row.map_err(|e| PipelineError::csv(path, e))?;
            let value = row[1].parse::<f64>().map_err(|e| {
                PipelineError::SchemaMismatch(format!("{}: bad value '{}': {e}", path.display(), &row[1]))
            })?;
            table.records.push(PredictionRecord { id: row[0].to_string(), value });
        }
        Ok(table)
    }
}
