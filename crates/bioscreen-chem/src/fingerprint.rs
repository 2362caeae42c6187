//! Fingerprint table for a batch of structures.
//!
//! Every input record yields exactly one row, in input order. A structure
//! that fails to parse gets an all-missing row and a warning instead of
//! aborting the batch; `compute_strict` turns that into an error for callers
//! that need every structure to be valid.

use std::path::Path;

use bioscreen_common::config::FingerprintConfig;
use bioscreen_common::{PipelineError, StructureRecord};
use tracing::{debug, warn};

use crate::morgan::{morgan_fingerprint, BitVector};
use crate::smiles::{parse_smiles, SmilesError};

#[derive(Debug, Clone, PartialEq)]
pub enum FingerprintVector {
    Bits(BitVector),
    /// Structure could not be parsed; every position is missing.
    Missing { len: usize },
}

impl FingerprintVector {
    pub fn len(&self) -> usize {
        match self {
            FingerprintVector::Bits(bits) => bits.len(),
            FingerprintVector::Missing { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FingerprintVector::Missing { .. })
    }

    /// Bit at `index` as 0/1, or None when the structure was unparseable.
    pub fn value(&self, index: usize) -> Option<u8> {
        match self {
            FingerprintVector::Bits(bits) => Some(bits.get(index) as u8),
            FingerprintVector::Missing { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintRow {
    pub id: String,
    pub vector: FingerprintVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintTable {
    pub n_bits: usize,
    pub column_prefix: String,
    pub rows: Vec<FingerprintRow>,
}

impl FingerprintTable {
    /// `fp_0 .. fp_{n_bits-1}` with the configured prefix.
    pub fn column_names(&self) -> Vec<String> {
        (0..self.n_bits).map(|i| format!("{}{i}", self.column_prefix)).collect()
    }

    /// Position of a column name like `fp_17`, if it belongs to this table.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let idx: usize = name.strip_prefix(&self.column_prefix)?.parse().ok()?;
        (idx < self.n_bits && format!("{}{idx}", self.column_prefix) == name).then_some(idx)
    }

    pub fn missing_count(&self) -> usize {
        self.rows.iter().filter(|r| r.vector.is_missing()).count()
    }

    /// Bit columns first, identifier last. Missing values are empty cells.
    pub fn write_csv(&self, path: &Path, id_column: &str) -> Result<(), PipelineError> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| PipelineError::csv(path, e))?;
        let mut header = self.column_names();
        header.push(id_column.to_string());
        writer.write_record(&header).map_err(|e| PipelineError::csv(path, e))?;

        for row in &self.rows {
            let mut record: Vec<String> = (0..self.n_bits)
                .map(|i| row.vector.value(i).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            record.push(row.id.clone());
            writer.write_record(&record).map_err(|e| PipelineError::csv(path, e))?;
        }
        writer.flush().map_err(|e| PipelineError::io(path, e))?;
        Ok(())
    }
}

/// Computes Morgan fingerprints with a fixed radius and width.
#[derive(Debug, Clone)]
pub struct FingerprintComputer {
    pub radius: u32,
    pub n_bits: usize,
    pub column_prefix: String,
}

impl FingerprintComputer {
    pub fn new(radius: u32, n_bits: usize) -> Self {
        Self {
            radius,
            n_bits,
            column_prefix: "fp_".to_string(),
        }
    }

    pub fn from_config(config: &FingerprintConfig) -> Self {
        Self {
            radius: config.radius,
            n_bits: config.n_bits,
            column_prefix: config.column_prefix.clone(),
        }
    }

    pub fn try_compute_one(&self, smiles: &str) -> Result<BitVector, SmilesError> {
        let mol = parse_smiles(smiles)?;
        Ok(morgan_fingerprint(&mol, self.radius, self.n_bits))
    }

    /// Fingerprint of a single structure; unparseable input gives an
    /// all-missing vector.
    pub fn compute_one(&self, smiles: &str) -> FingerprintVector {
        match self.try_compute_one(smiles) {
            Ok(bits) => FingerprintVector::Bits(bits),
            Err(_) => FingerprintVector::Missing { len: self.n_bits },
        }
    }

    fn row_for(&self, record: &StructureRecord) -> FingerprintRow {
        let vector = match self.try_compute_one(&record.smiles) {
            Ok(bits) => FingerprintVector::Bits(bits),
            Err(e) => {
                warn!(id = %record.id, smiles = %record.smiles, error = %e, "Unparseable structure, emitting missing fingerprint");
                FingerprintVector::Missing { len: self.n_bits }
            }
        };
        FingerprintRow {
            id: record.id.clone(),
            vector,
        }
    }

    pub fn compute(&self, records: &[StructureRecord]) -> FingerprintTable {
        let rows: Vec<FingerprintRow> = records.iter().map(|r| self.row_for(r)).collect();
        let table = FingerprintTable {
            n_bits: self.n_bits,
            column_prefix: self.column_prefix.clone(),
            rows,
        };
        debug!(
            rows = table.rows.len(),
            missing = table.missing_count(),
            "Computed fingerprints"
        );
        table
    }

    /// Like [`compute`](Self::compute) but fails on the first unparseable structure.
    pub fn compute_strict(&self, records: &[StructureRecord]) -> Result<FingerprintTable, PipelineError> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let bits = self
                .try_compute_one(&record.smiles)
                .map_err(|e| PipelineError::Structure {
                    id: record.id.clone(),
                    reason: e.to_string(),
                })?;
            rows.push(FingerprintRow {
                id: record.id.clone(),
                vector: FingerprintVector::Bits(bits),
            });
        }
        Ok(FingerprintTable {
            n_bits: self.n_bits,
            column_prefix: self.column_prefix.clone(),
            rows,
        })
    }
}

impl Default for FingerprintComputer {
    fn default() -> Self {
        Self::from_config(&FingerprintConfig::default())
    }
}
