//! Joins descriptor and fingerprint tables on the structure identifier and
//! projects the result onto the model's reference feature list.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use bioscreen_chem::FingerprintTable;
use bioscreen_common::{FeatureRow, FeatureTable, PipelineError};
use serde::Serialize;
use tracing::{info, warn};

use crate::descriptors::DescriptorTable;

/// Reads the ordered feature names from a CSV with a header.
pub fn load_feature_list(path: &Path, column: &str) -> Result<Vec<String>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingInput(format!(
            "reference feature list not found: {}",
            path.display()
        )));
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::csv(path, e))?;
    let headers = reader.headers().map_err(|e| PipelineError::csv(path, e))?.clone();
    let idx = headers.iter().position(|h| h == column).ok_or_else(|| {
        PipelineError::SchemaMismatch(format!("{}: no '{column}' column", path.display()))
    })?;

    let mut names = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| PipelineError::csv(path, e))?;
        match row.get(idx) {
            Some(name) if !name.is_empty() => names.push(name.to_string()),
            _ => {}
        }
    }
    Ok(names)
}

/// Identifiers that only one side of the join had.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinReport {
    pub descriptor_only: Vec<String>,
    pub fingerprint_only: Vec<String>,
}

impl JoinReport {
    pub fn is_clean(&self) -> bool {
        self.descriptor_only.is_empty() && self.fingerprint_only.is_empty()
    }

    /// One human-readable line per dropped identifier.
    pub fn warnings(&self) -> Vec<String> {
        let desc = self
            .descriptor_only
            .iter()
            .map(|id| format!("'{id}' dropped: no fingerprint row"));
        let fp = self
            .fingerprint_only
            .iter()
            .map(|id| format!("'{id}' dropped: no descriptor row"));
        desc.chain(fp).collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Descriptor(usize),
    Fingerprint(usize),
}

pub struct FeatureAssembler {
    features: Vec<String>,
    id_column: String,
}

impl FeatureAssembler {
    pub fn new(features: Vec<String>, id_column: impl Into<String>) -> Self {
        Self {
            features,
            id_column: id_column.into(),
        }
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    fn resolve(
        &self,
        descriptors: &DescriptorTable,
        fingerprints: &FingerprintTable,
    ) -> Result<Vec<Source>, PipelineError> {
        let mut sources = Vec::with_capacity(self.features.len());
        let mut missing = Vec::new();
        for name in &self.features {
            if let Some(i) = descriptors.column_index(name) {
                sources.push(Source::Descriptor(i));
            } else if let Some(i) = fingerprints.column_index(name) {
                sources.push(Source::Fingerprint(i));
            } else {
                missing.push(name.as_str());
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch(format!(
                "reference features not found in descriptors or fingerprints: {}",
                missing.join(", ")
            )));
        }
        Ok(sources)
    }

    /// Inner join in descriptor-row order. Duplicate identifiers produce every
    /// matching pair.
    pub fn assemble(
        &self,
        descriptors: &DescriptorTable,
        fingerprints: &FingerprintTable,
    ) -> Result<(FeatureTable, JoinReport), PipelineError> {
        let sources = self.resolve(descriptors, fingerprints)?;

        let mut by_id: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, row) in fingerprints.rows.iter().enumerate() {
            by_id.entry(row.id.as_str()).or_default().push(i);
        }

        let mut table = FeatureTable::new(&self.id_column, self.features.clone());
        let mut report = JoinReport::default();
        let mut matched: HashSet<&str> = HashSet::new();

        for drow in &descriptors.rows {
            let Some(fp_rows) = by_id.get(drow.name.as_str()) else {
                if !report.descriptor_only.contains(&drow.name) {
                    report.descriptor_only.push(drow.name.clone());
                }
                continue;
            };
            matched.insert(drow.name.as_str());
            for &fi in fp_rows {
                let frow = &fingerprints.rows[fi];
                let values = sources
                    .iter()
                    .map(|src| match *src {
                        Source::Descriptor(c) => drow.values.get(c).copied().flatten(),
                        Source::Fingerprint(c) => frow.vector.value(c).map(f64::from),
                    })
                    .collect();
                table.rows.push(FeatureRow { id: drow.name.clone(), values });
            }
        }

        for frow in &fingerprints.rows {
            if !matched.contains(frow.id.as_str()) && !report.fingerprint_only.contains(&frow.id) {
                report.fingerprint_only.push(frow.id.clone());
            }
        }

        for line in report.warnings() {
            warn!("{line}");
        }
        info!(
            rows = table.len(),
            features = table.columns.len(),
            dropped = report.descriptor_only.len() + report.fingerprint_only.len(),
            "Assembled feature table"
        );
        Ok((table, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::DescriptorRow;
    use bioscreen_chem::FingerprintComputer;
    use bioscreen_common::StructureRecord;
    use pretty_assertions::assert_eq;

    fn descriptors(names: &[&str]) -> DescriptorTable {
        DescriptorTable {
            columns: vec!["MW".into(), "XLogP".into(), "nHBDon".into()],
            rows: names
                .iter()
                .enumerate()
                .map(|(i, n)| DescriptorRow {
                    name: n.to_string(),
                    values: vec![Some(100.0 + i as f64), None, Some(1.0)],
                })
                .collect(),
        }
    }

    fn fingerprints(rows: &[(&str, &str)]) -> FingerprintTable {
        let records: Vec<StructureRecord> =
            rows.iter().map(|(id, smi)| StructureRecord::new(*id, *smi)).collect();
        FingerprintComputer::new(2, 16).compute(&records)
    }

    #[test]
    fn test_output_columns_are_exactly_id_plus_features() {
        let assembler = FeatureAssembler::new(vec!["fp_3".into(), "MW".into()], "Name");
        let (table, _) = assembler
            .assemble(&descriptors(&["a"]), &fingerprints(&[("a", "CCO")]))
            .unwrap();
        assert_eq!(table.id_column, "Name");
        assert_eq!(table.columns, vec!["fp_3", "MW"]);
        assert_eq!(table.rows[0].values.len(), 2);
        assert_eq!(table.rows[0].values[1], Some(100.0));
    }

    #[test]
    fn test_partial_overlap_drops_and_reports() {
        let assembler = FeatureAssembler::new(vec!["MW".into(), "fp_0".into()], "Name");
        let (table, report) = assembler
            .assemble(
                &descriptors(&["a", "b", "c"]),
                &fingerprints(&[("b", "CCO"), ("c", "CCN"), ("d", "CCC")]),
            )
            .unwrap();
        let ids: Vec<&str> = table.ids().collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(report.descriptor_only, vec!["a"]);
        assert_eq!(report.fingerprint_only, vec!["d"]);
        assert_eq!(report.warnings().len(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_descriptor_columns_win_over_fingerprint_names() {
        let mut desc = descriptors(&["a"]);
        desc.columns[2] = "fp_1".into();
        let assembler = FeatureAssembler::new(vec!["fp_1".into()], "Name");
        let (table, report) = assembler.assemble(&desc, &fingerprints(&[("a", "CCO")])).unwrap();
        assert_eq!(table.rows[0].values, vec![Some(1.0)]);
        assert!(report.is_clean());
    }

    #[test]
    fn test_missing_fingerprint_stays_missing() {
        let assembler = FeatureAssembler::new(vec!["fp_0".into(), "fp_15".into()], "Name");
        let (table, _) = assembler
            .assemble(&descriptors(&["bad"]), &fingerprints(&[("bad", "C1CC")]))
            .unwrap();
        assert_eq!(table.rows[0].values, vec![None, None]);
    }

    #[test]
    fn test_duplicate_ids_produce_every_pair() {
        let assembler = FeatureAssembler::new(vec!["MW".into()], "Name");
        let (table, _) = assembler
            .assemble(&descriptors(&["a", "a"]), &fingerprints(&[("a", "CCO"), ("a", "CCN")]))
            .unwrap();
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_unknown_feature_is_schema_error() {
        let assembler = FeatureAssembler::new(vec!["MW".into(), "TPSA".into(), "fp_99".into()], "Name");
        let err = assembler
            .assemble(&descriptors(&["a"]), &fingerprints(&[("a", "CCO")]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
        assert!(msg.contains("TPSA") && msg.contains("fp_99"), "{msg}");
    }

    #[test]
    fn test_load_feature_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top.csv");
        std::fs::write(&path, "Rank,Feature\n1,PubchemFP12\n2,fp_4\n3,\n").unwrap();
        assert_eq!(load_feature_list(&path, "Feature").unwrap(), vec!["PubchemFP12", "fp_4"]);

        let err = load_feature_list(&path, "Name").unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));

        let err = load_feature_list(&dir.path().join("nope.csv"), "Feature").unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }
}
