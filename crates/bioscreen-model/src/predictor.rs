//! Scores an assembled feature table with a loaded booster.

use std::path::Path;

use bioscreen_common::config::ModelConfig;
use bioscreen_common::{FeatureTable, PipelineError, PredictionRecord, PredictionTable};
use tracing::{info, instrument};

use crate::booster::Booster;

pub struct Predictor {
    booster: Booster,
    value_column: String,
}

impl Predictor {
    pub fn new(booster: Booster, value_column: impl Into<String>) -> Self {
        Self {
            booster,
            value_column: value_column.into(),
        }
    }

    pub fn load(config: &ModelConfig) -> Result<Self, PipelineError> {
        Self::from_path(&config.path, &config.value_column)
    }

    pub fn from_path(path: &Path, value_column: &str) -> Result<Self, PipelineError> {
        Ok(Self::new(Booster::from_json_file(path)?, value_column))
    }

    pub fn booster(&self) -> &Booster {
        &self.booster
    }

    /// Feature columns must match the model's count and, when the model
    /// recorded names, its names in order.
    pub fn check_schema(&self, table: &FeatureTable) -> Result<(), PipelineError> {
        let expected = self.booster.num_feature();
        if table.columns.len() != expected {
            return Err(PipelineError::ModelShape(format!(
                "model expects {expected} features, got {}",
                table.columns.len()
            )));
        }
        if let Some(names) = self.booster.feature_names() {
            if let Some((pos, (want, got))) = names
                .iter()
                .zip(&table.columns)
                .enumerate()
                .find(|(_, (want, got))| want != got)
            {
                return Err(PipelineError::ModelShape(format!(
                    "feature {pos} is '{got}', model was trained with '{want}'"
                )));
            }
        }
        Ok(())
    }

    /// Scores every row. Output row `i` belongs to input row `i`.
    #[instrument(skip_all, fields(rows = table.len()))]
    pub fn predict(&self, table: &FeatureTable) -> Result<PredictionTable, PipelineError> {
        self.check_schema(table)?;

        let matrix: Vec<Vec<f64>> = table
            .rows
            .iter()
            .map(|row| row.values.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect();
        if let Some((i, row)) = matrix.iter().enumerate().find(|(_, r)| r.len() != table.columns.len()) {
            return Err(PipelineError::ModelShape(format!(
                "row {i} has {} values for {} columns",
                row.len(),
                table.columns.len()
            )));
        }

        let scores = self.booster.predict(&matrix);
        let mut out = PredictionTable::new(&table.id_column, &self.value_column);
        out.records = table
            .rows
            .iter()
            .zip(scores)
            .map(|(row, value)| PredictionRecord { id: row.id.clone(), value })
            .collect();
        info!(predictions = out.len(), "Scored feature table");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioscreen_common::FeatureRow;
    use bioscreen_test_utils::{stump, ModelJson};
    use pretty_assertions::assert_eq;

    fn table(columns: &[&str], rows: &[(&str, Vec<Option<f64>>)]) -> FeatureTable {
        let mut t = FeatureTable::new("Name", columns.iter().map(|c| c.to_string()).collect());
        t.rows = rows
            .iter()
            .map(|(id, values)| FeatureRow { id: id.to_string(), values: values.clone() })
            .collect();
        t
    }

    fn predictor(names: Option<Vec<&str>>) -> Predictor {
        let mut json = ModelJson::new(2).base_score(5.0).tree(stump(1, 0.5, 0.0, 1.0, true));
        if let Some(names) = names {
            json = json.feature_names(names);
        }
        Predictor::new(Booster::from_json_str(&json.to_json()).unwrap(), "pIC50")
    }

    #[test]
    fn test_predictions_pair_by_position() {
        let t = table(
            &["MW", "fp_7"],
            &[("b", vec![Some(1.0), Some(1.0)]), ("a", vec![Some(1.0), Some(0.0)]), ("b", vec![None, None])],
        );
        let out = predictor(None).predict(&t).unwrap();
        assert_eq!(out.len(), t.len());
        assert_eq!(out.id_column, "Name");
        assert_eq!(out.value_column, "pIC50");
        let got: Vec<(&str, f64)> = out.records.iter().map(|r| (r.id.as_str(), r.value)).collect();
        assert_eq!(got, vec![("b", 6.0), ("a", 5.0), ("b", 5.0)]);
    }

    #[test]
    fn test_feature_count_mismatch_is_shape_error() {
        let t = table(&["fp_7"], &[("a", vec![Some(1.0)])]);
        let err = predictor(None).predict(&t).unwrap_err();
        assert!(matches!(err, PipelineError::ModelShape(_)), "{err}");
    }

    #[test]
    fn test_feature_order_checked_against_model_names() {
        let p = predictor(Some(vec!["MW", "fp_7"]));
        let ok = table(&["MW", "fp_7"], &[("a", vec![Some(1.0), Some(1.0)])]);
        assert!(p.predict(&ok).is_ok());

        let swapped = table(&["fp_7", "MW"], &[("a", vec![Some(1.0), Some(1.0)])]);
        let err = p.predict(&swapped).unwrap_err();
        assert!(err.to_string().contains("feature 0"), "{err}");
    }

    #[test]
    fn test_empty_table_scores_to_empty_predictions() {
        let t = table(&["MW", "fp_7"], &[]);
        assert!(predictor(None).predict(&t).unwrap().is_empty());
    }
}
