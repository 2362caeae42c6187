//! End-to-end prediction pipeline.
//!
//! Orchestrates one run for an uploaded structure file:
//!   1. Read `SMILES,ID` records
//!   2. Compute PaDEL descriptors (child process)
//!   3. Compute Morgan fingerprints (blocking pool)
//!   4. Join on identifier and project onto the reference feature list
//!   5. Score with the XGBoost model
//!   6. Write `predictions.csv` next to the input
//!   7. Remove the run directory, whatever the outcome
//!
//! Progress events go out over a broadcast channel so the web shell can
//! stream them; the CLI passes `None`.

use std::path::PathBuf;
use std::sync::Arc;

use bioscreen_chem::FingerprintComputer;
use bioscreen_common::entities::read_structures;
use bioscreen_common::{Config, PipelineError, PredictionTable};
use bioscreen_model::Predictor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::descriptors::{DescriptorSource, PadelRunner};
use crate::features::{load_feature_list, FeatureAssembler};
use crate::workspace::RunDir;

// ── Request ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRequest {
    pub run_id: Uuid,
    pub input: PathBuf,
    /// Overrides the default `<input dir>/predictions.csv`.
    pub output: Option<PathBuf>,
}

impl PipelineRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            input: input.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Reading,
    Descriptors,
    Fingerprints,
    Joining,
    Predicting,
    Writing,
    Cleanup,
    Done,
    Failed,
}

/// Progress event emitted during a run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineProgress {
    pub run_id: Uuid,
    pub stage: PipelineStage,
    pub message: String,
    /// Set for non-fatal problems such as identifiers dropped by the join.
    pub warning: bool,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub input: PathBuf,
    pub output: PathBuf,
    pub predictions: PredictionTable,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: Config,
    descriptors: Arc<dyn DescriptorSource>,
}

impl Pipeline {
    /// Pipeline using PaDEL-Descriptor as configured.
    pub fn new(config: Config) -> Self {
        let runner = PadelRunner::from_config(&config.descriptor);
        Self::with_descriptor_source(config, Arc::new(runner))
    }

    pub fn with_descriptor_source(config: Config, descriptors: Arc<dyn DescriptorSource>) -> Self {
        Self { config, descriptors }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs every stage for `request`. The run directory is removed before
    /// this returns, on success and on failure.
    #[instrument(skip(self, progress_tx, cancel), fields(input = %request.input.display()))]
    pub async fn run(
        &self,
        request: &PipelineRequest,
        progress_tx: Option<broadcast::Sender<PipelineProgress>>,
        cancel: CancelToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let run_id = request.run_id;
        let started_at = Utc::now();
        info!(run_id = %run_id, "Starting prediction pipeline");

        let emit = |stage: PipelineStage, message: String, warning: bool| {
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(PipelineProgress { run_id, stage, message, warning });
            }
        };

        if !request.input.is_file() {
            let err = PipelineError::MissingInput(format!(
                "input file not found: {}",
                request.input.display()
            ));
            emit(PipelineStage::Failed, err.to_string(), false);
            return Err(err);
        }

        let run = match RunDir::create(&self.config.workspace.path, run_id).await {
            Ok(run) => run,
            Err(e) => {
                emit(PipelineStage::Failed, e.to_string(), false);
                return Err(e);
            }
        };

        let mut warnings = Vec::new();
        let result = self.run_stages(request, &run, &cancel, &emit, &mut warnings).await;

        emit(PipelineStage::Cleanup, "Removing intermediate files".into(), false);
        run.cleanup().await;

        match result {
            Ok((output, predictions)) => {
                let msg = format!("{} predictions written to {}", predictions.len(), output.display());
                info!(run_id = %run_id, "{msg}");
                emit(PipelineStage::Done, msg, false);
                Ok(PipelineOutcome {
                    run_id,
                    input: request.input.clone(),
                    output,
                    predictions,
                    warnings,
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(e) => {
                match &e {
                    PipelineError::Cancelled => warn!(run_id = %run_id, "Pipeline cancelled"),
                    other => error!(run_id = %run_id, kind = %other.kind(), error = %other, "Pipeline failed"),
                }
                emit(PipelineStage::Failed, e.to_string(), false);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &PipelineRequest,
        run: &RunDir,
        cancel: &CancelToken,
        emit: &(dyn Fn(PipelineStage, String, bool) + Sync),
        warnings: &mut Vec<String>,
    ) -> Result<(PathBuf, PredictionTable), PipelineError> {
        // ── 1. Structures ────────────────────────────────────────────────────
        emit(PipelineStage::Reading, format!("Reading {}", request.input.display()), false);
        let records = read_structures(&request.input)?;
        if records.is_empty() {
            return Err(PipelineError::MissingInput(format!(
                "{} contains no structures",
                request.input.display()
            )));
        }
        info!(records = records.len(), "Structures loaded");
        cancel.check()?;

        // ── 2. Descriptors ───────────────────────────────────────────────────
        emit(
            PipelineStage::Descriptors,
            format!("Calculating descriptors with {} for {} structures", self.descriptors.name(), records.len()),
            false,
        );
        let descriptors = self.descriptors.compute(&records, run, cancel).await?;
        cancel.check()?;

        // ── 3. Fingerprints ──────────────────────────────────────────────────
        emit(PipelineStage::Fingerprints, "Calculating Morgan fingerprints".into(), false);
        let computer = FingerprintComputer::from_config(&self.config.fingerprint);
        let fingerprints = {
            let records = records.clone();
            match tokio::task::spawn_blocking(move || computer.compute(&records)).await {
                Ok(table) => table,
                Err(e) => std::panic::resume_unwind(e.into_panic()),
            }
        };
        for row in fingerprints.rows.iter().filter(|r| r.vector.is_missing()) {
            let msg = format!("'{}': unparseable structure, fingerprint left missing", row.id);
            emit(PipelineStage::Fingerprints, msg.clone(), true);
            warnings.push(msg);
        }
        cancel.check()?;

        // ── 4. Join + projection ─────────────────────────────────────────────
        emit(PipelineStage::Joining, "Joining descriptors and fingerprints".into(), false);
        let features = load_feature_list(&self.config.features.reference, &self.config.features.column)?;
        let assembler = FeatureAssembler::new(features, &self.config.features.id_column);
        let (table, report) = assembler.assemble(&descriptors, &fingerprints)?;
        for msg in report.warnings() {
            emit(PipelineStage::Joining, msg.clone(), true);
            warnings.push(msg);
        }
        table.write_csv(&run.filtered_features())?;
        cancel.check()?;

        // ── 5. Prediction ────────────────────────────────────────────────────
        emit(PipelineStage::Predicting, format!("Scoring {} rows", table.len()), false);
        let predictor = Predictor::load(&self.config.model)?;
        let predictions = predictor.predict(&table)?;
        cancel.check()?;

        // ── 6. Output ────────────────────────────────────────────────────────
        let output = request
            .output
            .clone()
            .unwrap_or_else(|| self.config.output.path_for(&request.input));
        emit(PipelineStage::Writing, format!("Writing {}", output.display()), false);
        predictions.write_csv(&output)?;

        Ok((output, predictions))
    }
}

/// One-shot run without progress reporting or cancellation.
pub async fn run_pipeline(config: &Config, request: &PipelineRequest) -> Result<PredictionTable, PipelineError> {
    let outcome = Pipeline::new(config.clone())
        .run(request, None, CancelToken::new())
        .await?;
    Ok(outcome.predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{DescriptorRow, DescriptorTable};
    use async_trait::async_trait;
    use bioscreen_common::StructureRecord;
    use bioscreen_test_utils::{stump, write_feature_list, write_input, ModelJson};
    use std::sync::Mutex;

    /// Returns one descriptor row per record with a constant `MW`, except for
    /// identifiers listed in `skip`.
    struct MockDescriptors {
        skip: Vec<String>,
        seen_dir: Mutex<Option<PathBuf>>,
    }

    impl MockDescriptors {
        fn new() -> Self {
            Self { skip: Vec::new(), seen_dir: Mutex::new(None) }
        }

        fn skipping(mut self, id: &str) -> Self {
            self.skip.push(id.to_string());
            self
        }
    }

    #[async_trait]
    impl DescriptorSource for MockDescriptors {
        fn name(&self) -> &str {
            "mock"
        }

        async fn compute(
            &self,
            records: &[StructureRecord],
            run: &RunDir,
            _cancel: &CancelToken,
        ) -> Result<DescriptorTable, PipelineError> {
            *self.seen_dir.lock().unwrap() = Some(run.path().to_path_buf());
            std::fs::write(run.molecule_file(), "scratch").unwrap();
            Ok(DescriptorTable {
                columns: vec!["MW".into()],
                rows: records
                    .iter()
                    .filter(|r| !self.skip.contains(&r.id))
                    .map(|r| DescriptorRow { name: r.id.clone(), values: vec![Some(250.0)] })
                    .collect(),
            })
        }
    }

    struct Setup {
        _dir: tempfile::TempDir,
        config: Config,
        input: PathBuf,
    }

    fn setup(features: &[&str]) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("screen.csv");
        write_input(&input, &[("CCO", "m1"), ("C1CC", "m2"), ("c1ccccc1", "m3")]).unwrap();
        let reference = dir.path().join("features.csv");
        write_feature_list(&reference, features).unwrap();
        let model = dir.path().join("model.json");
        ModelJson::new(features.len())
            .base_score(6.0)
            .tree(stump(0, 300.0, 0.5, -0.5, false))
            .write_to(&model)
            .unwrap();

        let mut config = Config::default();
        config.features.reference = reference;
        config.model.path = model;
        config.workspace.path = dir.path().to_path_buf();
        Setup { _dir: dir, config, input }
    }

    #[tokio::test]
    async fn test_run_writes_predictions_and_cleans_up() {
        let s = setup(&["MW", "fp_1"]);
        let mock = Arc::new(MockDescriptors::new());
        let pipeline = Pipeline::with_descriptor_source(s.config.clone(), mock.clone());
        let (tx, mut rx) = broadcast::channel(64);

        let outcome = pipeline
            .run(&PipelineRequest::new(&s.input), Some(tx), CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.predictions.len(), 3);
        assert!(outcome.predictions.records.iter().all(|r| (r.value - 6.5).abs() < 1e-9));
        assert_eq!(outcome.output, s.input.parent().unwrap().join("predictions.csv"));
        assert!(outcome.output.exists());
        assert!(outcome.warnings.iter().any(|w| w.contains("m2")));

        let run_dir = mock.seen_dir.lock().unwrap().clone().unwrap();
        assert!(!run_dir.exists());

        let mut stages = Vec::new();
        while let Ok(p) = rx.try_recv() {
            stages.push(p.stage);
        }
        assert_eq!(stages.first(), Some(&PipelineStage::Reading));
        assert_eq!(stages.last(), Some(&PipelineStage::Done));
        assert!(stages.contains(&PipelineStage::Cleanup));
    }

    #[tokio::test]
    async fn test_dropped_ids_become_warnings() {
        let s = setup(&["MW"]);
        let pipeline = Pipeline::with_descriptor_source(
            s.config.clone(),
            Arc::new(MockDescriptors::new().skipping("m3")),
        );
        let outcome = pipeline
            .run(&PipelineRequest::new(&s.input), None, CancelToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.predictions.len(), 2);
        assert!(outcome.warnings.iter().any(|w| w.contains("'m3' dropped")));
    }

    #[tokio::test]
    async fn test_shape_mismatch_fails_and_cleans_up() {
        let mut s = setup(&["MW"]);
        ModelJson::new(2)
            .tree(stump(0, 0.0, 0.0, 0.0, true))
            .write_to(&s.config.model.path)
            .unwrap();
        s.config.output.file_name = "out.csv".into();
        let mock = Arc::new(MockDescriptors::new());
        let pipeline = Pipeline::with_descriptor_source(s.config.clone(), mock.clone());

        let err = pipeline
            .run(&PipelineRequest::new(&s.input), None, CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ModelShape(_)), "{err}");
        assert!(!mock.seen_dir.lock().unwrap().clone().unwrap().exists());
        assert!(!s.input.parent().unwrap().join("out.csv").exists());
    }

    #[tokio::test]
    async fn test_missing_input_is_reported_before_any_work() {
        let s = setup(&["MW"]);
        let mock = Arc::new(MockDescriptors::new());
        let pipeline = Pipeline::with_descriptor_source(s.config.clone(), mock.clone());
        let err = pipeline
            .run(&PipelineRequest::new(s.input.with_file_name("absent.csv")), None, CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
        assert!(mock.seen_dir.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let s = setup(&["MW"]);
        let pipeline = Pipeline::with_descriptor_source(s.config.clone(), Arc::new(MockDescriptors::new()));
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = pipeline
            .run(&PipelineRequest::new(&s.input), None, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
