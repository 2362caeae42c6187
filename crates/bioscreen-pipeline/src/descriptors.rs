//! Molecular descriptors from PaDEL-Descriptor.
//!
//! Structures are written as `SMILES<TAB>ID` lines into the run directory,
//! the jar is launched as a child process, and its CSV output is read back
//! into a [`DescriptorTable`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bioscreen_common::config::DescriptorConfig;
use bioscreen_common::entities::parse_cell;
use bioscreen_common::{PipelineError, StructureRecord};
use tokio::process::Command;
use tracing::{debug, error, info, instrument};

use crate::cancel::CancelToken;
use crate::workspace::RunDir;

/// Column holding the structure identifier in the tool's output.
pub const NAME_COLUMN: &str = "Name";

const STDERR_TAIL_LINES: usize = 20;
const MISSING_NAME: &str = "no 'Name' column in descriptor output";

// ── Descriptor table ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorRow {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Descriptor columns (excluding `Name`) and one row per structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorTable {
    pub columns: Vec<String>,
    pub rows: Vec<DescriptorRow>,
}

impl DescriptorTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Reads the tool's CSV. The `Name` column may sit anywhere; every other
    /// column is numeric, with unparseable cells treated as missing.
    pub fn read_csv(path: &Path) -> Result<Self, PipelineError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| PipelineError::csv(path, e))?;
        let headers = reader.headers().map_err(|e| PipelineError::csv(path, e))?.clone();
        let name_idx = headers.iter().position(|h| h == NAME_COLUMN).ok_or_else(|| {
            PipelineError::SchemaMismatch(format!("{}: {MISSING_NAME}", path.display()))
        })?;

        let columns = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != name_idx)
            .map(|(_, h)| h.to_string())
            .collect();
        let mut table = DescriptorTable { columns, rows: Vec::new() };
        for row in reader.records() {
            let row = row.map_err(|e| PipelineError::csv(path, e))?;
            let values = row
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != name_idx)
                .map(|(_, cell)| parse_cell(cell))
                .collect();
            table.rows.push(DescriptorRow {
                name: row.get(name_idx).unwrap_or_default().to_string(),
                values,
            });
        }
        Ok(table)
    }
}

/// Writes `SMILES<TAB>ID` lines, no header.
pub fn write_smi(path: &Path, records: &[StructureRecord]) -> Result<(), PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(|e| PipelineError::csv(path, e))?;
    for record in records {
        writer
            .write_record([record.smiles.as_str(), record.id.as_str()])
            .map_err(|e| PipelineError::csv(path, e))?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

// ── Descriptor source seam ────────────────────────────────────────────────────

#[async_trait]
pub trait DescriptorSource: Send + Sync {
    fn name(&self) -> &str;

    /// Computes descriptors for `records`, using `run` for scratch files.
    async fn compute(
        &self,
        records: &[StructureRecord],
        run: &RunDir,
        cancel: &CancelToken,
    ) -> Result<DescriptorTable, PipelineError>;
}

/// Runs PaDEL-Descriptor through the JVM.
#[derive(Debug, Clone)]
pub struct PadelRunner {
    java: PathBuf,
    jar: PathBuf,
    descriptor_types: PathBuf,
    heap: String,
    timeout: Option<Duration>,
}

impl PadelRunner {
    pub fn new(java: impl Into<PathBuf>, jar: impl Into<PathBuf>, descriptor_types: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            jar: jar.into(),
            descriptor_types: descriptor_types.into(),
            heap: "2G".to_string(),
            timeout: None,
        }
    }

    pub fn from_config(config: &DescriptorConfig) -> Self {
        Self {
            java: config.java.clone(),
            jar: config.jar.clone(),
            descriptor_types: config.descriptor_types.clone(),
            heap: config.heap.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Arguments passed to `java` for a run in `run_dir`.
    pub fn args(&self, run_dir: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            format!("-Xms{}", self.heap).into(),
            format!("-Xmx{}", self.heap).into(),
            "-Djava.awt.headless=true".into(),
            "-jar".into(),
            self.jar.clone().into(),
        ];
        for flag in ["-removesalt", "-standardizenitro", "-fingerprints"] {
            args.push(flag.into());
        }
        args.push("-descriptortypes".into());
        args.push(self.descriptor_types.clone().into());
        args.push("-dir".into());
        args.push(run_dir.into());
        args.push("-file".into());
        args.push(output.into());
        args
    }

    async fn run_tool(&self, run: &RunDir, cancel: &CancelToken) -> Result<(), PipelineError> {
        let output_path = run.descriptor_output();
        let child = Command::new(&self.java)
            .args(self.args(run.path(), &output_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineError::ExternalTool(format!("failed to launch {}: {e}", self.java.display()))
            })?;

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::select! {
                out = tokio::time::timeout(limit, wait) => match out {
                    Ok(out) => out,
                    Err(_) => {
                        return Err(PipelineError::ExternalTool(format!(
                            "PaDEL-Descriptor timed out after {}s",
                            limit.as_secs()
                        )))
                    }
                },
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            },
            None => tokio::select! {
                out = wait => out,
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            },
        }
        .map_err(|e| PipelineError::ExternalTool(format!("waiting for PaDEL-Descriptor: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(stdout = %stdout.trim(), "PaDEL-Descriptor output");

        if !output.status.success() {
            error!(status = %output.status, stderr = %stderr.trim(), "PaDEL-Descriptor failed");
            return Err(PipelineError::ExternalTool(format!(
                "PaDEL-Descriptor exited with {}: {}",
                output.status,
                tail(&stderr, STDERR_TAIL_LINES)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DescriptorSource for PadelRunner {
    fn name(&self) -> &str {
        "PaDEL-Descriptor"
    }

    #[instrument(skip_all, fields(records = records.len()))]
    async fn compute(
        &self,
        records: &[StructureRecord],
        run: &RunDir,
        cancel: &CancelToken,
    ) -> Result<DescriptorTable, PipelineError> {
        let smi = run.molecule_file();
        write_smi(&smi, records)?;
        info!(path = %smi.display(), "Running PaDEL-Descriptor");

        self.run_tool(run, cancel).await?;

        let output_path = run.descriptor_output();
        if !output_path.exists() {
            return Err(PipelineError::ExternalTool(format!(
                "PaDEL-Descriptor produced no output at {}",
                output_path.display()
            )));
        }
        // A missing Name column stays a schema error; any other parse
        // failure means the tool wrote something unusable.
        let table = DescriptorTable::read_csv(&output_path).map_err(|e| match e {
            PipelineError::SchemaMismatch(msg) if !msg.ends_with(MISSING_NAME) => {
                PipelineError::ExternalTool(format!("malformed descriptor output: {msg}"))
            }
            other => other,
        })?;
        info!(rows = table.rows.len(), columns = table.columns.len(), "Descriptors computed");
        Ok(table)
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
