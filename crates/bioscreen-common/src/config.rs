//! Configuration loading for Bioscreen.
//! Reads bioscreen.toml from the current directory or the path in the
//! BIOSCREEN_CONFIG env var. Every field has a default matching the layout of
//! the bundled `data/` directory, so running without a file is supported.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "BIOSCREEN_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "bioscreen.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub descriptor: DescriptorConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub web: WebConfig,
}

// ── Descriptor tool ───────────────────────────────────────────────────────────

/// How PaDEL-Descriptor is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorConfig {
    /// Program used to run the jar.
    #[serde(default = "default_java")]
    pub java: PathBuf,
    #[serde(default = "default_jar")]
    pub jar: PathBuf,
    /// Descriptor-type selection file passed via `-descriptortypes`.
    #[serde(default = "default_descriptor_types")]
    pub descriptor_types: PathBuf,
    /// JVM heap size, used for both -Xms and -Xmx.
    #[serde(default = "default_heap")]
    pub heap: String,
    /// Kill the tool after this many seconds. None waits forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_java()             -> PathBuf { PathBuf::from("java") }
fn default_jar()              -> PathBuf { PathBuf::from("data/PaDEL-Descriptor/PaDEL-Descriptor.jar") }
fn default_descriptor_types() -> PathBuf { PathBuf::from("data/PaDEL-Descriptor/PubchemFingerprinter.xml") }
fn default_heap()             -> String  { "2G".to_string() }

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            java: default_java(),
            jar: default_jar(),
            descriptor_types: default_descriptor_types(),
            heap: default_heap(),
            timeout_secs: None,
        }
    }
}

// ── Fingerprints ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintConfig {
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_n_bits")]
    pub n_bits: usize,
    #[serde(default = "default_fp_prefix")]
    pub column_prefix: String,
}

fn default_radius()    -> u32    { 2 }
fn default_n_bits()    -> usize  { 1024 }
fn default_fp_prefix() -> String { "fp_".to_string() }

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            n_bits: default_n_bits(),
            column_prefix: default_fp_prefix(),
        }
    }
}

// ── Feature selection ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// CSV listing the model's input features in training order.
    #[serde(default = "default_reference")]
    pub reference: PathBuf,
    #[serde(default = "default_feature_column")]
    pub column: String,
    /// Name of the identifier column in the assembled table.
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

fn default_reference()      -> PathBuf { PathBuf::from("data/top_n_features.csv") }
fn default_feature_column() -> String  { "Feature".to_string() }
fn default_id_column()      -> String  { "Name".to_string() }

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            reference: default_reference(),
            column: default_feature_column(),
            id_column: default_id_column(),
        }
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// Header of the prediction column in the output file.
    #[serde(default = "default_value_column")]
    pub value_column: String,
}

fn default_model_path()   -> PathBuf { PathBuf::from("data/Replicase_xgb_model.json") }
fn default_value_column() -> String  { "pIC50".to_string() }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            value_column: default_value_column(),
        }
    }
}

// ── Workspace / output ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory under which per-run scratch directories are created.
    #[serde(default = "default_workspace_path")]
    pub path: PathBuf,
}

fn default_workspace_path() -> PathBuf { PathBuf::from(".") }

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { path: default_workspace_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_file")]
    pub file_name: String,
}

fn default_output_file() -> String { "predictions.csv".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self { file_name: default_output_file() }
    }
}

impl OutputConfig {
    /// Predictions are written alongside the input file.
    pub fn path_for(&self, input: &Path) -> PathBuf {
        input
            .parent()
            .map(|dir| dir.join(&self.file_name))
            .unwrap_or_else(|| PathBuf::from(&self.file_name))
    }
}

// ── Web GUI ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Where uploaded CSV files are stored.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Largest accepted upload request, in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_bind()          -> String  { "127.0.0.1:3000".to_string() }
fn default_upload_dir()    -> PathBuf { PathBuf::from("uploads") }
fn default_max_upload_mb() -> usize   { 256 }

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: default_upload_dir(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl WebConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Config {
    /// Load configuration from bioscreen.toml.
    /// Checks BIOSCREEN_CONFIG env var first, then current directory. A
    /// missing default file falls back to defaults; a missing file named
    /// explicitly through the env var is an error.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    warn!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bundled_layout() {
        let config = Config::default();
        assert_eq!(config.fingerprint.radius, 2);
        assert_eq!(config.fingerprint.n_bits, 1024);
        assert_eq!(config.features.column, "Feature");
        assert_eq!(config.features.id_column, "Name");
        assert_eq!(config.model.value_column, "pIC50");
        assert_eq!(config.descriptor.heap, "2G");
        assert!(config.descriptor.timeout_secs.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [descriptor]
            java = "/usr/bin/java"
            timeout_secs = 600

            [web]
            bind = "0.0.0.0:8080"
            "#,
        )
        .unwrap();
        assert_eq!(config.descriptor.java, PathBuf::from("/usr/bin/java"));
        assert_eq!(config.descriptor.timeout_secs, Some(600));
        assert_eq!(config.descriptor.heap, "2G");
        assert_eq!(config.web.bind, "0.0.0.0:8080");
        assert_eq!(config.web.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.web.max_upload_mb, 256);
        assert_eq!(config.model.path, PathBuf::from("data/Replicase_xgb_model.json"));
    }

    #[test]
    fn test_example_file_parses() {
        let config = Config::from_toml(include_str!("../../../bioscreen.example.toml")).unwrap();
        assert_eq!(config.web.bind, WebConfig::default().bind);
        assert_eq!(config.web.max_upload_bytes(), 256 * 1024 * 1024);
        assert_eq!(config.features.reference, PathBuf::from("data/top_n_features.csv"));
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.output.file_name, "predictions.csv");
    }

    #[test]
    fn test_output_written_next_to_input() {
        let output = OutputConfig::default();
        assert_eq!(
            output.path_for(Path::new("/data/screens/batch1.csv")),
            PathBuf::from("/data/screens/predictions.csv")
        );
    }
}
