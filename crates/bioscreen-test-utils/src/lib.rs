//! Fixtures shared by Bioscreen tests: tiny XGBoost model files, a fake
//! PaDEL-Descriptor launcher, and writers for input and reference files.

use std::path::{Path, PathBuf};

use anyhow::Result;
use bioscreen_common::Config;
use serde_json::{json, Value};

pub use pretty_assertions;

// ── Model JSON ────────────────────────────────────────────────────────────────

/// A depth-1 tree: `feature < threshold` goes to `left`, otherwise `right`.
pub fn stump(feature: u32, threshold: f64, left: f64, right: f64, default_left: bool) -> Value {
    json!({
        "left_children": [1, -1, -1],
        "right_children": [2, -1, -1],
        "split_indices": [feature, 0, 0],
        "split_conditions": [threshold, left, right],
        "default_left": [default_left, false, false],
        "base_weights": [0.0, left, right],
        "tree_param": { "num_nodes": "3", "num_feature": "0" }
    })
}

/// Builder for XGBoost JSON model documents.
#[derive(Debug, Clone)]
pub struct ModelJson {
    num_feature: usize,
    base_score: String,
    objective: String,
    trees: Vec<Value>,
    feature_names: Vec<String>,
    dart_weights: Option<Vec<f64>>,
}

impl ModelJson {
    pub fn new(num_feature: usize) -> Self {
        Self {
            num_feature,
            base_score: "5E-1".to_string(),
            objective: "reg:squarederror".to_string(),
            trees: Vec::new(),
            feature_names: Vec::new(),
            dart_weights: None,
        }
    }

    pub fn base_score(mut self, value: f64) -> Self {
        self.base_score = format!("{value:E}");
        self
    }

    /// Exact string stored in `learner_model_param.base_score`.
    pub fn base_score_raw(mut self, raw: &str) -> Self {
        self.base_score = raw.to_string();
        self
    }

    pub fn objective(mut self, name: &str) -> Self {
        self.objective = name.to_string();
        self
    }

    pub fn tree(mut self, tree: Value) -> Self {
        self.trees.push(tree);
        self
    }

    pub fn feature_names(mut self, names: Vec<&str>) -> Self {
        self.feature_names = names.into_iter().map(str::to_string).collect();
        self
    }

    pub fn dart(mut self, weights: Vec<f64>) -> Self {
        self.dart_weights = Some(weights);
        self
    }

    pub fn to_value(&self) -> Value {
        let model = json!({
            "gbtree_model_param": {
                "num_trees": self.trees.len().to_string(),
                "num_parallel_tree": "1"
            },
            "trees": self.trees,
            "tree_info": vec![0; self.trees.len()],
        });
        let booster = match &self.dart_weights {
            Some(weights) => json!({
                "name": "dart",
                "gbtree": { "name": "gbtree", "model": model },
                "weight_drop": weights,
            }),
            None => json!({ "name": "gbtree", "model": model }),
        };
        let mut learner = json!({
            "attributes": {},
            "gradient_booster": booster,
            "learner_model_param": {
                "base_score": self.base_score,
                "num_class": "0",
                "num_feature": self.num_feature.to_string(),
                "num_target": "1"
            },
            "objective": { "name": self.objective },
        });
        if !self.feature_names.is_empty() {
            learner["feature_names"] = json!(self.feature_names);
        }
        json!({ "learner": learner, "version": [2, 0, 3] })
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json())?;
        Ok(())
    }
}

// ── Input and reference files ─────────────────────────────────────────────────

/// Writes the upload format: `SMILES,ID` rows, no header.
pub fn write_input(path: &Path, rows: &[(&str, &str)]) -> Result<()> {
    let body: String = rows.iter().map(|(smiles, id)| format!("{smiles},{id}\n")).collect();
    std::fs::write(path, body)?;
    Ok(())
}

/// Writes a reference feature list with a `Feature` header.
pub fn write_feature_list(path: &Path, names: &[&str]) -> Result<()> {
    let mut body = String::from("Feature\n");
    for name in names {
        body.push_str(name);
        body.push('\n');
    }
    std::fs::write(path, body)?;
    Ok(())
}

// ── Fake PaDEL ────────────────────────────────────────────────────────────────

/// What the fake descriptor tool does when launched.
#[derive(Debug, Clone)]
pub enum FakePadel {
    /// Writes one row per molecule with fixed descriptor values, leaving out
    /// the listed identifiers.
    Succeed {
        descriptors: Vec<(String, f64)>,
        skip_ids: Vec<String>,
    },
    /// Prints to stderr and exits with the given status.
    Fail { code: i32, stderr: String },
    /// Exits 0 without writing the output file.
    NoOutput,
    /// Sleeps before succeeding, for timeout and cancellation tests.
    Slow { seconds: u32 },
}

impl FakePadel {
    pub fn with_descriptors(descriptors: &[(&str, f64)]) -> Self {
        FakePadel::Succeed {
            descriptors: descriptors.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
            skip_ids: Vec::new(),
        }
    }

    pub fn skipping(mut self, ids: &[&str]) -> Self {
        if let FakePadel::Succeed { skip_ids, .. } = &mut self {
            skip_ids.extend(ids.iter().map(|s| s.to_string()));
        }
        self
    }

    fn body(&self) -> String {
        match self {
            FakePadel::Succeed { descriptors, skip_ids } => {
                let header: Vec<&str> = descriptors.iter().map(|(n, _)| n.as_str()).collect();
                let values: Vec<String> = descriptors.iter().map(|(_, v)| v.to_string()).collect();
                let header = std::iter::once("Name").chain(header).collect::<Vec<_>>().join(",");
                let values = std::iter::once(String::new()).chain(values).collect::<Vec<_>>().join(",");
                format!(
                    r#"{{
  printf '%s\n' '{header}'
  cut -f2 "$dir/molecule.smi" | while IFS= read -r id; do
    case " {skip} " in *" $id "*) continue ;; esac
    printf '"%s"%s\n' "$id" '{values}'
  done
}} > "$file"
exit 0"#,
                    skip = skip_ids.join(" "),
                )
            }
            FakePadel::Fail { code, stderr } => format!("echo '{stderr}' >&2\nexit {code}"),
            FakePadel::NoOutput => "exit 0".to_string(),
            FakePadel::Slow { seconds } => format!("sleep {seconds}\nexit 0"),
        }
    }

    /// Writes an executable `java` stand-in into `dir`. Its arguments are
    /// logged one per line to `dir/java-args.log`.
    #[cfg(unix)]
    pub fn install(&self, dir: &Path) -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-java.sh");
        let log = dir.join("java-args.log");
        let script = format!(
            r#"#!/bin/sh
printf '%s\n' "$@" > '{log}'
dir=""
file=""
while [ $# -gt 0 ]; do
  case "$1" in
    -dir) dir="$2"; shift ;;
    -file) file="$2"; shift ;;
  esac
  shift
done
{body}
"#,
            log = log.display(),
            body = self.body(),
        );
        std::fs::write(&path, script)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }
}

// ── Whole-pipeline fixture ────────────────────────────────────────────────────

/// A scratch directory holding every file a pipeline run needs, plus a
/// [`Config`] pointing at them.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: Config,
    pub input: PathBuf,
}

impl Fixture {
    #[cfg(unix)]
    pub fn new(
        rows: &[(&str, &str)],
        features: &[&str],
        model: &ModelJson,
        padel: &FakePadel,
    ) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();

        let input = root.join("input.csv");
        write_input(&input, rows)?;
        let reference = root.join("top_n_features.csv");
        write_feature_list(&reference, features)?;
        let model_path = root.join("model.json");
        model.write_to(&model_path)?;
        let java = padel.install(root)?;

        let mut config = Config::default();
        config.descriptor.java = java;
        config.descriptor.jar = root.join("PaDEL-Descriptor.jar");
        config.descriptor.descriptor_types = root.join("PubchemFingerprinter.xml");
        config.features.reference = reference;
        config.model.path = model_path;
        config.workspace.path = root.to_path_buf();
        config.web.upload_dir = root.join("uploads");

        Ok(Self { dir, config, input })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Arguments the fake tool was last launched with.
    pub fn java_args(&self) -> Result<Vec<String>> {
        let text = std::fs::read_to_string(self.path().join("java-args.log"))?;
        Ok(text.lines().map(str::to_string).collect())
    }

    /// Entries left in the fixture directory whose names start with `prefix`.
    pub fn leftovers(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.path())? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) {
                names.push(name);
            }
        }
        Ok(names)
    }
}
