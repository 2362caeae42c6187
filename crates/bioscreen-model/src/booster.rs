//! Gradient-boosted tree inference over the XGBoost JSON model format.
//!
//! Only what regression scoring needs is read: the tree arrays, base score,
//! objective and (when present) the training feature names. Multi-output
//! models are rejected at load time.

use std::path::Path;

use bioscreen_common::PipelineError;
use serde::Deserialize;
use tracing::{debug, info};

// ── Serialized layout ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ModelFile {
    learner: LearnerJson,
}

#[derive(Debug, Deserialize)]
struct LearnerJson {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: GradientBoosterJson,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveJson,
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    #[serde(default)]
    base_score: Option<String>,
    #[serde(default)]
    num_feature: Option<String>,
    #[serde(default)]
    num_class: Option<String>,
    #[serde(default)]
    num_target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectiveJson {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name")]
enum GradientBoosterJson {
    #[serde(rename = "gbtree")]
    GbTree { model: GbTreeModelJson },
    #[serde(rename = "dart")]
    Dart {
        gbtree: DartInnerJson,
        #[serde(default)]
        weight_drop: Vec<f64>,
    },
    #[serde(rename = "gblinear")]
    GbLinear {},
}

#[derive(Debug, Deserialize)]
struct DartInnerJson {
    model: GbTreeModelJson,
}

#[derive(Debug, Deserialize)]
struct GbTreeModelJson {
    trees: Vec<TreeJson>,
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f64>,
    default_left: Vec<Flag>,
}

/// `default_left` is written as booleans by some versions and 0/1 by others.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

// ── In-memory model ───────────────────────────────────────────────────────────

/// How the summed margin becomes a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Identity,
    Logistic,
    Exp,
}

impl Objective {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reg:squarederror" | "reg:linear" | "reg:absoluteerror" | "reg:pseudohubererror"
            | "reg:squaredlogerror" => Some(Objective::Identity),
            "reg:logistic" | "binary:logistic" => Some(Objective::Logistic),
            "count:poisson" | "reg:gamma" | "reg:tweedie" => Some(Objective::Exp),
            _ => None,
        }
    }

    /// Base score expressed on the margin scale.
    fn base_margin(self, base_score: f64) -> f64 {
        match self {
            Objective::Identity => base_score,
            Objective::Logistic => (base_score / (1.0 - base_score)).ln(),
            Objective::Exp => base_score.ln(),
        }
    }

    fn transform(self, margin: f64) -> f64 {
        match self {
            Objective::Identity => margin,
            Objective::Logistic => 1.0 / (1.0 + (-margin).exp()),
            Objective::Exp => margin.exp(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    /// Split threshold, or the leaf value on leaves.
    value: f64,
    default_left: bool,
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_json(index: usize, json: TreeJson) -> Result<Self, PipelineError> {
        let n = json.left_children.len();
        let lengths = [
            json.right_children.len(),
            json.split_indices.len(),
            json.split_conditions.len(),
            json.default_left.len(),
        ];
        if n == 0 || lengths.iter().any(|&len| len != n) {
            return Err(PipelineError::Model(format!(
                "tree {index}: node arrays have inconsistent lengths"
            )));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (json.left_children[i], json.right_children[i]);
            let in_tree = |child: i32| (0..n as i32).contains(&child);
            if left != -1 && !(in_tree(left) && in_tree(right)) {
                return Err(PipelineError::Model(format!(
                    "tree {index}: node {i} points outside the tree"
                )));
            }
            nodes.push(Node {
                left,
                right,
                feature: json.split_indices[i] as usize,
                value: json.split_conditions[i],
                default_left: json.default_left[i].is_set(),
            });
        }
        Ok(Self { nodes })
    }

    /// Leaf value reached by `row`. NaN follows the node's default branch.
    /// Splits compare in single precision, the width thresholds are trained at.
    pub fn leaf_value(&self, row: &[f64]) -> f64 {
        let mut idx = 0usize;
        // Bounded by node count so a malformed cycle cannot spin forever.
        for _ in 0..=self.nodes.len() {
            let node = &self.nodes[idx];
            if node.left == -1 {
                return node.value;
            }
            let x = row.get(node.feature).copied().unwrap_or(f64::NAN);
            let go_left = if x.is_nan() {
                node.default_left
            } else {
                (x as f32) < (node.value as f32)
            };
            idx = if go_left { node.left } else { node.right } as usize;
        }
        f64::NAN
    }

    fn max_feature(&self) -> Option<usize> {
        self.nodes.iter().filter(|n| n.left != -1).map(|n| n.feature).max()
    }
}

/// A loaded tree ensemble.
#[derive(Debug, Clone)]
pub struct Booster {
    trees: Vec<Tree>,
    tree_weights: Vec<f64>,
    base_margin: f64,
    objective: Objective,
    num_feature: usize,
    feature_names: Option<Vec<String>>,
}

impl Booster {
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(format!(
                "model file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let booster = Self::from_json_str(&text)
            .map_err(|e| PipelineError::Model(format!("{}: {e}", path.display())))?;
        info!(
            path = %path.display(),
            trees = booster.num_trees(),
            features = booster.num_feature,
            "Model loaded"
        );
        Ok(booster)
    }

    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let file: ModelFile = serde_json::from_str(json)
            .map_err(|e| PipelineError::Model(format!("invalid model JSON: {e}")))?;
        let learner = file.learner;
        let params = learner.learner_model_param;

        for (label, value) in [("num_class", &params.num_class), ("num_target", &params.num_target)] {
            let count = value.as_deref().map(parse_number).transpose()?.unwrap_or(0.0);
            if count > 1.0 {
                return Err(PipelineError::Model(format!(
                    "{label} = {count}: only single-output regression models are supported"
                )));
            }
        }

        let objective = Objective::from_name(&learner.objective.name).ok_or_else(|| {
            PipelineError::Model(format!("unsupported objective '{}'", learner.objective.name))
        })?;

        let (tree_json, weights) = match learner.gradient_booster {
            GradientBoosterJson::GbTree { model } => {
                let n = model.trees.len();
                (model.trees, vec![1.0; n])
            }
            GradientBoosterJson::Dart { gbtree, weight_drop } => {
                let n = gbtree.model.trees.len();
                if weight_drop.len() != n {
                    return Err(PipelineError::Model(format!(
                        "dart model has {n} trees but {} weights",
                        weight_drop.len()
                    )));
                }
                (gbtree.model.trees, weight_drop)
            }
            GradientBoosterJson::GbLinear {} => {
                return Err(PipelineError::Model("gblinear boosters are not supported".into()))
            }
        };

        let trees = tree_json
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::from_json(i, t))
            .collect::<Result<Vec<_>, _>>()?;

        let base_score = params.base_score.as_deref().map(parse_number).transpose()?.unwrap_or(0.5);
        let used_features = trees.iter().filter_map(Tree::max_feature).max().map_or(0, |m| m + 1);
        let num_feature = match params.num_feature.as_deref() {
            Some(s) => parse_number(s)? as usize,
            None => used_features,
        };
        if used_features > num_feature {
            return Err(PipelineError::Model(format!(
                "trees split on feature {} but the model declares {num_feature} features",
                used_features - 1
            )));
        }

        let feature_names = (!learner.feature_names.is_empty()).then_some(learner.feature_names);
        if let Some(names) = &feature_names {
            if names.len() != num_feature {
                return Err(PipelineError::Model(format!(
                    "{} feature names for {num_feature} features",
                    names.len()
                )));
            }
        }

        debug!(?objective, base_score, num_feature, "Parsed booster");
        Ok(Self {
            trees,
            tree_weights: weights,
            base_margin: objective.base_margin(base_score),
            objective,
            num_feature,
            feature_names,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_feature(&self) -> usize {
        self.num_feature
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Training-time column names, when the model was saved with them.
    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    /// Raw margin before the objective transform.
    pub fn predict_margin(&self, row: &[f64]) -> f64 {
        self.trees
            .iter()
            .zip(&self.tree_weights)
            .map(|(tree, w)| w * tree.leaf_value(row))
            .sum::<f64>()
            + self.base_margin
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.objective.transform(self.predict_margin(row))
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }
}

/// Numbers in the learner params are strings, possibly `"[5E-1]"`.
fn parse_number(raw: &str) -> Result<f64, PipelineError> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| PipelineError::Model(format!("invalid numeric parameter '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioscreen_test_utils::{stump, ModelJson};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_stump_traversal_and_missing_direction() {
        let json = ModelJson::new(2)
            .base_score(0.0)
            .tree(stump(0, 1.5, -1.0, 2.0, true))
            .tree(stump(1, 0.0, 10.0, 20.0, false))
            .to_json();
        let booster = Booster::from_json_str(&json).unwrap();
        assert_eq!(booster.num_trees(), 2);
        assert_eq!(booster.num_feature(), 2);

        assert!(approx(booster.predict_row(&[1.0, -1.0]), -1.0 + 10.0));
        assert!(approx(booster.predict_row(&[1.5, 0.0]), 2.0 + 20.0));
        // NaN in feature 0 goes left, NaN in feature 1 goes right.
        assert!(approx(booster.predict_row(&[f64::NAN, f64::NAN]), -1.0 + 20.0));
    }

    #[test]
    fn test_split_compares_in_single_precision() {
        let json = ModelJson::new(1)
            .base_score(0.0)
            .tree(stump(0, 0.1, 1.0, 2.0, true))
            .to_json();
        let booster = Booster::from_json_str(&json).unwrap();
        // Below 0.1 in f64 but rounds to the threshold in f32, so goes right.
        assert!(approx(booster.predict_row(&[0.099_999_999_99]), 2.0));
        assert!(approx(booster.predict_row(&[0.09]), 1.0));
        assert!(approx(booster.predict_row(&[0.1]), 2.0));
    }

    #[test]
    fn test_base_score_forms() {
        let plain = ModelJson::new(1).base_score_raw("5E-1").tree(stump(0, 0.0, 1.0, 1.0, true)).to_json();
        let bracketed = ModelJson::new(1).base_score_raw("[5E-1]").tree(stump(0, 0.0, 1.0, 1.0, true)).to_json();
        for json in [plain, bracketed] {
            let booster = Booster::from_json_str(&json).unwrap();
            assert!(approx(booster.predict_row(&[0.0]), 1.5));
        }
    }

    #[test]
    fn test_logistic_objective_transforms_margin() {
        let json = ModelJson::new(1)
            .objective("binary:logistic")
            .base_score(0.5)
            .tree(stump(0, 0.0, 0.0, 0.0, true))
            .to_json();
        let booster = Booster::from_json_str(&json).unwrap();
        assert_eq!(booster.objective(), Objective::Logistic);
        assert!(approx(booster.predict_row(&[1.0]), 0.5));
    }

    #[test]
    fn test_poisson_objective_uses_exp() {
        let json = ModelJson::new(1)
            .objective("count:poisson")
            .base_score(1.0)
            .tree(stump(0, 0.0, 0.0, 2.0f64.ln(), true))
            .to_json();
        let booster = Booster::from_json_str(&json).unwrap();
        assert!(approx(booster.predict_row(&[1.0]), 2.0));
        assert!(approx(booster.predict_row(&[-1.0]), 1.0));
    }

    #[test]
    fn test_dart_scales_trees() {
        let json = ModelJson::new(1)
            .base_score(0.0)
            .tree(stump(0, 0.0, 4.0, 4.0, true))
            .tree(stump(0, 0.0, 2.0, 2.0, true))
            .dart(vec![0.5, 1.0])
            .to_json();
        let booster = Booster::from_json_str(&json).unwrap();
        assert!(approx(booster.predict_row(&[0.0]), 4.0));
    }

    #[test]
    fn test_integer_default_left_flags() {
        let json = r#"{"learner":{
            "gradient_booster":{"name":"gbtree","model":{"trees":[{
                "left_children":[1,-1,-1],"right_children":[2,-1,-1],
                "split_indices":[0,0,0],"split_conditions":[0.5,7.0,9.0],
                "default_left":[0,0,0]}]}},
            "learner_model_param":{"base_score":"0","num_feature":"1"},
            "objective":{"name":"reg:squarederror"}}}"#;
        let booster = Booster::from_json_str(json).unwrap();
        assert!(approx(booster.predict_row(&[f64::NAN]), 9.0));
    }

    #[test]
    fn test_rejects_unsupported_models() {
        let bad_objective = ModelJson::new(1).objective("multi:softprob").tree(stump(0, 0.0, 1.0, 1.0, true)).to_json();
        assert!(matches!(Booster::from_json_str(&bad_objective), Err(PipelineError::Model(_))));

        let out_of_range = ModelJson::new(1).tree(stump(3, 0.0, 1.0, 1.0, true)).to_json();
        assert!(matches!(Booster::from_json_str(&out_of_range), Err(PipelineError::Model(_))));

        assert!(matches!(Booster::from_json_str("{not json"), Err(PipelineError::Model(_))));
    }

    #[test]
    fn test_missing_model_file() {
        let err = Booster::from_json_file(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }
}
