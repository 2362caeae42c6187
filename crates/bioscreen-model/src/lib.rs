//! bioscreen-model: Gradient-boosted tree inference.
//! Loads XGBoost JSON models and scores assembled feature tables.

pub mod booster;
pub mod predictor;

pub use booster::{Booster, Objective};
pub use predictor::Predictor;
