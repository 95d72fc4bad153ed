//! Run configuration.
//!
//! Every key is optional in a JSON config file; missing keys take the defaults below.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, FitConfig, Optimizer, Result, Shuffle};

/// Optimizer named in a run configuration (`"adam"`, `"sgd"`, `"sgd_momentum"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
    SgdMomentum,
}

impl FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "adam" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            "sgd_momentum" | "sgd-momentum" => Ok(Self::SgdMomentum),
            other => Err(Error::InvalidConfig(format!(
                "unknown optimizer {other:?}, expected adam, sgd or sgd_momentum"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Fraction of rows sampled into the train partition, in `(0, 1)`.
    pub train_fraction: f32,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub dropout_rate: f32,
    pub hidden_dims: Vec<usize>,
    /// Seeds the train/test split only.
    pub random_seed: u64,
    /// Seeds parameter init, dropout masks and batch shuffling. `None` uses OS entropy.
    pub init_seed: Option<u64>,
    pub target_column: String,
    pub exclude_columns: Vec<String>,
    pub optimizer: OptimizerKind,
    /// Only read by `sgd_momentum`.
    pub momentum: f32,
    pub adam_beta1: f32,
    pub adam_beta2: f32,
    pub adam_eps: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            batch_size: 32,
            epochs: 20,
            learning_rate: 1e-3,
            dropout_rate: 0.2,
            hidden_dims: vec![128, 64],
            random_seed: 42,
            init_seed: None,
            target_column: "views".to_owned(),
            exclude_columns: Vec::new(),
            optimizer: OptimizerKind::Adam,
            momentum: 0.9,
            adam_beta1: 0.9,
            adam_beta2: 0.999,
            adam_eps: 1e-8,
        }
    }
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "train_fraction must be in (0,1), got {}",
                self.train_fraction
            )));
        }
        if !(self.dropout_rate.is_finite() && (0.0..1.0).contains(&self.dropout_rate)) {
            return Err(Error::InvalidConfig(format!(
                "dropout_rate must be in [0,1), got {}",
                self.dropout_rate
            )));
        }
        if self.hidden_dims.is_empty() || self.hidden_dims.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "hidden_dims must be non-empty with every width > 0, got {:?}",
                self.hidden_dims
            )));
        }
        if self.target_column.is_empty() {
            return Err(Error::InvalidConfig(
                "target_column must not be empty".to_owned(),
            ));
        }
        self.fit_config().validate()
    }

    pub fn optimizer(&self) -> Optimizer {
        match self.optimizer {
            OptimizerKind::Adam => Optimizer::Adam {
                beta1: self.adam_beta1,
                beta2: self.adam_beta2,
                eps: self.adam_eps,
            },
            OptimizerKind::Sgd => Optimizer::Sgd,
            OptimizerKind::SgdMomentum => Optimizer::SgdMomentum {
                momentum: self.momentum,
            },
        }
    }

    /// Per-pass shuffling for training batches.
    pub fn shuffle(&self) -> Shuffle {
        match self.init_seed {
            Some(seed) => Shuffle::Seeded(seed),
            None => Shuffle::Random,
        }
    }

    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            epochs: self.epochs,
            lr: self.learning_rate,
            batch_size: self.batch_size,
            shuffle: self.shuffle(),
            optimizer: self.optimizer(),
        }
    }
}
