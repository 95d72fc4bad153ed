//! One regression experiment: split, build, train, evaluate.

use log::info;

use crate::{
    EpochRecord, Evaluation, Evaluator, FeatureMatrix, History, Regressor, RegressorBuilder,
    Result, RunConfig, TrainingLoop,
};

#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub history: History,
    pub evaluation: Evaluation,
    /// The trained model, left in evaluation mode.
    pub model: Regressor,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Debug, Clone)]
pub struct Experiment {
    config: RunConfig,
}

impl Experiment {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run(&self, matrix: &FeatureMatrix) -> Result<ExperimentReport> {
        self.run_with(matrix, |_| {})
    }

    /// Runs the experiment, calling `on_epoch` after each completed epoch.
    pub fn run_with<F>(&self, matrix: &FeatureMatrix, on_epoch: F) -> Result<ExperimentReport>
    where
        F: FnMut(&EpochRecord),
    {
        let cfg = &self.config;
        let split = matrix.split(cfg.train_fraction, cfg.random_seed)?;
        info!(
            "experiment: {} rows x {} features, {} train / {} test",
            matrix.len(),
            matrix.dim(),
            split.train.len(),
            split.test.len()
        );

        let builder =
            RegressorBuilder::from_hidden_dims(matrix.dim(), &cfg.hidden_dims, cfg.dropout_rate)?;
        let mut model = match cfg.init_seed {
            Some(seed) => builder.build_with_seed(seed)?,
            None => builder.build()?,
        };

        let history = TrainingLoop::new(cfg.fit_config())?.run_with(
            &mut model,
            &split.train,
            &split.test,
            on_epoch,
        )?;
        let evaluation = Evaluator::new(cfg.batch_size)?.evaluate(&mut model, &split.test)?;

        Ok(ExperimentReport {
            history,
            evaluation,
            model,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
        })
    }
}
