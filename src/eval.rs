//! Post-training evaluation: prediction/target correlation in log and view-count space.

use log::{debug, info};

use crate::data::expm1_views;
use crate::metrics::pearson;
use crate::{BatchSource, Error, FeatureMatrix, Regressor, Result, Shuffle};

/// One evaluated sample, both values on the `ln(1 + views)` scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionPair {
    pub predicted: f32,
    pub actual: f32,
}

/// Predictions over the held-out partition and their correlation with the truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    predictions: Vec<f32>,
    targets: Vec<f32>,
    log_correlation: f64,
    linear_correlation: f64,
}

impl Evaluation {
    /// Predictions in stored row order of the evaluated partition.
    #[inline]
    pub fn predictions(&self) -> &[f32] {
        &self.predictions
    }

    #[inline]
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn pairs(&self) -> impl ExactSizeIterator<Item = PredictionPair> + '_ {
        self.predictions
            .iter()
            .zip(&self.targets)
            .map(|(&predicted, &actual)| PredictionPair { predicted, actual })
    }

    /// Pearson correlation on the log scale.
    #[inline]
    pub fn log_correlation(&self) -> f64 {
        self.log_correlation
    }

    /// Pearson correlation after `expm1`, i.e. on raw view counts.
    #[inline]
    pub fn linear_correlation(&self) -> f64 {
        self.linear_correlation
    }
}

/// Runs one evaluation-mode pass over a partition in stored order.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    batch_size: usize,
}

impl Evaluator {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        Ok(Self { batch_size })
    }

    /// Switches `model` to evaluation mode and scores every row of `test`.
    ///
    /// Needs at least two rows, since a correlation over fewer is meaningless.
    pub fn evaluate(&self, model: &mut Regressor, test: &FeatureMatrix) -> Result<Evaluation> {
        if test.is_empty() {
            return Err(Error::EmptyPartition(
                "cannot evaluate an empty partition".to_owned(),
            ));
        }
        if test.dim() != model.input_dim() {
            return Err(Error::InvalidShape(format!(
                "feature dim {} does not match model input_dim {}",
                test.dim(),
                model.input_dim()
            )));
        }

        model.eval();
        let mut source = BatchSource::new(test, self.batch_size, Shuffle::None)?;
        let mut scratch = model.scratch();
        let mut predictions = Vec::with_capacity(test.len());
        let mut targets = Vec::with_capacity(test.len());

        for batch in source.pass() {
            let pred = model.forward(batch.features(), batch.rows(), &mut scratch)?;
            predictions.extend_from_slice(pred);
            targets.extend_from_slice(batch.targets());
        }
        debug!("collected {} prediction pairs", predictions.len());

        let log_pred: Vec<f64> = predictions.iter().map(|&p| f64::from(p)).collect();
        let log_true: Vec<f64> = targets.iter().map(|&t| f64::from(t)).collect();
        let log_correlation = pearson(&log_pred, &log_true)?;

        let lin_pred: Vec<f64> = log_pred.iter().map(|&z| expm1_views(z)).collect();
        let lin_true: Vec<f64> = log_true.iter().map(|&z| expm1_views(z)).collect();
        let linear_correlation = pearson(&lin_pred, &lin_true)?;

        info!(
            "correlation over {} rows: log {log_correlation:.4}, linear {linear_correlation:.4}",
            predictions.len()
        );

        Ok(Evaluation {
            predictions,
            targets,
            log_correlation,
            linear_correlation,
        })
    }
}
