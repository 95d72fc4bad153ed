//! Epoch-driven training with per-epoch loss/RMSE tracking.

use log::{debug, info, warn};
use serde::Serialize;

use crate::metrics::{self, PassTotals};
use crate::{
    BatchSource, Error, FeatureMatrix, Gradients, Optimizer, OptimizerState, Regressor, Result,
    Scratch, Shuffle, loss,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub lr: f32,
    pub batch_size: usize,
    /// Row order for training passes. Evaluation passes always use stored order.
    pub shuffle: Shuffle,
    pub optimizer: Optimizer,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            lr: 1e-3,
            batch_size: 32,
            shuffle: Shuffle::Random,
            optimizer: Optimizer::default(),
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "lr must be finite and > 0, got {}",
                self.lr
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        self.optimizer.validate()
    }
}

/// Means over one epoch. `epoch` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_rmse: f32,
    pub test_loss: f32,
    pub test_rmse: f32,
}

/// Completed epochs, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct History {
    records: Vec<EpochRecord>,
}

impl History {
    #[inline]
    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn first(&self) -> Option<&EpochRecord> {
        self.records.first()
    }

    #[inline]
    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EpochRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a EpochRecord;
    type IntoIter = std::slice::Iter<'a, EpochRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Runs a fixed number of epochs: a training pass then an evaluation pass each.
///
/// There is no early stopping. A non-finite loss is logged and shows up as an
/// infinite RMSE in the epoch record; the run keeps going.
#[derive(Debug, Clone)]
pub struct TrainingLoop {
    config: FitConfig,
}

impl TrainingLoop {
    pub fn new(config: FitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Train `model` on `train`, scoring `test` after every epoch.
    pub fn run(
        &self,
        model: &mut Regressor,
        train: &FeatureMatrix,
        test: &FeatureMatrix,
    ) -> Result<History> {
        self.run_with(model, train, test, |_| {})
    }

    /// Like [`TrainingLoop::run`], calling `on_epoch` with each record as it is appended.
    pub fn run_with<F>(
        &self,
        model: &mut Regressor,
        train: &FeatureMatrix,
        test: &FeatureMatrix,
        mut on_epoch: F,
    ) -> Result<History>
    where
        F: FnMut(&EpochRecord),
    {
        self.check_partitions(model, train, test)?;

        let cfg = &self.config;
        let mut train_src = BatchSource::new(train, cfg.batch_size, cfg.shuffle)?;
        let mut test_src = BatchSource::new(test, cfg.batch_size, Shuffle::None)?;
        let mut optimizer = cfg.optimizer.state(model)?;
        let mut scratch = model.scratch();
        let mut grads = model.gradients();
        let mut history = History {
            records: Vec::with_capacity(cfg.epochs),
        };

        debug!(
            "training for {} epochs: {} train batches, {} test batches per epoch",
            cfg.epochs,
            train_src.num_batches(),
            test_src.num_batches()
        );

        for epoch in 1..=cfg.epochs {
            let (train_loss, train_rmse) = train_pass(
                model,
                &mut train_src,
                &mut optimizer,
                &mut scratch,
                &mut grads,
                cfg.lr,
                epoch,
            )?;
            let (test_loss, test_rmse) = eval_pass(model, &mut test_src, &mut scratch)?;

            let record = EpochRecord {
                epoch,
                train_loss,
                train_rmse,
                test_loss,
                test_rmse,
            };
            info!(
                "epoch {epoch}/{}: train loss {train_loss:.4} rmse {train_rmse:.4} | test loss {test_loss:.4} rmse {test_rmse:.4}",
                cfg.epochs
            );
            on_epoch(&record);
            history.records.push(record);
        }

        Ok(history)
    }

    fn check_partitions(
        &self,
        model: &Regressor,
        train: &FeatureMatrix,
        test: &FeatureMatrix,
    ) -> Result<()> {
        if train.is_empty() {
            return Err(Error::EmptyPartition(
                "train partition has no rows".to_owned(),
            ));
        }
        if test.is_empty() {
            return Err(Error::EmptyPartition("test partition has no rows".to_owned()));
        }
        for (name, part) in [("train", train), ("test", test)] {
            if part.dim() != model.input_dim() {
                return Err(Error::InvalidShape(format!(
                    "{name} feature dim {} does not match model input_dim {}",
                    part.dim(),
                    model.input_dim()
                )));
            }
        }

        // Batch normalization cannot train on a single row.
        let b = self.config.batch_size;
        if b == 1 || train.len() % b == 1 {
            return Err(Error::InvalidShape(format!(
                "{} train rows in batches of {b} leaves a single-row training batch",
                train.len()
            )));
        }
        Ok(())
    }
}

fn train_pass(
    model: &mut Regressor,
    source: &mut BatchSource<'_>,
    optimizer: &mut OptimizerState,
    scratch: &mut Scratch,
    grads: &mut Gradients,
    lr: f32,
    epoch: usize,
) -> Result<(f32, f32)> {
    model.train();
    let mut totals = PassTotals::default();

    for (idx, batch) in source.pass().enumerate() {
        let rows = batch.rows();
        grads.zero();

        let pred = model.forward(batch.features(), rows, scratch)?;
        let loss = loss::mse_backward(pred, batch.targets(), grads.d_output_mut(rows));
        let rmse = metrics::rmse(pred, batch.targets());
        if !loss.is_finite() || rmse.is_infinite() {
            warn!("epoch {epoch} batch {idx}: non-finite training loss {loss}");
        }

        model.backward(batch.features(), rows, scratch, grads);
        optimizer.step(model, grads, lr);
        totals.add(loss, rmse, rows);
    }

    totals.means()
}

/// One pass in evaluation mode with no parameter updates.
fn eval_pass(
    model: &mut Regressor,
    source: &mut BatchSource<'_>,
    scratch: &mut Scratch,
) -> Result<(f32, f32)> {
    model.eval();
    let mut totals = PassTotals::default();

    for batch in source.pass() {
        let pred = model.forward(batch.features(), batch.rows(), scratch)?;
        let loss = loss::mse_loss(pred, batch.targets());
        let rmse = metrics::rmse(pred, batch.targets());
        totals.add(loss, rmse, batch.rows());
    }

    totals.means()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::RegressorBuilder;

    fn matrix(rows: usize, dim: usize, offset: usize) -> FeatureMatrix {
        let features: Vec<f32> = (0..rows * dim)
            .map(|i| (((i + offset) * 13 % 17) as f32 - 8.0) / 8.0)
            .collect();
        let targets: Vec<f32> = (0..rows)
            .map(|r| 1.0 + features[r * dim] * 0.5)
            .collect();
        FeatureMatrix::from_flat(features, targets, dim).unwrap()
    }

    fn model(dim: usize) -> Regressor {
        RegressorBuilder::from_hidden_dims(dim, &[8, 4], 0.2)
            .unwrap()
            .build_with_seed(11)
            .unwrap()
    }

    fn seeded(epochs: usize, batch_size: usize) -> FitConfig {
        FitConfig {
            epochs,
            batch_size,
            shuffle: Shuffle::Seeded(3),
            ..FitConfig::default()
        }
    }

    #[test]
    fn config_validation() {
        assert!(FitConfig::default().validate().is_ok());
        assert!(TrainingLoop::new(FitConfig { epochs: 0, ..FitConfig::default() }).is_err());
        assert!(TrainingLoop::new(FitConfig { lr: 0.0, ..FitConfig::default() }).is_err());
        assert!(TrainingLoop::new(FitConfig { lr: f32::NAN, ..FitConfig::default() }).is_err());
        assert!(
            TrainingLoop::new(FitConfig {
                batch_size: 0,
                ..FitConfig::default()
            })
            .is_err()
        );
    }

    #[test]
    fn records_one_entry_per_epoch() {
        let train = matrix(20, 3, 0);
        let test = matrix(6, 3, 5);
        let mut m = model(3);
        let mut seen = Vec::new();

        let history = TrainingLoop::new(seeded(4, 8))
            .unwrap()
            .run_with(&mut m, &train, &test, |r| seen.push(r.epoch))
            .unwrap();

        assert_eq!(history.len(), 4);
        assert_eq!(seen, vec![1, 2, 3, 4]);
        for (i, r) in history.iter().enumerate() {
            assert_eq!(r.epoch, i + 1);
            assert!(r.train_loss.is_finite() && r.train_rmse.is_finite());
            assert!(r.test_loss.is_finite() && r.test_rmse.is_finite());
        }
    }

    #[test]
    fn epoch_mean_is_weighted_by_batch_size() {
        let train = matrix(10, 3, 0);
        // Batches of 2 and 1 in the test pass.
        let test = matrix(3, 3, 7);
        let mut m = model(3);

        let history = TrainingLoop::new(seeded(1, 2))
            .unwrap()
            .run(&mut m, &train, &test)
            .unwrap();
        let record = history.last().unwrap();

        // Parameters are unchanged after the last eval pass, and eval mode is row-independent.
        assert_eq!(m.mode(), crate::Mode::Eval);
        let mut scratch = m.scratch();
        let pred = m.forward(test.features(), 3, &mut scratch).unwrap().to_vec();
        let first = loss::mse_loss(&pred[..2], &test.targets()[..2]);
        let second = loss::mse_loss(&pred[2..], &test.targets()[2..]);

        let weighted = (first * 2.0 + second) / 3.0;
        assert!(
            (record.test_loss - weighted).abs() <= 1e-5 * weighted.max(1.0),
            "recorded {} weighted {weighted}",
            record.test_loss
        );
        assert!((record.test_loss - loss::mse_loss(&pred, test.targets())).abs() <= 1e-5);

        let weighted_rmse =
            (metrics::rmse(&pred[..2], &test.targets()[..2]) * 2.0
                + metrics::rmse(&pred[2..], &test.targets()[2..]))
                / 3.0;
        assert!((record.test_rmse - weighted_rmse).abs() <= 1e-5 * weighted_rmse.max(1.0));
    }

    #[test]
    fn structural_problems_abort_the_run() {
        let train = matrix(10, 3, 0);
        let test = matrix(4, 3, 0);
        let empty = FeatureMatrix::from_flat(Vec::new(), Vec::new(), 3).unwrap();
        let looper = TrainingLoop::new(seeded(1, 4)).unwrap();

        let mut m = model(3);
        assert!(matches!(
            looper.run(&mut m, &empty, &test),
            Err(Error::EmptyPartition(_))
        ));
        assert!(matches!(
            looper.run(&mut m, &train, &empty),
            Err(Error::EmptyPartition(_))
        ));

        let mut wide = model(4);
        assert!(matches!(
            looper.run(&mut wide, &train, &test),
            Err(Error::InvalidShape(_))
        ));

        // 9 rows in batches of 4 leaves a trailing batch of one.
        let odd = matrix(9, 3, 0);
        assert!(matches!(
            looper.run(&mut m, &odd, &test),
            Err(Error::InvalidShape(_))
        ));
    }

    #[test]
    fn training_reduces_loss_on_a_learnable_target() {
        let train = matrix(64, 3, 0);
        let test = matrix(16, 3, 3);
        let mut m = model(3);
        let cfg = FitConfig {
            lr: 1e-2,
            ..seeded(30, 16)
        };

        let history = TrainingLoop::new(cfg).unwrap().run(&mut m, &train, &test).unwrap();
        let first = history.first().unwrap().train_loss;
        let last = history.last().unwrap().train_loss;
        assert!(last < first, "first {first} last {last}");
    }

    #[test]
    fn non_finite_feature_surfaces_in_rmse_and_training_continues() {
        let clean = matrix(40, 3, 0);
        let mut features = clean.features().to_vec();
        features[5] = f32::NAN;
        let train = FeatureMatrix::from_flat(features, clean.targets().to_vec(), 3).unwrap();
        let test = matrix(8, 3, 5);
        let mut m = model(3);

        let history = TrainingLoop::new(seeded(3, 8))
            .unwrap()
            .run(&mut m, &train, &test)
            .unwrap();

        assert_eq!(history.len(), 3);
        let first = history.first().unwrap();
        assert_eq!(first.train_rmse, f32::INFINITY);
        assert!(!first.train_loss.is_finite());
        for r in &history {
            assert_eq!(r.train_rmse, f32::INFINITY);
            assert_eq!(r.test_rmse, f32::INFINITY);
        }

        // The corruption reaches the predictions instead of being clipped away.
        let mut scratch = m.scratch();
        let pred = m.forward(test.features(), test.len(), &mut scratch).unwrap();
        assert!(pred.iter().all(|p| p.is_nan()));
    }

    #[test]
    fn non_finite_target_surfaces_in_rmse() {
        let clean = matrix(16, 3, 0);
        let mut targets = clean.targets().to_vec();
        targets[2] = f32::INFINITY;
        let train = FeatureMatrix::from_flat(clean.features().to_vec(), targets, 3).unwrap();
        let test = matrix(8, 3, 5);
        let mut m = model(3);

        let history = TrainingLoop::new(seeded(2, 8))
            .unwrap()
            .run(&mut m, &train, &test)
            .unwrap();

        assert_eq!(history.len(), 2);
        let first = history.first().unwrap();
        assert_eq!(first.train_rmse, f32::INFINITY);
        assert!(!first.train_loss.is_finite());
    }

    #[test]
    fn history_serializes_as_a_list_of_records() {
        let history = History {
            records: vec![EpochRecord {
                epoch: 1,
                train_loss: 0.5,
                train_rmse: 0.25,
                test_loss: 1.0,
                test_rmse: f32::INFINITY,
            }],
        };
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json[0]["epoch"], 1);
        assert_eq!(json[0]["train_loss"], 0.5);
        // serde_json has no infinity; it writes null.
        assert!(json[0]["test_rmse"].is_null());
    }
}
