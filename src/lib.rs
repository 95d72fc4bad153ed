//! Log view-count regression from numeric video metadata.
//!
//! `views-mlp` trains a small feed-forward regressor (affine -> batch norm -> ReLU ->
//! dropout blocks, then an affine head) on `ln(1 + views)` targets, tracks mean loss
//! and RMSE per epoch, and reports how well the held-out predictions correlate with
//! the truth on both the log and the raw view-count scale.
//!
//! # Design goals
//!
//! - Predictable performance: reuse buffers (`Scratch` / `Gradients`) instead of allocating.
//! - Clear contracts: shapes are explicit and validated at the API boundary.
//! - Explicit modes: dropout and batch normalization read a caller-set [`Mode`].
//!
//! # Panics vs `Result`
//!
//! - Low-level hot path (panics on misuse): [`Linear::forward`], [`BatchNorm::forward`],
//!   [`loss::mse_backward`], [`Regressor::backward`]. Shape mismatches there are
//!   programmer error and panic via `assert!`.
//! - High-level APIs (shape-checked): [`Regressor::forward`], [`TrainingLoop::run`],
//!   [`Evaluator::evaluate`], [`table::load_csv`]. These validate inputs and return
//!   [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`; correlations are computed in `f64`.
//! - [`FeatureMatrix`] stores rows contiguously in row-major layout.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//! - Batches are flat row-major buffers of shape `(rows, dim)` with one target per row.
//!
//! # Quick start
//!
//! ```rust
//! use views_mlp::{Evaluator, FeatureMatrix, FitConfig, RegressorBuilder, Shuffle, TrainingLoop};
//!
//! # fn main() -> views_mlp::Result<()> {
//! let features: Vec<f32> = (0..40 * 3).map(|i| (i % 11) as f32 / 10.0).collect();
//! let targets: Vec<f32> = (0..40).map(|r| 1.0 + features[r * 3]).collect();
//! let matrix = FeatureMatrix::from_flat(features, targets, 3)?;
//! let split = matrix.split(0.8, 42)?;
//!
//! let mut model = RegressorBuilder::from_hidden_dims(3, &[16, 8], 0.2)?.build_with_seed(0)?;
//! let history = TrainingLoop::new(FitConfig {
//!     epochs: 3,
//!     batch_size: 8,
//!     shuffle: Shuffle::Seeded(0),
//!     ..FitConfig::default()
//! })?
//! .run(&mut model, &split.train, &split.test)?;
//! assert_eq!(history.len(), 3);
//!
//! let eval = Evaluator::new(8)?.evaluate(&mut model, &split.test)?;
//! assert_eq!(eval.len(), split.test.len());
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod batch;
pub mod builder;
pub mod config;
pub mod data;
pub mod dropout;
pub mod error;
pub mod eval;
pub mod experiment;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod metrics;
pub mod norm;
pub mod optim;
pub mod regressor;
pub mod table;
pub mod train;

pub use activation::Activation;
pub use batch::{Batch, BatchSource, Batches, Shuffle};
pub use builder::RegressorBuilder;
pub use config::{OptimizerKind, RunConfig};
pub use data::{FeatureMatrix, Split, expm1_views, log1p_views};
pub use dropout::Dropout;
pub use error::{Error, Result};
pub use eval::{Evaluation, Evaluator, PredictionPair};
pub use experiment::{Experiment, ExperimentReport};
pub use layer::{Init, Linear};
pub use loss::{mse_backward, mse_loss};
pub use metrics::{PassTotals, pearson, rmse};
pub use norm::{BatchNorm, NormCache};
pub use optim::{Optimizer, OptimizerState};
pub use regressor::{Gradients, Mode, Regressor, Scratch};
pub use table::{LoadedTable, load_csv, load_csv_reader};
pub use train::{EpochRecord, FitConfig, History, TrainingLoop};
