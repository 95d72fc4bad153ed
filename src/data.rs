//! Feature matrix storage and the train/test split.
//!
//! Features are stored contiguously in row-major layout so batches can be gathered
//! with plain slice copies. Targets are scalar log view counts (`ln(1 + views)`).

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{Error, Result};

/// Numeric feature rows plus one scalar target per row.
///
/// Stored as contiguous buffers:
/// - `features.len() == len * dim`
/// - `targets.len() == len`
///
/// Row order is fixed at construction. Shuffling happens in [`crate::BatchSource`],
/// never by mutating the matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    features: Vec<f32>,
    targets: Vec<f32>,
    dim: usize,
}

/// Disjoint train/test partitions of one [`FeatureMatrix`].
#[derive(Debug, Clone)]
pub struct Split {
    pub train: FeatureMatrix,
    pub test: FeatureMatrix,
}

impl FeatureMatrix {
    /// Build a matrix from flat buffers with shape `(len, dim)` and `(len,)`.
    pub fn from_flat(features: Vec<f32>, targets: Vec<f32>, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidData("feature dim must be > 0".to_owned()));
        }
        if !features.len().is_multiple_of(dim) {
            return Err(Error::InvalidData(format!(
                "features length {} is not divisible by dim {dim}",
                features.len()
            )));
        }
        let len = features.len() / dim;
        if targets.len() != len {
            return Err(Error::InvalidData(format!(
                "targets length {} does not match row count {len}",
                targets.len()
            )));
        }

        Ok(Self {
            features,
            targets,
            dim,
        })
    }

    /// Build a matrix from per-sample rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f32>], targets: &[f32]) -> Result<Self> {
        if rows.len() != targets.len() {
            return Err(Error::InvalidData(format!(
                "rows/targets length mismatch: {} vs {}",
                rows.len(),
                targets.len()
            )));
        }
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if dim == 0 {
            return Err(Error::InvalidData(
                "rows must not be empty and dim must be > 0".to_owned(),
            ));
        }

        let mut features = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(Error::InvalidData(format!(
                    "row {i} has len {}, expected {dim}",
                    row.len()
                )));
            }
            features.extend_from_slice(row);
        }

        Self::from_flat(features, targets.to_vec(), dim)
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[inline]
    /// Returns the per-sample feature dimension `D`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    /// Returns the `idx`-th feature row (shape: `(dim,)`).
    ///
    /// Panics if `idx >= len`.
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.dim;
        &self.features[start..start + self.dim]
    }

    #[inline]
    /// Returns the `idx`-th target.
    ///
    /// Panics if `idx >= len`.
    pub fn target(&self, idx: usize) -> f32 {
        self.targets[idx]
    }

    #[inline]
    /// Row-major feature buffer with shape `(len, dim)`.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    #[inline]
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    /// Copy the given rows (in the given order) into a new matrix.
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut features = Vec::with_capacity(indices.len() * self.dim);
        let mut targets = Vec::with_capacity(indices.len());
        for &idx in indices {
            features.extend_from_slice(self.row(idx));
            targets.push(self.targets[idx]);
        }
        Self {
            features,
            targets,
            dim: self.dim,
        }
    }

    /// Partition into train/test once, up front.
    ///
    /// Train is a uniform random sample of `round(len * train_fraction)` rows, kept in
    /// sample order. Test holds every remaining row in stored order. The seed governs
    /// only this sampling.
    pub fn split(&self, train_fraction: f32, seed: u64) -> Result<Split> {
        if !(train_fraction.is_finite() && train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "train_fraction must be in (0, 1), got {train_fraction}"
            )));
        }

        let n = self.len();
        let n_train = (n as f64 * f64::from(train_fraction)).round() as usize;
        if n_train == 0 {
            return Err(Error::EmptyPartition(format!(
                "train partition of {n} rows at fraction {train_fraction} is empty"
            )));
        }
        if n_train >= n {
            return Err(Error::EmptyPartition(format!(
                "test partition of {n} rows at fraction {train_fraction} is empty"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);

        let train_idx = &order[..n_train];
        let mut in_train = vec![false; n];
        for &i in train_idx {
            in_train[i] = true;
        }
        let test_idx: Vec<usize> = (0..n).filter(|&i| !in_train[i]).collect();

        Ok(Split {
            train: self.select(train_idx),
            test: self.select(&test_idx),
        })
    }
}

/// `ln(1 + views)`: the target transform applied upstream of the regressor.
#[inline]
pub fn log1p_views(views: f64) -> f64 {
    views.ln_1p()
}

/// `e^z - 1`: inverts [`log1p_views`], recovering the original view-count scale.
#[inline]
pub fn expm1_views(z: f64) -> f64 {
    z.exp_m1()
}
