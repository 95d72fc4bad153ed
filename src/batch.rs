//! Mini-batch iteration over a [`FeatureMatrix`] partition.
//!
//! A [`BatchSource`] is restartable: every call to [`BatchSource::pass`] yields an
//! independent, lazy sequence of batches covering each row exactly once. Batches are
//! gathered on demand, so a pass never materializes more than one batch at a time.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{Error, FeatureMatrix, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Row order policy for each pass.
pub enum Shuffle {
    /// Stored row order (deterministic evaluation passes).
    #[default]
    None,
    /// Fresh permutation per pass, drawn from an RNG seeded once.
    Seeded(u64),
    /// Fresh permutation per pass, drawn from an entropy-seeded RNG.
    Random,
}

/// One mini-batch: `rows` feature rows (row-major) and their targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    features: Vec<f32>,
    targets: Vec<f32>,
    dim: usize,
}

impl Batch {
    #[inline]
    pub fn rows(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    /// Flat `(rows, dim)` feature slice.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    #[inline]
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }
}

/// Yields fixed-size batches from one partition.
#[derive(Debug)]
pub struct BatchSource<'a> {
    matrix: &'a FeatureMatrix,
    batch_size: usize,
    rng: Option<StdRng>,
    order: Vec<usize>,
}

impl<'a> BatchSource<'a> {
    pub fn new(matrix: &'a FeatureMatrix, batch_size: usize, shuffle: Shuffle) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        let rng = match shuffle {
            Shuffle::None => None,
            Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
            Shuffle::Random => Some(StdRng::from_entropy()),
        };

        Ok(Self {
            matrix,
            batch_size,
            rng,
            order: (0..matrix.len()).collect(),
        })
    }

    #[inline]
    /// Number of rows covered by each pass.
    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    /// `ceil(len / batch_size)`.
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Start a new pass. With shuffling enabled the row order is a fresh permutation.
    pub fn pass(&mut self) -> Batches<'_> {
        if let Some(rng) = self.rng.as_mut() {
            self.order.shuffle(rng);
        }
        Batches {
            matrix: self.matrix,
            order: &self.order,
            batch_size: self.batch_size,
            cursor: 0,
        }
    }
}

/// Lazy iterator over the batches of a single pass.
#[derive(Debug)]
pub struct Batches<'s> {
    matrix: &'s FeatureMatrix,
    order: &'s [usize],
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let idx = &self.order[self.cursor..end];
        self.cursor = end;

        let dim = self.matrix.dim();
        let mut features = Vec::with_capacity(idx.len() * dim);
        let mut targets = Vec::with_capacity(idx.len());
        for &i in idx {
            features.extend_from_slice(self.matrix.row(i));
            targets.push(self.matrix.target(i));
        }

        Some(Batch {
            features,
            targets,
            dim,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}
