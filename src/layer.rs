//! Affine (fully connected) layer over a batch of rows.

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::matmul;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Weight initialization scheme.
pub enum Init {
    /// Xavier/Glorot uniform: `U(-sqrt(6 / (in + out)), +sqrt(6 / (in + out)))`.
    Xavier,
    /// He/Kaiming uniform: `U(-sqrt(6 / in), +sqrt(6 / in))`.
    He,
}

#[derive(Debug, Clone)]
pub struct Linear {
    in_dim: usize,
    out_dim: usize,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Linear {
    /// Allocate a layer with weights drawn from `init` and zero biases.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "linear layer dims must be > 0, got {in_dim}x{out_dim}"
            )));
        }

        let limit = match init {
            Init::Xavier => (6.0 / (in_dim + out_dim) as f32).sqrt(),
            Init::He => (6.0 / in_dim as f32).sqrt(),
        };
        let dist = Uniform::new_inclusive(-limit, limit);
        let weights = (0..in_dim * out_dim).map(|_| dist.sample(rng)).collect();

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Learnable parameters in optimizer order: weights, then biases.
    #[inline]
    pub(crate) fn params_mut(&mut self) -> [&mut [f32]; 2] {
        [self.weights.as_mut_slice(), self.biases.as_mut_slice()]
    }

    /// Forward pass for `rows` samples.
    ///
    /// Computes `outputs = inputs * W^T + b`.
    ///
    /// Shape contract:
    /// - `inputs.len() == rows * self.in_dim`
    /// - `outputs.len() == rows * self.out_dim`
    pub fn forward(&self, inputs: &[f32], rows: usize, outputs: &mut [f32]) {
        assert_eq!(inputs.len(), rows * self.in_dim, "linear input shape");
        assert_eq!(outputs.len(), rows * self.out_dim, "linear output shape");

        matmul::x_wt(inputs, &self.weights, rows, self.in_dim, self.out_dim, outputs);
        for row in outputs.chunks_exact_mut(self.out_dim) {
            for (o, b) in row.iter_mut().zip(&self.biases) {
                *o += b;
            }
        }
    }

    /// Backward pass for `rows` samples.
    ///
    /// Accumulates into `d_weights` / `d_biases` (callers zero them once per batch).
    /// If `d_inputs` is given it is overwritten with `dL/d(inputs)`.
    ///
    /// Shape contract:
    /// - `inputs.len() == rows * self.in_dim`
    /// - `d_outputs.len() == rows * self.out_dim`
    /// - `d_weights.len() == self.weights.len()`, `d_biases.len() == self.out_dim`
    pub fn backward(
        &self,
        inputs: &[f32],
        rows: usize,
        d_outputs: &[f32],
        d_weights: &mut [f32],
        d_biases: &mut [f32],
        d_inputs: Option<&mut [f32]>,
    ) {
        assert_eq!(inputs.len(), rows * self.in_dim, "linear input shape");
        assert_eq!(d_outputs.len(), rows * self.out_dim, "linear d_output shape");
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        matmul::acc_dyt_x(d_outputs, inputs, rows, self.in_dim, self.out_dim, d_weights);
        for row in d_outputs.chunks_exact(self.out_dim) {
            for (db, d) in d_biases.iter_mut().zip(row) {
                *db += d;
            }
        }

        if let Some(d_inputs) = d_inputs {
            assert_eq!(d_inputs.len(), rows * self.in_dim, "linear d_input shape");
            matmul::dy_w(d_outputs, &self.weights, rows, self.in_dim, self.out_dim, d_inputs);
        }
    }
}
