//! Batch normalization over the feature axis of a `(rows, dim)` batch.
//!
//! Training mode normalizes with per-batch statistics and folds them into the running
//! averages. Evaluation mode uses only the running averages, so its output for a row
//! never depends on the other rows in the batch.

use crate::Mode;

const EPS: f32 = 1e-5;
const MOMENTUM: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct BatchNorm {
    dim: usize,
    gamma: Vec<f32>,
    beta: Vec<f32>,
    running_mean: Vec<f32>,
    running_var: Vec<f32>,
}

/// Values a training-mode forward pass leaves behind for backprop.
#[derive(Debug, Clone, Default)]
pub struct NormCache {
    /// Normalized inputs, `(rows, dim)`.
    x_hat: Vec<f32>,
    /// `1 / sqrt(var + eps)` per feature.
    inv_std: Vec<f32>,
    mean: Vec<f32>,
    /// Per-feature reductions of the upstream gradient, filled by `backward`.
    sum_dy: Vec<f32>,
    sum_dy_xhat: Vec<f32>,
}

impl NormCache {
    pub(crate) fn resize(&mut self, rows: usize, dim: usize) {
        self.x_hat.resize(rows * dim, 0.0);
        self.inv_std.resize(dim, 0.0);
        self.mean.resize(dim, 0.0);
        self.sum_dy.resize(dim, 0.0);
        self.sum_dy_xhat.resize(dim, 0.0);
    }
}

impl BatchNorm {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            gamma: vec![1.0; dim],
            beta: vec![0.0; dim],
            running_mean: vec![0.0; dim],
            running_var: vec![1.0; dim],
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn running_mean(&self) -> &[f32] {
        &self.running_mean
    }

    #[inline]
    pub fn running_var(&self) -> &[f32] {
        &self.running_var
    }

    #[cfg(test)]
    fn gamma_mut(&mut self) -> &mut [f32] {
        &mut self.gamma
    }

    /// Learnable parameters in optimizer order: gamma, then beta.
    #[inline]
    pub(crate) fn params_mut(&mut self) -> [&mut [f32]; 2] {
        [self.gamma.as_mut_slice(), self.beta.as_mut_slice()]
    }

    /// Normalize `inputs` into `outputs`.
    ///
    /// In [`Mode::Train`] this needs at least two rows and updates the running
    /// statistics (running variance uses the unbiased batch variance).
    pub fn forward(
        &mut self,
        inputs: &[f32],
        rows: usize,
        mode: Mode,
        cache: &mut NormCache,
        outputs: &mut [f32],
    ) {
        let d = self.dim;
        assert_eq!(inputs.len(), rows * d, "batch norm input shape");
        assert_eq!(outputs.len(), rows * d, "batch norm output shape");

        match mode {
            Mode::Eval => {
                for (x_row, y_row) in inputs.chunks_exact(d).zip(outputs.chunks_exact_mut(d)) {
                    for j in 0..d {
                        let inv_std = 1.0 / (self.running_var[j] + EPS).sqrt();
                        y_row[j] =
                            self.gamma[j] * (x_row[j] - self.running_mean[j]) * inv_std + self.beta[j];
                    }
                }
            }
            Mode::Train => {
                assert!(rows > 1, "batch norm needs more than one row in training mode");
                cache.resize(rows, d);
                let n = rows as f32;

                cache.mean.fill(0.0);
                for x_row in inputs.chunks_exact(d) {
                    for (m, x) in cache.mean.iter_mut().zip(x_row) {
                        *m += x;
                    }
                }
                for m in cache.mean.iter_mut() {
                    *m /= n;
                }

                // Biased variance, accumulated in `inv_std` before inversion.
                cache.inv_std.fill(0.0);
                for x_row in inputs.chunks_exact(d) {
                    for j in 0..d {
                        let c = x_row[j] - cache.mean[j];
                        cache.inv_std[j] = c.mul_add(c, cache.inv_std[j]);
                    }
                }
                for j in 0..d {
                    let var = cache.inv_std[j] / n;
                    self.running_mean[j] =
                        (1.0 - MOMENTUM) * self.running_mean[j] + MOMENTUM * cache.mean[j];
                    self.running_var[j] =
                        (1.0 - MOMENTUM) * self.running_var[j] + MOMENTUM * var * n / (n - 1.0);
                    cache.inv_std[j] = 1.0 / (var + EPS).sqrt();
                }

                for ((x_row, xh_row), y_row) in inputs
                    .chunks_exact(d)
                    .zip(cache.x_hat.chunks_exact_mut(d))
                    .zip(outputs.chunks_exact_mut(d))
                {
                    for j in 0..d {
                        let xh = (x_row[j] - cache.mean[j]) * cache.inv_std[j];
                        xh_row[j] = xh;
                        y_row[j] = self.gamma[j].mul_add(xh, self.beta[j]);
                    }
                }
            }
        }
    }

    /// Backward pass through a training-mode forward.
    ///
    /// `d_values` holds `dL/d(outputs)` on entry and `dL/d(inputs)` on return.
    /// Parameter gradients are accumulated into `d_gamma` / `d_beta`.
    pub fn backward(
        &self,
        rows: usize,
        cache: &mut NormCache,
        d_values: &mut [f32],
        d_gamma: &mut [f32],
        d_beta: &mut [f32],
    ) {
        let d = self.dim;
        assert_eq!(d_values.len(), rows * d, "batch norm d_output shape");
        assert_eq!(cache.x_hat.len(), rows * d, "batch norm cache shape");
        debug_assert_eq!(d_gamma.len(), d);
        debug_assert_eq!(d_beta.len(), d);

        let n = rows as f32;
        let NormCache {
            x_hat,
            inv_std,
            sum_dy,
            sum_dy_xhat,
            ..
        } = cache;
        sum_dy.resize(d, 0.0);
        sum_dy_xhat.resize(d, 0.0);
        sum_dy.fill(0.0);
        sum_dy_xhat.fill(0.0);
        for (dy_row, xh_row) in d_values.chunks_exact(d).zip(x_hat.chunks_exact(d)) {
            for j in 0..d {
                sum_dy[j] += dy_row[j];
                sum_dy_xhat[j] = dy_row[j].mul_add(xh_row[j], sum_dy_xhat[j]);
            }
        }

        for j in 0..d {
            d_gamma[j] += sum_dy_xhat[j];
            d_beta[j] += sum_dy[j];
        }

        for (dy_row, xh_row) in d_values.chunks_exact_mut(d).zip(x_hat.chunks_exact(d)) {
            for j in 0..d {
                let scale = self.gamma[j] * inv_std[j] / n;
                dy_row[j] = scale * (n * dy_row[j] - sum_dy[j] - xh_row[j] * sum_dy_xhat[j]);
            }
        }
    }
}
