//! The regressor: hidden blocks of affine -> batch norm -> activation -> dropout,
//! then an affine head with one output per row.
//!
//! Buffers are owned outside the model. [`Scratch`] holds per-batch activations and
//! batch-norm caches, [`Gradients`] holds parameter gradients and backprop
//! intermediates. Both are sized on the first batch and reused afterwards.

use log::debug;
use rand::rngs::StdRng;

use crate::norm::NormCache;
use crate::{Activation, BatchNorm, Dropout, Error, Linear, Result};

/// Layer behavior switch, set explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Dropout active; batch norm uses batch statistics and updates running averages.
    #[default]
    Train,
    /// Dropout is the identity; batch norm uses running averages only.
    Eval,
}

/// affine -> batch norm -> activation -> dropout
#[derive(Debug, Clone)]
pub(crate) struct HiddenBlock {
    pub(crate) linear: Linear,
    pub(crate) norm: BatchNorm,
    pub(crate) activation: Activation,
    pub(crate) dropout: Dropout,
}

/// Feed-forward regressor: a stack of hidden blocks followed by an affine head
/// producing one scalar per row.
#[derive(Debug, Clone)]
pub struct Regressor {
    blocks: Vec<HiddenBlock>,
    head: Linear,
    mode: Mode,
    /// Drives dropout masks.
    rng: StdRng,
}

/// Reusable per-batch buffers for `Regressor::forward`.
///
/// The output of the most recent forward pass lives inside `Scratch`.
#[derive(Debug, Clone)]
pub struct Scratch {
    rows: usize,
    blocks: Vec<BlockScratch>,
    output: Vec<f32>,
}

#[derive(Debug, Clone)]
struct BlockScratch {
    width: usize,
    /// Affine output (batch norm input).
    z: Vec<f32>,
    norm: NormCache,
    /// Post-activation, pre-dropout.
    act: Vec<f32>,
    mask: Vec<f32>,
    /// Block output (post-dropout).
    out: Vec<f32>,
}

/// Parameter gradients for a `Regressor` (accumulate semantics).
///
/// Allocate once via `Regressor::gradients()`, call `zero()` before each batch.
#[derive(Debug, Clone)]
pub struct Gradients {
    blocks: Vec<BlockGrads>,
    head_weights: Vec<f32>,
    head_biases: Vec<f32>,

    // Backprop intermediates: dL/d(block output) per hidden block, and dL/d(prediction).
    d_hidden: Vec<Vec<f32>>,
    d_output: Vec<f32>,
}

#[derive(Debug, Clone)]
struct BlockGrads {
    d_weights: Vec<f32>,
    d_biases: Vec<f32>,
    d_gamma: Vec<f32>,
    d_beta: Vec<f32>,
}

impl HiddenBlock {
    fn forward(
        &mut self,
        input: &[f32],
        rows: usize,
        mode: Mode,
        rng: &mut StdRng,
        s: &mut BlockScratch,
    ) {
        self.linear.forward(input, rows, &mut s.z);
        self.norm.forward(&s.z, rows, mode, &mut s.norm, &mut s.act);
        self.activation.forward_in_place(&mut s.act);
        self.dropout.forward(&s.act, mode, rng, &mut s.mask, &mut s.out);
    }

    /// `d_values` holds dL/d(block output) on entry; it is consumed as scratch.
    fn backward(
        &self,
        input: &[f32],
        rows: usize,
        s: &mut BlockScratch,
        d_values: &mut [f32],
        grads: &mut BlockGrads,
        d_input: Option<&mut [f32]>,
    ) {
        Dropout::backward(&s.mask, d_values);
        for (d, &y) in d_values.iter_mut().zip(&s.act) {
            *d *= self.activation.grad_from_output(y);
        }
        self.norm
            .backward(rows, &mut s.norm, d_values, &mut grads.d_gamma, &mut grads.d_beta);
        self.linear.backward(
            input,
            rows,
            d_values,
            &mut grads.d_weights,
            &mut grads.d_biases,
            d_input,
        );
    }
}

impl Regressor {
    pub(crate) fn from_parts(blocks: Vec<HiddenBlock>, head: Linear, rng: StdRng) -> Self {
        debug_assert_eq!(head.out_dim(), 1);
        Self {
            blocks,
            head,
            mode: Mode::Train,
            rng,
        }
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.blocks
            .first()
            .map(|b| b.linear.in_dim())
            .unwrap_or_else(|| self.head.in_dim())
    }

    /// Widths of the hidden blocks, input side first.
    pub fn hidden_dims(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.linear.out_dim()).collect()
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            debug!("regressor mode {:?} -> {mode:?}", self.mode);
        }
        self.mode = mode;
    }

    #[inline]
    pub fn train(&mut self) {
        self.set_mode(Mode::Train);
    }

    #[inline]
    pub fn eval(&mut self) {
        self.set_mode(Mode::Eval);
    }

    /// Batch normalization layer of hidden block `idx`.
    pub fn norm(&self, idx: usize) -> Option<&BatchNorm> {
        self.blocks.get(idx).map(|b| &b.norm)
    }

    #[cfg(test)]
    pub(crate) fn head_mut(&mut self) -> &mut Linear {
        &mut self.head
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    /// Lengths of the learnable parameter slices, in `params_mut` order.
    pub fn param_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.blocks.len() * 4 + 2);
        for b in &self.blocks {
            sizes.push(b.linear.in_dim() * b.linear.out_dim());
            sizes.push(b.linear.out_dim());
            sizes.push(b.norm.dim());
            sizes.push(b.norm.dim());
        }
        sizes.push(self.head.in_dim());
        sizes.push(1);
        sizes
    }

    pub fn num_params(&self) -> usize {
        self.param_sizes().iter().sum()
    }

    /// Every learnable slice: per block weights, biases, gamma, beta; then the head's
    /// weights and biases. Gradients are laid out in the same order.
    pub fn params_mut(&mut self) -> Vec<&mut [f32]> {
        let mut out = Vec::with_capacity(self.blocks.len() * 4 + 2);
        for block in &mut self.blocks {
            out.extend(block.linear.params_mut());
            out.extend(block.norm.params_mut());
        }
        out.extend(self.head.params_mut());
        out
    }

    /// Calls `f(slot, params, grads)` for every learnable slice and its gradient, in
    /// `params_mut` order. `slot` is the slice's position in that order.
    ///
    /// Panics if `grads` was built for a regressor with a different block count.
    pub(crate) fn visit_params_mut<F>(&mut self, grads: &Gradients, mut f: F)
    where
        F: FnMut(usize, &mut [f32], &[f32]),
    {
        assert_eq!(
            grads.blocks.len(),
            self.blocks.len(),
            "gradients were built for a different regressor"
        );

        let mut slot = 0;
        for (block, g) in self.blocks.iter_mut().zip(&grads.blocks) {
            let [w, b] = block.linear.params_mut();
            let [gamma, beta] = block.norm.params_mut();
            for (p, d) in [
                (w, g.d_weights.as_slice()),
                (b, g.d_biases.as_slice()),
                (gamma, g.d_gamma.as_slice()),
                (beta, g.d_beta.as_slice()),
            ] {
                f(slot, p, d);
                slot += 1;
            }
        }
        let [w, b] = self.head.params_mut();
        f(slot, w, grads.head_weights.as_slice());
        f(slot + 1, b, grads.head_biases.as_slice());
    }

    /// Forward pass for a batch of `rows` samples in the current [`Mode`].
    ///
    /// `features` is row-major `(rows, input_dim)`. Returns one prediction per row.
    /// Writes intermediate activations into `scratch` for a following `backward`.
    ///
    /// Errors with [`Error::InvalidShape`] when the feature width differs from the
    /// width the first layer was built for, or when a training-mode batch has fewer
    /// than two rows (batch statistics are undefined).
    pub fn forward<'a>(
        &mut self,
        features: &[f32],
        rows: usize,
        scratch: &'a mut Scratch,
    ) -> Result<&'a [f32]> {
        let input_dim = self.input_dim();
        if rows == 0 {
            return Err(Error::InvalidShape(
                "batch must contain at least one row".to_owned(),
            ));
        }
        if features.len() != rows * input_dim {
            return Err(Error::InvalidShape(format!(
                "features length {} does not match {rows} rows x input_dim {input_dim}",
                features.len()
            )));
        }
        if self.mode == Mode::Train && rows < 2 {
            return Err(Error::InvalidShape(
                "training-mode batches need at least 2 rows for batch normalization".to_owned(),
            ));
        }
        if scratch.blocks.len() != self.blocks.len()
            || scratch
                .blocks
                .iter()
                .zip(&self.blocks)
                .any(|(s, b)| s.width != b.linear.out_dim())
        {
            return Err(Error::InvalidShape(
                "scratch was built for a different regressor".to_owned(),
            ));
        }

        scratch.resize(rows);
        let Self {
            blocks,
            head,
            mode,
            rng,
        } = self;

        for (idx, block) in blocks.iter_mut().enumerate() {
            // Borrow the previous output immutably and the current buffers mutably.
            let (done, rest) = scratch.blocks.split_at_mut(idx);
            let input: &[f32] = if idx == 0 { features } else { &done[idx - 1].out };
            block.forward(input, rows, *mode, rng, &mut rest[0]);
        }

        let head_input = scratch
            .blocks
            .last()
            .map(|b| b.out.as_slice())
            .unwrap_or(features);
        head.forward(head_input, rows, &mut scratch.output);

        Ok(&scratch.output)
    }

    /// Backward pass for the batch most recently run through `forward`.
    ///
    /// Write `dL/d(predictions)` into `grads.d_output_mut(rows)` first. Parameter
    /// gradients are accumulated into `grads`.
    ///
    /// Panics if the regressor is not in [`Mode::Train`] or if shapes disagree with
    /// the preceding forward pass.
    pub fn backward(
        &self,
        features: &[f32],
        rows: usize,
        scratch: &mut Scratch,
        grads: &mut Gradients,
    ) {
        assert_eq!(
            self.mode,
            Mode::Train,
            "backward requires a training-mode forward pass"
        );
        assert_eq!(
            features.len(),
            rows * self.input_dim(),
            "features length {} does not match {rows} rows x input_dim {}",
            features.len(),
            self.input_dim()
        );
        assert_eq!(scratch.rows, rows, "scratch holds a different batch");
        assert_eq!(
            grads.d_output.len(),
            rows,
            "d_output len {} does not match {rows} rows",
            grads.d_output.len()
        );
        assert_eq!(
            grads.blocks.len(),
            self.blocks.len(),
            "grads has {} blocks, model has {}",
            grads.blocks.len(),
            self.blocks.len()
        );

        let Gradients {
            blocks: block_grads,
            head_weights,
            head_biases,
            d_hidden,
            d_output,
        } = grads;

        let head_input = scratch
            .blocks
            .last()
            .map(|b| b.out.as_slice())
            .unwrap_or(features);
        self.head.backward(
            head_input,
            rows,
            d_output,
            head_weights,
            head_biases,
            d_hidden.last_mut().map(|d| d.as_mut_slice()),
        );

        for idx in (0..self.blocks.len()).rev() {
            let (done, rest) = scratch.blocks.split_at_mut(idx);
            let input: &[f32] = if idx == 0 { features } else { &done[idx - 1].out };

            // `d_values` for this block, `d_input` becomes the previous block's `d_values`.
            let (left, right) = d_hidden.split_at_mut(idx);
            let d_values = &mut right[0];
            let d_input = left.last_mut().map(|d| d.as_mut_slice());

            self.blocks[idx].backward(
                input,
                rows,
                &mut rest[0],
                d_values,
                &mut block_grads[idx],
                d_input,
            );
        }
    }
}

impl Scratch {
    pub fn new(model: &Regressor) -> Self {
        let blocks = model
            .blocks
            .iter()
            .map(|b| BlockScratch {
                width: b.linear.out_dim(),
                z: Vec::new(),
                norm: NormCache::default(),
                act: Vec::new(),
                mask: Vec::new(),
                out: Vec::new(),
            })
            .collect();
        Self {
            rows: 0,
            blocks,
            output: Vec::new(),
        }
    }

    fn resize(&mut self, rows: usize) {
        self.rows = rows;
        for b in &mut self.blocks {
            let len = rows * b.width;
            b.z.resize(len, 0.0);
            b.norm.resize(rows, b.width);
            b.act.resize(len, 0.0);
            b.mask.resize(len, 0.0);
            b.out.resize(len, 0.0);
        }
        self.output.resize(rows, 0.0);
    }

    #[inline]
    /// Predictions from the most recent forward pass.
    pub fn output(&self) -> &[f32] {
        &self.output
    }
}

impl Gradients {
    pub fn new(model: &Regressor) -> Self {
        let blocks = model
            .blocks
            .iter()
            .map(|b| BlockGrads {
                d_weights: vec![0.0; b.linear.in_dim() * b.linear.out_dim()],
                d_biases: vec![0.0; b.linear.out_dim()],
                d_gamma: vec![0.0; b.norm.dim()],
                d_beta: vec![0.0; b.norm.dim()],
            })
            .collect();
        let d_hidden = model.blocks.iter().map(|_| Vec::new()).collect();

        Self {
            blocks,
            head_weights: vec![0.0; model.head.in_dim()],
            head_biases: vec![0.0; 1],
            d_hidden,
            d_output: Vec::new(),
        }
    }

    /// Reset every parameter gradient to zero.
    pub fn zero(&mut self) {
        for b in &mut self.blocks {
            b.d_weights.fill(0.0);
            b.d_biases.fill(0.0);
            b.d_gamma.fill(0.0);
            b.d_beta.fill(0.0);
        }
        self.head_weights.fill(0.0);
        self.head_biases.fill(0.0);
    }

    /// Mutable view of the upstream gradient `dL/d(predictions)` for a batch of
    /// `rows` samples.
    ///
    /// Typical training flow:
    /// - `model.forward(features, rows, &mut scratch)`
    /// - loss writes `dL/d(pred)` into `grads.d_output_mut(rows)`
    /// - `model.backward(features, rows, &mut scratch, &mut grads)`
    pub fn d_output_mut(&mut self, rows: usize) -> &mut [f32] {
        for (d, b) in self.d_hidden.iter_mut().zip(&self.blocks) {
            d.resize(rows * b.d_biases.len(), 0.0);
        }
        self.d_output.resize(rows, 0.0);
        &mut self.d_output
    }

    /// Every parameter gradient, in `Regressor::params_mut` order.
    #[cfg(test)]
    pub(crate) fn slices(&self) -> Vec<&[f32]> {
        let mut out: Vec<&[f32]> = Vec::with_capacity(self.blocks.len() * 4 + 2);
        for b in &self.blocks {
            out.push(&b.d_weights);
            out.push(&b.d_biases);
            out.push(&b.d_gamma);
            out.push(&b.d_beta);
        }
        out.push(&self.head_weights);
        out.push(&self.head_biases);
        out
    }

    /// Mutable view of every parameter gradient, in `Regressor::params_mut` order.
    #[cfg(test)]
    pub(crate) fn slices_mut(&mut self) -> Vec<&mut [f32]> {
        let mut out: Vec<&mut [f32]> = Vec::with_capacity(self.blocks.len() * 4 + 2);
        for b in &mut self.blocks {
            out.push(&mut b.d_weights);
            out.push(&mut b.d_biases);
            out.push(&mut b.d_gamma);
            out.push(&mut b.d_beta);
        }
        out.push(&mut self.head_weights);
        out.push(&mut self.head_biases);
        out
    }

    /// L2 norm over all parameter gradients.
    #[cfg(test)]
    fn norm(&self) -> f32 {
        self.slices()
            .iter()
            .flat_map(|s| s.iter())
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt()
    }
}
