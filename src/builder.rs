//! Regressor builder.
//!
//! `RegressorBuilder` is the recommended way to define a model.
//!
//! It makes the hidden stack explicit (block widths + activations) and chooses a
//! reasonable default weight initializer for each activation:
//!
//! - `tanh` / `identity`: Xavier/Glorot
//! - `relu` / `leaky relu`: He/Kaiming
//!
//! The output head is always a single affine unit with Xavier initialization.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::regressor::HiddenBlock;
use crate::{Activation, BatchNorm, Dropout, Error, Init, Linear, Regressor, Result};

#[derive(Debug, Clone, Copy)]
struct BlockSpec {
    width: usize,
    activation: Activation,
}

#[derive(Debug, Clone)]
/// Builder for a `Regressor`.
///
/// Example:
///
/// ```rust
/// use views_mlp::{Activation, RegressorBuilder};
///
/// # fn main() -> views_mlp::Result<()> {
/// let model = RegressorBuilder::new(4)?
///     .add_hidden(16, Activation::ReLU)?
///     .add_hidden(8, Activation::ReLU)?
///     .dropout(0.2)?
///     .build_with_seed(0)?;
/// assert_eq!(model.input_dim(), 4);
/// # Ok(())
/// # }
/// ```
pub struct RegressorBuilder {
    input_dim: usize,
    blocks: Vec<BlockSpec>,
    dropout: Dropout,
}

impl RegressorBuilder {
    /// Start building a regressor that accepts rows of length `input_dim`.
    ///
    /// Dropout defaults to `0.2`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            blocks: Vec::new(),
            dropout: Dropout::new(0.2)?,
        })
    }

    /// Convenience constructor: one ReLU block per entry of `hidden_dims`.
    pub fn from_hidden_dims(input_dim: usize, hidden_dims: &[usize], dropout_rate: f32) -> Result<Self> {
        if hidden_dims.is_empty() {
            return Err(Error::InvalidConfig(
                "hidden_dims must name at least one block".to_owned(),
            ));
        }

        let mut b = Self::new(input_dim)?.dropout(dropout_rate)?;
        for &width in hidden_dims {
            b = b.add_hidden(width, Activation::ReLU)?;
        }
        Ok(b)
    }

    /// Add a hidden block: affine -> batch norm -> `activation` -> dropout.
    pub fn add_hidden(mut self, width: usize, activation: Activation) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidConfig("hidden width must be > 0".to_owned()));
        }
        activation.validate()?;

        self.blocks.push(BlockSpec { width, activation });
        Ok(self)
    }

    /// Dropout rate shared by every hidden block.
    pub fn dropout(mut self, rate: f32) -> Result<Self> {
        self.dropout = Dropout::new(rate)?;
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Regressor> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build with OS entropy; every call yields a different initialization.
    pub fn build(self) -> Result<Regressor> {
        let mut rng = StdRng::from_entropy();
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    ///
    /// Weights are drawn first; the dropout mask generator is then seeded from `rng`.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Regressor> {
        if self.blocks.is_empty() {
            return Err(Error::InvalidConfig(
                "regressor must have at least one hidden block".to_owned(),
            ));
        }

        let mut blocks = Vec::with_capacity(self.blocks.len());
        let mut in_dim = self.input_dim;
        for spec in &self.blocks {
            let init = default_init_for_activation(spec.activation);
            blocks.push(HiddenBlock {
                linear: Linear::new_with_rng(in_dim, spec.width, init, rng)?,
                norm: BatchNorm::new(spec.width),
                activation: spec.activation,
                dropout: self.dropout,
            });
            in_dim = spec.width;
        }
        let head = Linear::new_with_rng(in_dim, 1, Init::Xavier, rng)?;
        let dropout_rng = StdRng::seed_from_u64(rng.next_u64());

        let model = Regressor::from_parts(blocks, head, dropout_rng);
        debug!(
            "built regressor: input_dim={} hidden={:?} dropout={} params={}",
            self.input_dim,
            model.hidden_dims(),
            self.dropout.rate(),
            model.num_params()
        );
        Ok(model)
    }
}

#[inline]
fn default_init_for_activation(act: Activation) -> Init {
    match act {
        Activation::Tanh | Activation::Identity => Init::Xavier,
        Activation::ReLU | Activation::LeakyReLU { .. } => Init::He,
    }
}
