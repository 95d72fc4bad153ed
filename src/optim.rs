//! Optimizers.
//!
//! This module provides small, allocation-free-per-step optimizers that update a
//! `Regressor` given a set of `Gradients`.
//!
//! Design notes:
//! - Optimizer *state* (momentum/Adam moments) lives outside the model.
//! - The training loop owns the optimizer state and reuses it across steps.
//! - State is laid out per parameter slice, in `Regressor::params_mut` order.

use log::debug;

use crate::{Error, Gradients, Regressor, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
/// Optimizer choice for training.
pub enum Optimizer {
    /// Plain SGD.
    Sgd,
    /// SGD with momentum.
    SgdMomentum { momentum: f32 },
    /// Adam (bias-corrected).
    Adam { beta1: f32, beta2: f32, eps: f32 },
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl Optimizer {
    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::SgdMomentum { momentum } => {
                if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                    return Err(Error::InvalidConfig(format!(
                        "momentum must be finite and in [0,1), got {momentum}"
                    )));
                }
                Ok(())
            }
            Optimizer::Adam { beta1, beta2, eps } => {
                if !(beta1.is_finite() && (0.0..1.0).contains(&beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {beta1}"
                    )));
                }
                if !(beta2.is_finite() && (0.0..1.0).contains(&beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {beta2}"
                    )));
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state for `model`.
    pub fn state(self, model: &Regressor) -> Result<OptimizerState> {
        self.validate()?;
        debug!("optimizer {self:?} over {} parameters", model.num_params());

        match self {
            Optimizer::Sgd => Ok(OptimizerState::Sgd),
            Optimizer::SgdMomentum { momentum } => Ok(OptimizerState::SgdMomentum {
                momentum,
                velocity: zeros_like_params(model),
            }),
            Optimizer::Adam { beta1, beta2, eps } => Ok(OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t: 0,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: zeros_like_params(model),
                v: zeros_like_params(model),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Owned optimizer state.
pub enum OptimizerState {
    /// Plain SGD (no state).
    #[default]
    Sgd,
    /// SGD with momentum state.
    SgdMomentum {
        momentum: f32,
        velocity: Vec<Vec<f32>>,
    },
    /// Adam state.
    Adam {
        beta1: f32,
        beta2: f32,
        eps: f32,
        t: u64,
        beta1_pow: f32,
        beta2_pow: f32,
        m: Vec<Vec<f32>>,
        v: Vec<Vec<f32>>,
    },
}

impl OptimizerState {
    /// Apply one optimizer step.
    ///
    /// `lr` is passed in from the training loop.
    pub fn step(&mut self, model: &mut Regressor, grads: &Gradients, lr: f32) {
        assert!(lr.is_finite() && lr > 0.0, "lr must be finite and > 0");

        match self {
            OptimizerState::Sgd => {
                model.visit_params_mut(grads, |_, p, g| sgd_update(p, g, lr));
            }
            OptimizerState::SgdMomentum { momentum, velocity } => {
                let momentum = *momentum;
                model.visit_params_mut(grads, |slot, p, g| {
                    let vel = &mut velocity[slot];
                    debug_assert_eq!(vel.len(), g.len());
                    for (v, &gi) in vel.iter_mut().zip(g) {
                        *v = momentum * *v + gi;
                    }
                    sgd_update(p, vel, lr);
                });
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                *t += 1;
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;

                let (beta1, beta2, eps) = (*beta1, *beta2, *eps);
                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;

                model.visit_params_mut(grads, |slot, p, g| {
                    let ms = &mut m[slot];
                    let vs = &mut v[slot];
                    debug_assert_eq!(ms.len(), g.len());
                    for i in 0..p.len() {
                        let gi = g[i];
                        ms[i] = beta1 * ms[i] + (1.0 - beta1) * gi;
                        vs[i] = beta2 * vs[i] + (1.0 - beta2) * (gi * gi);

                        let m_hat = ms[i] / corr1;
                        let v_hat = vs[i] / corr2;
                        p[i] -= lr * m_hat / (v_hat.sqrt() + eps);
                    }
                });
            }
        }
    }
}

#[inline]
fn sgd_update(params: &mut [f32], update: &[f32], lr: f32) {
    debug_assert_eq!(params.len(), update.len());
    for (p, &u) in params.iter_mut().zip(update) {
        *p -= lr * u;
    }
}

fn zeros_like_params(model: &Regressor) -> Vec<Vec<f32>> {
    model
        .param_sizes()
        .into_iter()
        .map(|len| vec![0.0; len])
        .collect()
}
