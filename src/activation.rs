//! Activation functions.
//!
//! A hidden block computes a normalized pre-activation value and then applies an
//! activation function element-wise: `y = activation(z)`.
//!
//! The post-activation outputs `y` are cached in [`crate::Scratch`]. During backprop
//! `dL/dz` is recovered from `dL/dy` using `y` alone, so no separate `z` buffer is kept.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// Element-wise activation function.
pub enum Activation {
    #[default]
    ReLU,
    LeakyReLU {
        alpha: f32,
    },
    Tanh,
    Identity,
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyReLU { alpha } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                    )));
                }
            }
            Activation::ReLU | Activation::Tanh | Activation::Identity => {}
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            // `f32::max` would map NaN to 0.0; non-finite values must reach the output.
            Activation::ReLU => {
                if x < 0.0 {
                    0.0
                } else {
                    x
                }
            }
            Activation::LeakyReLU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Tanh => x.tanh(),
            Activation::Identity => x,
        }
    }

    /// Applies the activation to every element of `xs`.
    #[inline]
    pub(crate) fn forward_in_place(self, xs: &mut [f32]) {
        if self == Activation::Identity {
            return;
        }
        for x in xs {
            *x = self.forward(*x);
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else if y.is_nan() {
                    y
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if y > 0.0 {
                    1.0
                } else if y.is_nan() {
                    y
                } else {
                    alpha
                }
            }
            Activation::Tanh => 1.0 - y * y,
            Activation::Identity => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaky_relu_alpha_must_be_finite_and_non_negative() {
        assert!(
            Activation::LeakyReLU { alpha: f32::NAN }
                .validate()
                .is_err()
        );
        assert!(Activation::LeakyReLU { alpha: -0.1 }.validate().is_err());
        assert!(Activation::LeakyReLU { alpha: 0.1 }.validate().is_ok());
    }

    #[test]
    fn relu_and_leaky_relu_shapes() {
        assert_eq!(Activation::ReLU.forward(-2.0), 0.0);
        assert_eq!(Activation::ReLU.forward(3.0), 3.0);

        let act = Activation::LeakyReLU { alpha: 0.1 };
        assert_eq!(act.forward(-2.0), -0.2);
        assert_eq!(act.forward(3.0), 3.0);

        // Gradients expressed via cached outputs.
        assert_eq!(Activation::ReLU.grad_from_output(0.0), 0.0);
        assert_eq!(Activation::ReLU.grad_from_output(1.0), 1.0);
        assert_eq!(act.grad_from_output(-0.2), 0.1);
        assert_eq!(act.grad_from_output(3.0), 1.0);
    }

    #[test]
    fn forward_in_place_applies_elementwise() {
        let mut xs = [-1.0_f32, 0.0, 2.5];
        Activation::ReLU.forward_in_place(&mut xs);
        assert_eq!(xs, [0.0, 0.0, 2.5]);
    }

    #[test]
    fn relu_family_propagates_nan() {
        assert!(Activation::ReLU.forward(f32::NAN).is_nan());
        assert_eq!(Activation::ReLU.forward(f32::INFINITY), f32::INFINITY);
        assert!(Activation::LeakyReLU { alpha: 0.1 }.forward(f32::NAN).is_nan());

        let mut xs = [-1.0_f32, f32::NAN, 2.0];
        Activation::ReLU.forward_in_place(&mut xs);
        assert_eq!(xs[0], 0.0);
        assert!(xs[1].is_nan());

        assert!(Activation::ReLU.grad_from_output(f32::NAN).is_nan());
        assert!(Activation::LeakyReLU { alpha: 0.1 }.grad_from_output(f32::NAN).is_nan());
    }

    #[test]
    fn tanh_gradient_from_output() {
        let y = Activation::Tanh.forward(0.3);
        let g = Activation::Tanh.grad_from_output(y);
        assert!((g - (1.0 - y * y)).abs() < 1e-6);
    }
}
