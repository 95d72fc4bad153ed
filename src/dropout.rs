//! Inverted dropout.

use rand::Rng;

use crate::{Error, Mode, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    rate: f32,
}

impl Dropout {
    /// `rate` is the probability of zeroing each unit, in `[0, 1)`.
    pub fn new(rate: f32) -> Result<Self> {
        if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
            return Err(Error::InvalidConfig(format!(
                "dropout rate must be finite and in [0,1), got {rate}"
            )));
        }
        Ok(Self { rate })
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Writes `outputs = inputs * mask`.
    ///
    /// In [`Mode::Train`] each mask entry is `0` with probability `rate` and
    /// `1 / (1 - rate)` otherwise, so the expected activation is unchanged.
    /// In [`Mode::Eval`] the mask is all ones (identity).
    pub fn forward<R: Rng + ?Sized>(
        &self,
        inputs: &[f32],
        mode: Mode,
        rng: &mut R,
        mask: &mut [f32],
        outputs: &mut [f32],
    ) {
        assert_eq!(inputs.len(), outputs.len(), "dropout shape");
        assert_eq!(inputs.len(), mask.len(), "dropout mask shape");

        if mode == Mode::Eval || self.rate == 0.0 {
            mask.fill(1.0);
            outputs.copy_from_slice(inputs);
            return;
        }

        let keep_scale = 1.0 / (1.0 - self.rate);
        for ((m, y), &x) in mask.iter_mut().zip(outputs.iter_mut()).zip(inputs) {
            *m = if rng.gen_range(0.0_f32..1.0) < self.rate {
                0.0
            } else {
                keep_scale
            };
            *y = x * *m;
        }
    }

    /// `d_values *= mask` in place.
    #[inline]
    pub fn backward(mask: &[f32], d_values: &mut [f32]) {
        debug_assert_eq!(mask.len(), d_values.len());
        for (d, m) in d_values.iter_mut().zip(mask) {
            *d *= m;
        }
    }
}
