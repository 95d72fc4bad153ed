//! Metrics.
//!
//! Metrics are evaluation helpers: they do not participate in backprop.

use log::warn;

use crate::{Error, Result};

/// Root mean squared error with a non-finite sentinel.
///
/// If any element of `pred - target` is NaN or infinite the result is
/// `f32::INFINITY`, so a single bad prediction surfaces in the reported metric
/// instead of silently corrupting a running sum. Otherwise returns
/// `sqrt(mean((pred - target)^2))`.
pub fn rmse(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );
    if pred.is_empty() {
        return 0.0;
    }

    let mut sum_sq = 0.0_f32;
    for (p, t) in pred.iter().zip(target) {
        let diff = p - t;
        if !diff.is_finite() {
            return f32::INFINITY;
        }
        sum_sq = diff.mul_add(diff, sum_sq);
    }
    (sum_sq / pred.len() as f32).sqrt()
}

/// Pearson correlation coefficient of two equal-length sequences.
///
/// Returns `NaN` when either sequence has zero variance (the coefficient is
/// undefined there).
pub fn pearson(xs: &[f64], ys: &[f64]) -> Result<f64> {
    if xs.len() != ys.len() {
        return Err(Error::InvalidShape(format!(
            "pearson inputs differ in length: {} vs {}",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() < 2 {
        return Err(Error::InvalidData(format!(
            "pearson needs at least 2 points, got {}",
            xs.len()
        )));
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0_f64;
    let mut var_x = 0.0_f64;
    let mut var_y = 0.0_f64;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        warn!("pearson correlation undefined for a constant sequence");
        return Ok(f64::NAN);
    }
    Ok(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Sample-count-weighted accumulator for one pass over a partition.
///
/// Each batch contributes `value * rows`, so the final mean is exact regardless
/// of the size of the last batch. RMSE is averaged the same way: the result is
/// a weighted mean of per-batch RMSE values, not a pooled RMSE.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassTotals {
    loss_sum: f64,
    rmse_sum: f64,
    count: usize,
}

impl PassTotals {
    #[inline]
    pub fn add(&mut self, loss: f32, rmse: f32, rows: usize) {
        self.loss_sum += f64::from(loss) * rows as f64;
        self.rmse_sum += f64::from(rmse) * rows as f64;
        self.count += rows;
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// `(mean loss, mean rmse)` over every sample added.
    ///
    /// A pass over zero samples has no mean and is reported as
    /// [`Error::EmptyPartition`].
    pub fn means(&self) -> Result<(f32, f32)> {
        if self.count == 0 {
            return Err(Error::EmptyPartition(
                "cannot average a pass over zero samples".to_owned(),
            ));
        }
        let n = self.count as f64;
        Ok(((self.loss_sum / n) as f32, (self.rmse_sum / n) as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmse_is_exact_for_finite_inputs() {
        assert_eq!(rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
        let r = rmse(&[1.0, 3.0], &[2.0, 1.0]);
        assert!((r - 2.5_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn rmse_returns_infinity_on_non_finite_inputs() {
        assert_eq!(rmse(&[1.0, f32::NAN], &[1.0, 2.0]), f32::INFINITY);
        assert_eq!(rmse(&[1.0, 2.0], &[f32::INFINITY, 2.0]), f32::INFINITY);
        assert_eq!(rmse(&[f32::NEG_INFINITY], &[0.0]), f32::INFINITY);
    }

    #[test]
    fn pearson_of_sequence_with_itself_is_one() {
        let xs = [0.5_f64, 2.0, -1.0, 7.25, 3.0];
        let r = pearson(&xs, &xs).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_detects_anticorrelation_and_bad_input() {
        let xs = [1.0_f64, 2.0, 3.0];
        let ys = [6.0_f64, 4.0, 2.0];
        assert!((pearson(&xs, &ys).unwrap() + 1.0).abs() < 1e-12);
        assert!(pearson(&xs, &ys[..2]).is_err());
        assert!(pearson(&xs[..1], &ys[..1]).is_err());
        assert!(pearson(&[1.0, 1.0], &[0.0, 2.0]).unwrap().is_nan());
    }

    #[test]
    fn pass_totals_weight_by_batch_size() {
        let mut totals = PassTotals::default();
        totals.add(1.0, 2.0, 3);
        totals.add(5.0, 4.0, 1);

        let (loss, rmse) = totals.means().unwrap();
        // Weighted: (1*3 + 5*1) / 4 = 2, unweighted would be 3.
        assert!((loss - 2.0).abs() < 1e-6);
        assert!((rmse - 2.5).abs() < 1e-6);
        assert_eq!(totals.count(), 4);
    }

    #[test]
    fn pass_totals_over_nothing_is_an_error() {
        assert!(matches!(
            PassTotals::default().means(),
            Err(Error::EmptyPartition(_))
        ));
    }

    #[test]
    fn pass_totals_propagate_sentinel() {
        let mut totals = PassTotals::default();
        totals.add(1.0, f32::INFINITY, 2);
        totals.add(1.0, 0.5, 2);
        assert_eq!(totals.means().unwrap().1, f32::INFINITY);
    }
}
