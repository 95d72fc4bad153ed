//! Strided GEMM used by the affine layers.
//!
//! Everything funnels through [`gemm_f32`]:
//! - default: a simple, safe triple-loop implementation
//! - optional: a faster backend via the `matrixmultiply` feature
//!
//! The three helpers below name the products a batched affine layer needs, with all
//! matrices stored row-major.

/// `C = alpha * A * B + beta * C` over arbitrary strides.
///
/// `A` is `(m, k)`, `B` is `(k, n)`, `C` is `(m, n)`. With `beta == 0` the previous
/// contents of `C` are ignored (never multiplied), so stale NaNs cannot leak in.
#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_f32(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    rsa: usize,
    csa: usize,
    b: &[f32],
    rsb: usize,
    csb: usize,
    beta: f32,
    c: &mut [f32],
    rsc: usize,
    csc: usize,
) {
    debug_assert!(m > 0 && n > 0 && k > 0);
    debug_assert!(a.len() > (m - 1) * rsa + (k - 1) * csa);
    debug_assert!(b.len() > (k - 1) * rsb + (n - 1) * csb);
    debug_assert!(c.len() > (m - 1) * rsc + (n - 1) * csc);

    #[cfg(feature = "matrixmultiply")]
    {
        // SAFETY: the debug assertions above describe the bounds every caller in this
        // module upholds; matrixmultiply reads/writes only inside those strides.
        unsafe {
            matrixmultiply::sgemm(
                m,
                k,
                n,
                alpha,
                a.as_ptr(),
                rsa as isize,
                csa as isize,
                b.as_ptr(),
                rsb as isize,
                csb as isize,
                beta,
                c.as_mut_ptr(),
                rsc as isize,
                csc as isize,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0_f32;
            let a0 = i * rsa;
            let b0 = j * csb;
            for p in 0..k {
                acc = a[a0 + p * csa].mul_add(b[p * rsb + b0], acc);
            }

            let idx = i * rsc + j * csc;
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}

/// `out (rows, out_dim) = x (rows, in_dim) * w^T`, with `w` stored `(out_dim, in_dim)`.
#[inline]
pub(crate) fn x_wt(
    x: &[f32],
    w: &[f32],
    rows: usize,
    in_dim: usize,
    out_dim: usize,
    out: &mut [f32],
) {
    gemm_f32(
        rows, out_dim, in_dim, 1.0, x, in_dim, 1, w, 1, in_dim, 0.0, out, out_dim, 1,
    );
}

/// `dw (out_dim, in_dim) += dy^T (out_dim, rows) * x (rows, in_dim)`.
#[inline]
pub(crate) fn acc_dyt_x(
    dy: &[f32],
    x: &[f32],
    rows: usize,
    in_dim: usize,
    out_dim: usize,
    dw: &mut [f32],
) {
    gemm_f32(
        out_dim, in_dim, rows, 1.0, dy, 1, out_dim, x, in_dim, 1, 1.0, dw, in_dim, 1,
    );
}

/// `dx (rows, in_dim) = dy (rows, out_dim) * w (out_dim, in_dim)`.
#[inline]
pub(crate) fn dy_w(
    dy: &[f32],
    w: &[f32],
    rows: usize,
    in_dim: usize,
    out_dim: usize,
    dx: &mut [f32],
) {
    gemm_f32(
        rows, in_dim, out_dim, 1.0, dy, out_dim, 1, w, in_dim, 1, 0.0, dx, in_dim, 1,
    );
}
