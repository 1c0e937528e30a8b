//! # 数值工具
//!
//! 阶跃函数、等间距网格以及 Brent 一维求根。
//!
//! ## 依赖关系
//! - 被 `corrections/band_filling.rs`, `study/`, `concentrations/` 使用

use std::time::Instant;
use thiserror::Error;

/// Heaviside 阶跃函数，H(0) = 0.5
pub fn heaviside(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        0.0
    } else {
        0.5
    }
}

/// `[start, end]` 上的 `n` 个等间距点（包含两端）
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// 梯形积分（等间距或非等间距网格）
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

/// 求根失败原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RootError {
    #[error("residual does not change sign on [{low}, {high}] (f = {f_low:.3e}, {f_high:.3e})")]
    NoSignChange {
        low: f64,
        high: f64,
        f_low: f64,
        f_high: f64,
    },

    #[error("no convergence after {0} iterations")]
    NotConverged(usize),

    #[error("non-finite residual at x = {0}")]
    NonFinite(f64),

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Brent 求根参数
#[derive(Debug, Clone, Copy)]
pub struct BrentOptions {
    /// x 方向的绝对容差
    pub tolerance: f64,
    pub max_iterations: usize,
    pub deadline: Option<Instant>,
}

impl Default for BrentOptions {
    fn default() -> Self {
        BrentOptions {
            tolerance: 1e-10,
            max_iterations: 200,
            deadline: None,
        }
    }
}

/// Brent 方法在区间 `[low, high]` 上求 `f` 的根
///
/// 要求 f(low) 与 f(high) 异号（或其中之一为零）。
pub fn brent<F>(mut f: F, low: f64, high: f64, options: &BrentOptions) -> Result<f64, RootError>
where
    F: FnMut(f64) -> f64,
{
    let (mut a, mut b) = (low, high);
    let mut fa = f(a);
    let mut fb = f(b);
    if !fa.is_finite() {
        return Err(RootError::NonFinite(a));
    }
    if !fb.is_finite() {
        return Err(RootError::NonFinite(b));
    }
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if fa.signum() == fb.signum() {
        return Err(RootError::NoSignChange {
            low,
            high,
            f_low: fa,
            f_high: fb,
        });
    }

    let (mut c, mut fc) = (a, fa);
    let mut d = b - a;
    let mut e = d;

    for _ in 0..options.max_iterations {
        if let Some(deadline) = options.deadline {
            if Instant::now() > deadline {
                return Err(RootError::DeadlineExceeded);
            }
        }

        if fb.signum() == fc.signum() {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol = 2.0 * f64::EPSILON * b.abs() + 0.5 * options.tolerance;
        let m = 0.5 * (c - b);
        if m.abs() <= tol || fb == 0.0 {
            return Ok(b);
        }

        if e.abs() >= tol && fa.abs() > fb.abs() {
            // 插值步（割线或逆二次插值）
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                (2.0 * m * s, 1.0 - s)
            } else {
                let q = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * m * q * (q - r) - (b - a) * (r - 1.0)),
                    (q - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            } else {
                p = -p;
            }
            if 2.0 * p < (3.0 * m * q - (tol * q).abs()).min((e * q).abs()) {
                e = d;
                d = p / q;
            } else {
                d = m;
                e = m;
            }
        } else {
            d = m;
            e = m;
        }

        a = b;
        fa = fb;
        b += if d.abs() > tol { d } else { tol.copysign(m) };
        fb = f(b);
        if !fb.is_finite() {
            return Err(RootError::NonFinite(b));
        }
    }

    Err(RootError::NotConverged(options.max_iterations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heaviside() {
        assert_eq!(heaviside(1e-9), 1.0);
        assert_eq!(heaviside(-3.0), 0.0);
        assert_eq!(heaviside(0.0), 0.5);
    }

    #[test]
    fn test_linspace() {
        let x = linspace(0.0, 1.0, 5);
        assert_eq!(x.len(), 5);
        assert!((x[1] - 0.25).abs() < 1e-12);
        assert!((x[4] - 1.0).abs() < 1e-12);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_trapezoid() {
        let x = linspace(0.0, 1.0, 101);
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        assert!((trapezoid(&x, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_brent_finds_cubic_root() {
        let root = brent(|x| x * x * x - 2.0, 0.0, 2.0, &BrentOptions::default()).unwrap();
        assert!((root - 2f64.cbrt()).abs() < 1e-9);
    }

    #[test]
    fn test_brent_steep_exponential() {
        // 类似电中性方程的陡峭残差
        let f = |x: f64| (-(x - 0.7) / 0.025).exp() - 1.0;
        let root = brent(f, 0.0, 1.5, &BrentOptions::default()).unwrap();
        assert!((root - 0.7).abs() < 1e-8);
    }

    #[test]
    fn test_brent_no_sign_change() {
        let err = brent(|x| x * x + 1.0, -1.0, 1.0, &BrentOptions::default()).unwrap_err();
        assert!(matches!(err, RootError::NoSignChange { .. }));
    }

    #[test]
    fn test_brent_expired_deadline() {
        let options = BrentOptions {
            deadline: Some(Instant::now()),
            ..BrentOptions::default()
        };
        std::thread::sleep(std::time::Duration::from_millis(2));
        let err = brent(|x| x - 0.3, 0.0, 1.0, &options).unwrap_err();
        assert_eq!(err, RootError::DeadlineExceeded);
    }
}
