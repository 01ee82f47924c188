//! Pairwise Pearson correlation over a trailing window.
//!
//! Observations where either series is `NaN` are dropped pairwise, so two
//! assets with different trading calendars still correlate on their common
//! sessions.

/// Pearson correlation of `a` and `b` over the `window` entries ending at `end`
/// (inclusive). Returns `None` with fewer than `min_obs` paired observations or
/// when either side has zero variance.
pub fn pearson_pairwise(
    a: &[f64],
    b: &[f64],
    end: usize,
    window: usize,
    min_obs: usize,
) -> Option<f64> {
    let len = a.len().min(b.len());
    if len == 0 || window == 0 || end >= len {
        return None;
    }
    let start = (end + 1).saturating_sub(window);

    let mut n = 0usize;
    let (mut sum_a, mut sum_b) = (0.0, 0.0);
    for i in start..=end {
        let (x, y) = (a[i], b[i]);
        if x.is_nan() || y.is_nan() {
            continue;
        }
        n += 1;
        sum_a += x;
        sum_b += y;
    }
    if n < min_obs.max(2) {
        return None;
    }

    let mean_a = sum_a / n as f64;
    let mean_b = sum_b / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for i in start..=end {
        let (x, y) = (a[i], b[i]);
        if x.is_nan() || y.is_nan() {
            continue;
        }
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a < 1e-18 || var_b < 1e-18 {
        return None;
    }
    Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}
