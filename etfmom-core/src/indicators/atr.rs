//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|), or the
//! close-to-close move when the session has no high/low.
//! ATR uses Wilder smoothing (EMA with alpha = 1/period).
//! Lookback: period (needs period+1 closes, then average).

/// True range series. `TR[0]` is `NaN` (no previous close).
pub fn true_range(close: &[f64], high: &[f64], low: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut tr = vec![f64::NAN; n];

    for i in 1..n {
        let pc = close[i - 1];
        let c = close[i];
        if pc.is_nan() || c.is_nan() {
            continue;
        }
        let h = high.get(i).copied().unwrap_or(f64::NAN);
        let l = low.get(i).copied().unwrap_or(f64::NAN);
        tr[i] = if h.is_nan() || l.is_nan() {
            (c - pc).abs()
        } else {
            (h - l).max((h - pc).abs()).max((l - pc).abs())
        };
    }

    tr
}

/// Apply Wilder smoothing to a series. Alpha = 1/period.
///
/// Seed: mean of the first run of `period` consecutive valid values. A `NaN`
/// after the seed invalidates the rest of the series.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    // Find the end of the first window of `period` consecutive non-NaN values.
    let mut run = 0usize;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            run = 0;
            continue;
        }
        run += 1;
        if run == period {
            seed_end = Some(i + 1);
            break;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let seed: f64 = values[seed_end - period..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        let smoothed = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = smoothed;
        prev = smoothed;
    }

    result
}

/// ATR over the given price track.
pub fn atr(close: &[f64], high: &[f64], low: &[f64], period: usize) -> Vec<f64> {
    wilder_smooth(&true_range(close, high, low), period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn true_range_basic() {
        let close = [102.0, 106.0, 99.0];
        let high = [105.0, 108.0, 107.0];
        let low = [95.0, 100.0, 98.0];
        let tr = true_range(&close, &high, &low);
        assert!(tr[0].is_nan());
        // max(8, |108-102|, |100-102|) = 8
        assert_approx(tr[1], 8.0, DEFAULT_EPSILON);
        // max(9, |107-106|, |98-106|) = 9
        assert_approx(tr[2], 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let close = [100.0, 112.0];
        let high = [102.0, 115.0];
        let low = [97.0, 108.0];
        // max(7, |115-100|, |108-100|) = 15
        assert_approx(true_range(&close, &high, &low)[1], 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn close_only_falls_back_to_close_move() {
        let close = [100.0, 103.0, 101.0];
        let nan = [f64::NAN; 3];
        let tr = true_range(&close, &nan, &nan);
        assert_approx(tr[1], 3.0, DEFAULT_EPSILON);
        assert_approx(tr[2], 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_period_3() {
        let close = [102.0, 106.0, 99.0, 104.0, 103.0];
        let high = [105.0, 108.0, 107.0, 105.0, 106.0];
        let low = [95.0, 100.0, 98.0, 97.0, 101.0];
        // TR = [NaN, 8, 9, 8, 5]
        let result = atr(&close, &high, &low, 3);
        assert!(result[2].is_nan());
        // seed = (8 + 9 + 8) / 3
        let seed = 25.0 / 3.0;
        assert_approx(result[3], seed, DEFAULT_EPSILON);
        // Wilder: (1/3)*5 + (2/3)*seed
        assert_approx(result[4], 5.0 / 3.0 + 2.0 / 3.0 * seed, DEFAULT_EPSILON);
    }

    #[test]
    fn wilder_seed_skips_leading_nan() {
        let values = [f64::NAN, f64::NAN, 2.0, 4.0, 6.0];
        let result = wilder_smooth(&values, 2);
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.0, DEFAULT_EPSILON);
        assert_approx(result[4], 0.5 * 6.0 + 0.5 * 3.0, DEFAULT_EPSILON);
    }
}
