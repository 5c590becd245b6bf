//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n values are NaN (n price changes are needed for the first average).

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{check_period, first_valid};

pub fn calculate_rsi(values: &[f64], period: i64) -> Result<Vec<f64>, IndicatorError> {
    let period = check_period("RSI", "period", period)?;
    let mut out = vec![f64::NAN; values.len()];
    let start = first_valid(values);
    if values.len().saturating_sub(start) <= period {
        return Ok(out);
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in (start + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        let n_changes = i - start;

        if n_changes < period {
            avg_gain += gain;
            avg_loss += loss;
            continue;
        }
        if n_changes == period {
            avg_gain = (avg_gain + gain) / period as f64;
            avg_loss = (avg_loss + loss) / period as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }
        out[i] = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
    }

    Ok(out)
}
