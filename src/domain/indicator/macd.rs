//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9. A fast period longer than
//! the slow one is swapped. Warmup: slow - 1 + signal - 1 values are NaN.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::check_period;
use crate::domain::indicator::ema::ema_from;

pub const DEFAULT_FAST: i64 = 12;
pub const DEFAULT_SLOW: i64 = 26;
pub const DEFAULT_SIGNAL: i64 = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdOutput {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn calculate_macd(
    values: &[f64],
    fast: i64,
    slow: i64,
    signal_period: i64,
) -> Result<MacdOutput, IndicatorError> {
    let mut fast = check_period("MACD", "fast period", fast)?;
    let mut slow = check_period("MACD", "slow period", slow)?;
    let signal_period = check_period("MACD", "signal period", signal_period)?;
    if slow < fast {
        std::mem::swap(&mut fast, &mut slow);
    }

    let ema_fast = ema_from(values, fast);
    let ema_slow = ema_from(values, slow);
    let line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();

    // ema_from skips the leading NaN of the line, so the signal seeds on the
    // first `signal_period` valid MACD values.
    let signal = ema_from(&line, signal_period);

    let mut macd = vec![f64::NAN; values.len()];
    let mut histogram = vec![f64::NAN; values.len()];
    for i in 0..values.len() {
        if !signal[i].is_nan() {
            macd[i] = line[i];
            histogram[i] = line[i] - signal[i];
        }
    }

    Ok(MacdOutput {
        macd,
        signal,
        histogram,
    })
}
