//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) values are NaN.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{check_period, first_valid};

pub fn calculate_ema(values: &[f64], period: i64) -> Result<Vec<f64>, IndicatorError> {
    let period = check_period("EMA", "period", period)?;
    Ok(ema_from(values, period))
}

/// EMA over an already validated period.
pub(crate) fn ema_from(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let start = first_valid(values);
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for i in start..values.len() {
        let offset = i - start;
        if offset < period - 1 {
            sum += values[i];
        } else if offset == period - 1 {
            sum += values[i];
            ema = sum / period as f64;
            out[i] = ema;
        } else {
            ema = values[i] * k + ema * (1.0 - k);
            out[i] = ema;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ema_warmup() {
        let out = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3).unwrap();
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!(!out[2].is_nan());
    }

    #[test]
    fn ema_seed_is_sma() {
        let out = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3).unwrap();
        assert_relative_eq!(out[2], 20.0);
    }

    #[test]
    fn ema_recursion() {
        let out = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3).unwrap();
        // k = 0.5: 40*0.5 + 20*0.5 = 30, 50*0.5 + 30*0.5 = 40
        assert_relative_eq!(out[3], 30.0);
        assert_relative_eq!(out[4], 40.0);
    }

    #[test]
    fn ema_constant_input() {
        let out = calculate_ema(&[7.0; 10], 4).unwrap();
        for v in &out[3..] {
            assert_relative_eq!(*v, 7.0);
        }
    }

    #[test]
    fn ema_zero_period_errors() {
        assert!(calculate_ema(&[1.0, 2.0], 0).is_err());
    }
}
