//! Simple Moving Average.
//!
//! Warmup: the first (n-1) values after the first valid input are NaN.
//! A window holding a NaN yields NaN; output resumes once it drops out.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{check_period, first_valid};

pub fn calculate_sma(values: &[f64], period: i64) -> Result<Vec<f64>, IndicatorError> {
    let period = check_period("SMA", "period", period)?;
    let mut out = vec![f64::NAN; values.len()];
    let start = first_valid(values);
    let mut sum = 0.0;
    let mut missing = 0usize;

    for i in start..values.len() {
        if values[i].is_nan() {
            missing += 1;
        } else {
            sum += values[i];
        }
        let filled = i - start + 1;
        if filled > period {
            let old = values[i - period];
            if old.is_nan() {
                missing -= 1;
            } else {
                sum -= old;
            }
        }
        if filled >= period && missing == 0 {
            out[i] = sum / period as f64;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_warmup_and_values() {
        let out = calculate_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_relative_eq!(out[2], 2.0);
        assert_relative_eq!(out[3], 3.0);
        assert_relative_eq!(out[4], 4.0);
    }

    #[test]
    fn sma_period_one_is_identity() {
        let out = calculate_sma(&[3.0, 1.0, 4.0], 1).unwrap();
        assert_eq!(out, vec![3.0, 1.0, 4.0]);
    }

    #[test]
    fn sma_longer_than_input_is_all_nan() {
        let out = calculate_sma(&[1.0, 2.0], 5).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_skips_leading_nan() {
        let out = calculate_sma(&[f64::NAN, f64::NAN, 2.0, 4.0, 6.0], 2).unwrap();
        assert!(out[2].is_nan());
        assert_relative_eq!(out[3], 3.0);
        assert_relative_eq!(out[4], 5.0);
    }

    #[test]
    fn sma_recovers_after_gap() {
        let out = calculate_sma(&[1.0, 2.0, f64::NAN, 4.0, 6.0, 8.0], 2).unwrap();
        assert_relative_eq!(out[1], 1.5);
        assert!(out[2].is_nan());
        assert!(out[3].is_nan());
        assert_relative_eq!(out[4], 5.0);
        assert_relative_eq!(out[5], 7.0);
    }

    #[test]
    fn sma_zero_period_errors() {
        assert!(calculate_sma(&[1.0], 0).is_err());
    }

    #[test]
    fn sma_empty() {
        assert!(calculate_sma(&[], 3).unwrap().is_empty());
    }
}
