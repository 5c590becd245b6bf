//! Technical indicator library.
//!
//! Every function takes a raw numeric array and returns arrays of the same
//! length. Leading `NaN` inputs are skipped before computing, and the warm-up
//! region of each output is `NaN`; callers never backfill it.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use ema::calculate_ema;
pub use macd::{calculate_macd, MacdOutput};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;

use crate::domain::error::IndicatorError;
use std::fmt;

/// Period used by single-output indicators when the call omits one.
pub const DEFAULT_PERIOD: i64 = 14;

/// Single-output indicators reachable from a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Sma,
    Ema,
    Rsi,
}

impl Indicator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sma" => Some(Indicator::Sma),
            "ema" => Some(Indicator::Ema),
            "rsi" => Some(Indicator::Rsi),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Indicator::Sma => "sma",
            Indicator::Ema => "ema",
            Indicator::Rsi => "rsi",
        }
    }

    pub fn compute(self, values: &[f64], period: i64) -> Result<Vec<f64>, IndicatorError> {
        match self {
            Indicator::Sma => calculate_sma(values, period),
            Indicator::Ema => calculate_ema(values, period),
            Indicator::Rsi => calculate_rsi(values, period),
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Sma => write!(f, "SMA"),
            Indicator::Ema => write!(f, "EMA"),
            Indicator::Rsi => write!(f, "RSI"),
        }
    }
}

pub(crate) fn check_period(
    indicator: &'static str,
    param: &'static str,
    value: i64,
) -> Result<usize, IndicatorError> {
    if value < 1 {
        return Err(IndicatorError::InvalidPeriod {
            indicator,
            param,
            value,
        });
    }
    Ok(value as usize)
}

/// Index of the first non-NaN input, or `values.len()` when there is none.
pub(crate) fn first_valid(values: &[f64]) -> usize {
    values
        .iter()
        .position(|v| !v.is_nan())
        .unwrap_or(values.len())
}
