//! Plot rendering port trait.

use crate::domain::error::PineError;

/// Receives series a procedure asks to plot. Failures are reported to the
/// caller but never abort a run.
pub trait PlotPort {
    fn plot(&mut self, series: &[f64], label: Option<&str>) -> Result<(), PineError>;
}

/// Discards every plot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlot;

impl PlotPort for NullPlot {
    fn plot(&mut self, _series: &[f64], _label: Option<&str>) -> Result<(), PineError> {
        Ok(())
    }
}
