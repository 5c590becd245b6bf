//! Data access port trait.

use crate::domain::error::PineError;
use crate::domain::ohlcv::Dataset;

pub trait DataPort {
    /// Load every bar of the named source, sorted by date.
    fn load(&self, source: &str) -> Result<Dataset, PineError>;
}
