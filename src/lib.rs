//! pinetrader translates Pine-style strategy scripts into a small procedure
//! language and runs them against OHLCV data.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].
//!
//! ```no_run
//! use pinetrader::domain::ohlcv::Dataset;
//!
//! let procedure = pinetrader::translate("//@version=5\nstrategy(\"x\")\nplot(close)\n");
//! let result = pinetrader::execute(&procedure, &Dataset::default()).unwrap();
//! assert!(result.orders.is_empty());
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;

use adapters::line_front_end::LineFrontEnd;
use domain::codegen::{self, GeneratedProcedure};
use domain::error::PineError;
use domain::harness::Harness;
use domain::ohlcv::Dataset;
use domain::runtime::ExecutionResult;
use ports::front_end_port::FrontEnd;
use ports::plot_port::NullPlot;

/// Translate script text into procedure text. Deterministic and infallible.
pub fn translate(source: &str) -> String {
    generate(&LineFrontEnd, source).render()
}

/// Translate through a caller-chosen front end, keeping the handle.
pub fn generate(front_end: &dyn FrontEnd, source: &str) -> GeneratedProcedure {
    codegen::generate(&front_end.parse(source))
}

/// Load procedure text and run it over `dataset`, discarding plots.
pub fn execute(procedure: &str, dataset: &Dataset) -> Result<ExecutionResult, PineError> {
    Harness::default().load(procedure)?.run(dataset, &mut NullPlot)
}
