#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use pinetrader::domain::error::PineError;
use pinetrader::domain::harness::Harness;
pub use pinetrader::domain::ohlcv::{Dataset, OhlcvBar};
use pinetrader::domain::ohlcv::PriceField;
use pinetrader::domain::runtime::ExecutionResult;
use pinetrader::ports::data_port::DataPort;
use pinetrader::ports::plot_port::PlotPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Dataset>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_dataset(mut self, source: &str, dataset: Dataset) -> Self {
        self.data.insert(source.to_string(), dataset);
        self
    }
}

impl DataPort for MockDataPort {
    fn load(&self, source: &str) -> Result<Dataset, PineError> {
        self.data.get(source).cloned().ok_or_else(|| PineError::Data {
            reason: format!("no dataset named {}", source),
        })
    }
}

/// Keeps every plotted series with its label.
#[derive(Default)]
pub struct RecordingPlot {
    pub plots: Vec<(Vec<f64>, Option<String>)>,
}

impl RecordingPlot {
    pub fn labelled(&self, label: &str) -> Option<&[f64]> {
        self.plots
            .iter()
            .find(|(_, l)| l.as_deref() == Some(label))
            .map(|(s, _)| s.as_slice())
    }
}

impl PlotPort for RecordingPlot {
    fn plot(&mut self, series: &[f64], label: Option<&str>) -> Result<(), PineError> {
        self.plots.push((series.to_vec(), label.map(str::to_string)));
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bar per day from 2024-01-01; open/high/low straddle the close.
pub fn dataset_from_closes(closes: &[f64]) -> Dataset {
    let start = date(2024, 1, 1);
    Dataset::new(
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                date: start + Days::new(i as u64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0 + i as f64,
            })
            .collect(),
    )
}

pub fn increasing(count: usize) -> Dataset {
    let closes: Vec<f64> = (0..count).map(|i| 100.0 + i as f64).collect();
    dataset_from_closes(&closes)
}

/// `sin(linspace(0, 20, count)) * 5 + 100`.
pub fn oscillating(count: usize) -> Dataset {
    let step = 20.0 / (count - 1) as f64;
    let closes: Vec<f64> = (0..count)
        .map(|i| (i as f64 * step).sin() * 5.0 + 100.0)
        .collect();
    dataset_from_closes(&closes)
}

pub fn closes(dataset: &Dataset) -> Vec<f64> {
    dataset.column(PriceField::Close)
}

/// Translate a script and run it, recording plots.
pub fn run_script(source: &str, dataset: &Dataset) -> (ExecutionResult, RecordingPlot) {
    try_run_script(source, dataset).unwrap()
}

pub fn try_run_script(
    source: &str,
    dataset: &Dataset,
) -> Result<(ExecutionResult, RecordingPlot), PineError> {
    let procedure = pinetrader::generate(&pinetrader::adapters::line_front_end::LineFrontEnd, source);
    let program = Harness::default().load_procedure(&procedure)?;
    let mut plot = RecordingPlot::default();
    let result = program.run(dataset, &mut plot)?;
    Ok((result, plot))
}

pub fn script(body: &str) -> String {
    format!("//@version=5\nstrategy(\"Test\")\n{body}")
}
