//! OHLCV bar representation and the time-indexed dataset a procedure runs over.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Built-in price columns of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "open" => Some(PriceField::Open),
            "high" => Some(PriceField::High),
            "low" => Some(PriceField::Low),
            "close" => Some(PriceField::Close),
            "volume" => Some(PriceField::Volume),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        }
    }
}

/// An ordered, read-only table of bars. Row `i` is bar index `i`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    bars: Vec<OhlcvBar>,
}

impl Dataset {
    /// Bars are sorted by date on construction.
    pub fn new(mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn column(&self, field: PriceField) -> Vec<f64> {
        self.bars
            .iter()
            .map(|b| match field {
                PriceField::Open => b.open,
                PriceField::High => b.high,
                PriceField::Low => b.low,
                PriceField::Close => b.close,
                PriceField::Volume => b.volume,
            })
            .collect()
    }

    pub fn bar_index(&self) -> Vec<f64> {
        (0..self.bars.len()).map(|i| i as f64).collect()
    }

    /// UNIX milliseconds at midnight UTC of each bar's date.
    pub fn time(&self) -> Vec<f64> {
        self.bars
            .iter()
            .map(|b| {
                b.date
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc().timestamp_millis() as f64)
                    .unwrap_or(f64::NAN)
            })
            .collect()
    }
}
