//! Run settings read from an INI configuration.
//!
//! ```ini
//! [translate]
//! unit_name = TranslatedStrategy
//!
//! [execution]
//! pyramiding = 0
//! default_qty = 1.0
//!
//! [plot]
//! enabled = true
//! output = chart.svg
//! ```
//!
//! Every key is optional. A procedure's own `self.configure(...)` call
//! overrides the `[execution]` values at run time.

use std::path::PathBuf;

use crate::domain::codegen::DEFAULT_UNIT_NAME;
use crate::domain::error::PineError;
use crate::domain::interpreter::ExecutionOptions;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub unit_name: String,
    pub execution: ExecutionOptions,
    pub plot_enabled: bool,
    pub plot_output: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            unit_name: DEFAULT_UNIT_NAME.to_string(),
            execution: ExecutionOptions::default(),
            plot_enabled: true,
            plot_output: None,
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PineError> {
        Ok(Self {
            unit_name: load_unit_name(config)?,
            execution: ExecutionOptions {
                pyramiding: load_pyramiding(config)?,
                default_qty: load_default_qty(config)?,
            },
            plot_enabled: config.get_bool("plot", "enabled", true),
            plot_output: config
                .get_string("plot", "output")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PineError {
    PineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn load_unit_name(config: &dyn ConfigPort) -> Result<String, PineError> {
    let Some(name) = config.get_string("translate", "unit_name") else {
        return Ok(DEFAULT_UNIT_NAME.to_string());
    };
    let name = name.trim();
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(invalid(
            "translate",
            "unit_name",
            format!("'{}' is not a valid unit name", name),
        ));
    }
    Ok(name.to_string())
}

fn load_pyramiding(config: &dyn ConfigPort) -> Result<u32, PineError> {
    let value = config.get_int("execution", "pyramiding", 0);
    u32::try_from(value)
        .map_err(|_| invalid("execution", "pyramiding", "pyramiding must be non-negative"))
}

fn load_default_qty(config: &dyn ConfigPort) -> Result<f64, PineError> {
    let value = config.get_double("execution", "default_qty", 1.0);
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(
            "execution",
            "default_qty",
            "default_qty must be positive",
        ));
    }
    Ok(value)
}
