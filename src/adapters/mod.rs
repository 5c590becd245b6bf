//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod line_front_end;
pub mod svg_plot_adapter;
