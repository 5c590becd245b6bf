//! Port traits at the boundary between the domain and its collaborators.

pub mod config_port;
pub mod data_port;
pub mod front_end_port;
pub mod plot_port;
