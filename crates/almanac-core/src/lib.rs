//! Shared foundation for the almanac workspace: error taxonomy, engine
//! constants, and the environment-driven configuration layer.

pub mod config;
pub mod constants;
pub mod error;
