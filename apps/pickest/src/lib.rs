//! # pickest
//!
//! Command-line front end of the Pickest export engine.
//!
//! - `cli`: argument parsing and command implementations
//! - `config`: the optional `pickest.toml` layer between defaults and flags

pub mod cli;
pub mod config;
