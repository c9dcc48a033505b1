//! Price oracle update bot
//!
//! Wires the price feed to the update coordinator and owns process
//! lifecycle: settings, startup preflight, event loop, status output.

pub mod settings;
pub mod startup;
pub mod runner;
pub mod status;

#[cfg(test)]
mod testing;

pub use runner::{Runner, RunnerConfig};
pub use startup::{preflight, PreflightReport};
