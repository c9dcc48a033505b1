//! Core types and utilities for the price oracle bot
//!
//! This crate provides shared types used across all components:
//! - Observed and published price types (fixed-point, never floats)
//! - Fee bids and submission attempts
//! - Session counters
//! - Configuration and error taxonomy

pub mod types;
pub mod units;
pub mod config;
pub mod errors;

pub use types::*;
pub use units::*;
pub use config::*;
pub use errors::*;
