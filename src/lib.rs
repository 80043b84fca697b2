//! Predictive maintenance for vehicle fleets.
//!
//! Builds fixed-order feature vectors from sensor snapshots, scores them with
//! a class-balanced random forest and turns the probability into an urgency
//! level, a days-until-service estimate and a list of recommended checks.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;

pub use error::{AppError, Result};
