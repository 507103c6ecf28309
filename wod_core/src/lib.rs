#![forbid(unsafe_code)]

//! Core domain model and simulation engine for wodsim.
//!
//! This crate provides:
//! - Domain types (movements, capabilities, workouts, fatigue, timelines)
//! - Default movement catalog
//! - Calibration tables and configuration
//! - The engine: environment modifiers, rep timing, fatigue tracking,
//!   pacing strategy and the discrete-event simulation loop
//! - Scenario loading, timeline export and parallel parameter sweeps

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod calibration;
pub mod environment;
pub mod timing;
pub mod fatigue;
pub mod strategy;
pub mod engine;
pub mod scenario;
pub mod export;
pub mod sweep;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog};
pub use config::Config;
pub use calibration::{Calibration, SimulationSettings};
pub use environment::{environment_multipliers, EnvironmentMultipliers};
pub use strategy::{RpeConstraints, StrategyState};
pub use engine::{simulate, SimulationInputs};
pub use scenario::{load_scenario, Scenario};
pub use export::write_timeline_csv;
pub use sweep::{run_sweep, SweepPlan, SweepSummary};
