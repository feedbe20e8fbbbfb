//! # sc-engine
//!
//! Runs the external plant-physiology simulator as a calibration [`Model`]
//! and hosts the `simcal` command line.
//!
//! [`Model`]: sc_optimizer::Model

pub mod simulator;

pub use simulator::ProcessSimulator;
