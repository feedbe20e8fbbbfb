//! # sc-data
//!
//! CSV input and output for SimCal: numeric tables (ground truth and
//! simulator time-step output) and the editable parameter table handed to the
//! simulator.

pub mod loaders;
pub mod parameters;

pub use loaders::*;
pub use parameters::*;
