//! Configure, run and repackage external photon-science simulation codes.
//!
//! Each calculator validates its parameters, writes the input deck of its
//! backengine, runs the backengine through a [`process::ProcessRunner`] and
//! stores the results in an HDF5 layout.

pub mod calculators;
pub mod common;
pub mod config;
pub mod domain;
pub mod h5;
pub mod logparse;
pub mod parameters;
pub mod process;
pub mod serialization;
pub mod table;

pub use calculators::Calculator;
pub use config::RunConfig;
pub use domain::{CalculatorKind, SimexError, SimexErrorCategory, SimexResult};
