//! Core option types for the inline timer.
//!
//! This crate contains pure domain types with no IO, no threads and minimal
//! dependencies. Everything here is validated at construction: holding a
//! [`Precision`] or a [`Step`] is the proof that the value is usable by the
//! renderer.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod options;
mod substrate;

pub use options::{
    DEFAULT_PRECISION, DEFAULT_STEP_SECS, MAX_PRECISION, OptionsError, Precision, Step,
    TimerOptions,
};
pub use substrate::SubstrateKind;
