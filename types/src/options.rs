//! Validated render options shared across crates.
//!
//! Raw numbers (from the command line, a TOML file or an env var) are
//! resolved into these types at the parse boundary. Existence of a value is
//! the proof of its validity.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Digits after the decimal point when no precision is given.
pub const DEFAULT_PRECISION: u8 = 4;

/// Seconds between frames when no step is given.
pub const DEFAULT_STEP_SECS: f64 = 0.01;

/// Largest supported precision. Keeps a rendered frame inside a fixed-size
/// stack buffer.
pub const MAX_PRECISION: u8 = 16;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionsError {
    #[error("precision {0} is out of range (0..=16)")]
    PrecisionOutOfRange(u32),
    #[error("step must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("step must be a finite number of seconds")]
    NonFiniteStep,
    #[error("step of {0} seconds is too large")]
    StepOutOfRange(f64),
    #[error("unknown substrate {0:?} (expected \"thread\" or \"process\")")]
    UnknownSubstrate(String),
    #[error("timer name must not be empty")]
    EmptyName,
    #[error("{0:?} is not a number")]
    NotANumber(String),
}

/// Number of decimal digits in a rendered frame.
///
/// Invariant: `0 <= value <= MAX_PRECISION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "u32")]
pub struct Precision(u8);

impl Precision {
    pub fn new(digits: u32) -> Result<Self, OptionsError> {
        if digits > u32::from(MAX_PRECISION) {
            return Err(OptionsError::PrecisionOutOfRange(digits));
        }
        Ok(Self(digits as u8))
    }

    #[must_use]
    pub const fn digits(self) -> usize {
        self.0 as usize
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self(DEFAULT_PRECISION)
    }
}

impl TryFrom<u32> for Precision {
    type Error = OptionsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pause between drawing a frame and erasing it.
///
/// Invariant: strictly positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "f64")]
pub struct Step(Duration);

impl Step {
    pub fn from_secs_f64(secs: f64) -> Result<Self, OptionsError> {
        if !secs.is_finite() {
            return Err(OptionsError::NonFiniteStep);
        }
        if secs <= 0.0 {
            return Err(OptionsError::NonPositiveStep(secs));
        }
        let Ok(duration) = Duration::try_from_secs_f64(secs) else {
            return Err(OptionsError::StepOutOfRange(secs));
        };
        // Durations below one nanosecond round to zero.
        if duration.is_zero() {
            return Err(OptionsError::NonPositiveStep(secs));
        }
        Ok(Self(duration))
    }

    pub fn from_duration(duration: Duration) -> Result<Self, OptionsError> {
        if duration.is_zero() {
            return Err(OptionsError::NonPositiveStep(0.0));
        }
        Ok(Self(duration))
    }

    #[must_use]
    pub const fn as_duration(self) -> Duration {
        self.0
    }

    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }
}

impl Default for Step {
    fn default() -> Self {
        Self(Duration::from_millis(10))
    }
}

impl TryFrom<f64> for Step {
    type Error = OptionsError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_secs_f64(value)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0.as_secs_f64())
    }
}

/// Construction options for a scoped updater.
///
/// `name: None` means "use the substrate's default label".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerOptions {
    name: Option<String>,
    pub precision: Precision,
    pub step: Step,
}

impl TimerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the background unit's name. Blank names are rejected.
    pub fn with_name(mut self, name: impl Into<String>) -> Result<Self, OptionsError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(OptionsError::EmptyName);
        }
        self.name = Some(name);
        Ok(self)
    }

    pub fn with_precision(mut self, digits: u32) -> Result<Self, OptionsError> {
        self.precision = Precision::new(digits)?;
        Ok(self)
    }

    pub fn with_step(mut self, secs: f64) -> Result<Self, OptionsError> {
        self.step = Step::from_secs_f64(secs)?;
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
