use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::OptionsError;

/// Which concurrency primitive runs the background render loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstrateKind {
    /// A thread sharing the caller's memory.
    #[default]
    Thread,
    /// A forked OS process. Writes to the sink from its own copy of memory.
    Process,
}

impl SubstrateKind {
    /// Label used for the background unit when the caller supplies no name.
    #[must_use]
    pub const fn default_name(self) -> &'static str {
        match self {
            SubstrateKind::Thread => "ThreadTimer",
            SubstrateKind::Process => "ProcessTimer",
        }
    }

    #[must_use]
    pub const fn from_use_process(use_process: bool) -> Self {
        if use_process {
            SubstrateKind::Process
        } else {
            SubstrateKind::Thread
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SubstrateKind::Thread => "thread",
            SubstrateKind::Process => "process",
        }
    }
}

impl fmt::Display for SubstrateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubstrateKind {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" | "threads" => Ok(SubstrateKind::Thread),
            "process" | "proc" | "mp" => Ok(SubstrateKind::Process),
            _ => Err(OptionsError::UnknownSubstrate(s.to_string())),
        }
    }
}
