//! Concurrency substrates: where the background render loop runs.
//!
//! A substrate pairs a unit launcher with the stop-flag type that unit can
//! observe. [`substrate_for`] is the only place a [`SubstrateKind`] turns
//! into behaviour.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::ThreadId;

use inline_timer_types::SubstrateKind;

use crate::flag::StopFlag;
use crate::frame::FrameError;

mod process;
mod thread;

pub use process::ProcessSubstrate;
pub use thread::ThreadSubstrate;

/// The body a background unit executes. Returns when the stop flag is seen
/// or the sink fails.
pub type Job = Box<dyn FnOnce() -> Result<(), FrameError> + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitId {
    Thread(ThreadId),
    Process(u32),
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Thread(id) => write!(f, "thread {id:?}"),
            UnitId::Process(pid) => write!(f, "pid {pid}"),
        }
    }
}

/// Handle to a launched unit. Dropping it without joining detaches the unit.
pub trait BackgroundUnit: Send + fmt::Debug {
    fn id(&self) -> UnitId;

    /// Non-blocking liveness check.
    fn is_finished(&mut self) -> bool;

    /// Blocks until the unit exits and returns how its loop ended.
    ///
    /// Must not hang or fail when the unit has already exited.
    fn join(self: Box<Self>) -> Result<(), FrameError>;
}

pub trait Substrate: Send + Sync + fmt::Debug {
    fn kind(&self) -> SubstrateKind;

    /// A fresh, cleared flag the units of this substrate can observe.
    fn new_flag(&self) -> io::Result<Arc<dyn StopFlag>>;

    /// Starts `job` on a new unit named `name`.
    ///
    /// Units never keep the host process alive: a leaked thread is detached
    /// and a leaked child process is tied to its parent's lifetime.
    fn launch(&self, name: &str, job: Job) -> io::Result<Box<dyn BackgroundUnit>>;
}

#[must_use]
pub fn substrate_for(kind: SubstrateKind) -> Box<dyn Substrate> {
    match kind {
        SubstrateKind::Thread => Box::new(ThreadSubstrate),
        SubstrateKind::Process => Box::new(ProcessSubstrate),
    }
}

/// Unit names end up in OS APIs that reject interior NULs.
fn sanitize_unit_name(name: &str) -> String {
    name.replace('\0', "")
}
