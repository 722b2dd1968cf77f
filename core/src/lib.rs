//! Core logic for the inline timer.
//!
//! # Architecture
//!
//! ```text
//! ScopedUpdater::start() -> Substrate::launch(name, job)
//!                                 |
//!                                 v
//!            job: while !stop_flag.is_set() { FrameRenderer::render(sink) }
//!                                 |
//! ScopedUpdater::stop()  -> stop_flag.set(); BackgroundUnit::join()
//! ```
//!
//! Each frame writes the elapsed time, waits one step, then backspaces over
//! exactly what it printed. Cancellation is cooperative: the loop checks the
//! stop flag once per frame, so `stop()` returns within about one step.
//!
//! Two substrates run the loop: an in-process thread ([`ThreadSubstrate`])
//! and, on unix, a forked child process ([`ProcessSubstrate`]). Both are
//! chosen through [`SubstrateKind`] and injected into [`ScopedUpdater`].

pub mod clock;
mod flag;
pub mod frame;
mod sink;
pub mod substrate;
mod updater;

pub use clock::{Clock, ManualClock, MonotonicClock, elapsed_between};
pub use flag::{LocalFlag, StopFlag};
pub use frame::{Frame, FrameError, FrameRenderer, erase_sequence, format_elapsed};
pub use sink::Sink;
pub use substrate::{
    BackgroundUnit, Job, ProcessSubstrate, Substrate, ThreadSubstrate, UnitId, substrate_for,
};
pub use updater::{ScopeGuard, ScopedUpdater, UpdaterError};

#[cfg(unix)]
pub use flag::SharedFlag;

pub use inline_timer_types::{OptionsError, Precision, Step, SubstrateKind, TimerOptions};

/// Build an updater on the substrate picked by a single switch.
///
/// `use_process = false` (the usual choice) runs the loop on a thread.
pub fn make_updater(
    use_process: bool,
    options: TimerOptions,
) -> Result<ScopedUpdater, UpdaterError> {
    ScopedUpdater::new(options, SubstrateKind::from_use_process(use_process))
}

/// Build an updater whose loop runs on a thread in this process.
pub fn make_thread_updater(options: TimerOptions) -> Result<ScopedUpdater, UpdaterError> {
    ScopedUpdater::new(options, SubstrateKind::Thread)
}

/// Build an updater whose loop runs in a forked child process.
pub fn make_process_updater(options: TimerOptions) -> Result<ScopedUpdater, UpdaterError> {
    ScopedUpdater::new(options, SubstrateKind::Process)
}
