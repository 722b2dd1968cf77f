//! The scoped updater: start/stop lifecycle and the scope guard around it.

use std::fmt;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use inline_timer_types::{Precision, SubstrateKind, TimerOptions};
use tracing::{debug, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::flag::StopFlag;
use crate::frame::{FrameError, FrameRenderer};
use crate::sink::Sink;
use crate::substrate::{BackgroundUnit, Job, Substrate, UnitId, substrate_for};

#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// `start()` without a matching `stop()`.
    #[error("timer {name:?} is already running")]
    AlreadyRunning { name: String },
    /// Another running updater is drawing on the same sink.
    #[error("output of timer {name:?} is in use by another running timer")]
    SinkBusy { name: String },
    #[error("failed to create stop flag for {kind} timer")]
    FlagUnavailable {
        kind: SubstrateKind,
        #[source]
        source: io::Error,
    },
    #[error("failed to open output sink")]
    Sink(#[source] io::Error),
    #[error("failed to launch {kind} timer {name:?}")]
    Spawn {
        kind: SubstrateKind,
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Draws an inline elapsed-time readout on a background unit while a region
/// of work runs.
///
/// Invariants:
/// - the start time is captured once, at construction
/// - at most one background unit exists at a time
/// - the stop flag is set only by [`stop`](Self::stop) and cleared only by
///   [`start`](Self::start)
///
/// The instance can be started and stopped any number of times in sequence.
pub struct ScopedUpdater {
    name: String,
    renderer: Arc<FrameRenderer>,
    substrate: Box<dyn Substrate>,
    stop_flag: Arc<dyn StopFlag>,
    sink: Sink,
    unit: Option<Box<dyn BackgroundUnit>>,
    last_error: Option<FrameError>,
}

impl ScopedUpdater {
    /// An updater on the selected substrate, drawing to standard output.
    pub fn new(options: TimerOptions, kind: SubstrateKind) -> Result<Self, UpdaterError> {
        let sink = Sink::stdout().map_err(UpdaterError::Sink)?;
        Self::with_sink(options, kind, sink)
    }

    pub fn with_sink(
        options: TimerOptions,
        kind: SubstrateKind,
        sink: Sink,
    ) -> Result<Self, UpdaterError> {
        Self::with_parts(options, substrate_for(kind), MonotonicClock::shared(), sink)
    }

    /// Fully injected construction: substrate, clock and sink are the caller's.
    pub fn with_parts(
        options: TimerOptions,
        substrate: Box<dyn Substrate>,
        clock: Arc<dyn Clock>,
        sink: Sink,
    ) -> Result<Self, UpdaterError> {
        let kind = substrate.kind();
        let stop_flag = substrate
            .new_flag()
            .map_err(|source| UpdaterError::FlagUnavailable { kind, source })?;
        let name = options
            .name()
            .unwrap_or_else(|| kind.default_name())
            .to_string();
        let renderer = FrameRenderer::new(clock, options.precision, options.step);

        Ok(Self {
            name,
            renderer: Arc::new(renderer),
            substrate,
            stop_flag,
            sink,
            unit: None,
            last_error: None,
        })
    }

    /// Launches a fresh background unit.
    ///
    /// Fails with [`UpdaterError::AlreadyRunning`] if the previous start was
    /// never stopped, even when that unit has since died on its own, and with
    /// [`UpdaterError::SinkBusy`] while another updater draws on the same sink.
    pub fn start(&mut self) -> Result<(), UpdaterError> {
        if self.unit.is_some() {
            return Err(UpdaterError::AlreadyRunning {
                name: self.name.clone(),
            });
        }

        if self.sink.is_busy() {
            return Err(UpdaterError::SinkBusy {
                name: self.name.clone(),
            });
        }

        self.stop_flag.clear();
        self.last_error = None;

        let renderer = Arc::clone(&self.renderer);
        let stop_flag = Arc::clone(&self.stop_flag);
        let sink = self.sink.clone();
        let job: Job = Box::new(move || render_until_stopped(&renderer, &*stop_flag, &sink));

        let kind = self.kind();
        let unit = match self.substrate.launch(&self.name, job) {
            Ok(unit) => unit,
            Err(source) => {
                return Err(UpdaterError::Spawn {
                    kind,
                    name: self.name.clone(),
                    source,
                });
            }
        };

        debug!(name = %self.name, %kind, unit = %unit.id(), "Timer started");
        self.unit = Some(unit);
        Ok(())
    }

    /// Signals the background unit and waits for it to finish its current frame.
    ///
    /// A no-op when nothing is running. Returns within roughly one step.
    pub fn stop(&mut self) {
        let Some(unit) = self.unit.take() else {
            return;
        };

        self.stop_flag.set();
        let id = unit.id();
        match unit.join() {
            Ok(()) => debug!(name = %self.name, unit = %id, "Timer stopped"),
            Err(err) => {
                warn!(name = %self.name, unit = %id, "Timer loop ended early: {err}");
                self.last_error = Some(err);
            }
        }
    }

    /// Starts the updater and returns a guard that stops it when dropped.
    ///
    /// The guard stops on every exit path, including `?` and panics.
    pub fn scope(&mut self) -> Result<ScopeGuard<'_>, UpdaterError> {
        self.start()?;
        Ok(ScopeGuard { updater: self })
    }

    /// Runs `work` with the readout active and returns its value untouched.
    ///
    /// An `Err` produced by `work` passes through as-is; only a failure to
    /// start the updater is reported as the outer error.
    pub fn run<T>(&mut self, work: impl FnOnce() -> T) -> Result<T, UpdaterError> {
        let _guard = self.scope()?;
        Ok(work())
    }

    /// True between a `start()` and its matching `stop()`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.unit.is_some()
    }

    /// True while a started unit is still running its loop.
    ///
    /// Turns false without a `stop()` when the loop died (e.g. on a sink error).
    pub fn is_running(&mut self) -> bool {
        self.unit.as_mut().is_some_and(|unit| !unit.is_finished())
    }

    #[must_use]
    pub fn unit_id(&self) -> Option<UnitId> {
        self.unit.as_ref().map(|unit| unit.id())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> SubstrateKind {
        self.substrate.kind()
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.renderer.precision()
    }

    #[must_use]
    pub fn step(&self) -> Duration {
        self.renderer.step()
    }

    /// Clock reading captured at construction.
    #[must_use]
    pub fn start_time(&self) -> Duration {
        self.renderer.start_time()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.renderer.sample()
    }

    /// How the most recent run's loop failed, once it has been stopped.
    #[must_use]
    pub fn last_error(&self) -> Option<&FrameError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<FrameError> {
        self.last_error.take()
    }
}

fn render_until_stopped(
    renderer: &FrameRenderer,
    stop_flag: &dyn StopFlag,
    sink: &Sink,
) -> Result<(), FrameError> {
    let mut out = sink.lock();
    while !stop_flag.is_set() {
        renderer.render(&mut **out)?;
    }
    out.flush().map_err(FrameError::Flush)
}

impl Drop for ScopedUpdater {
    fn drop(&mut self) {
        // Best-effort stop if the caller never called stop(); do not block in Drop.
        if let Some(unit) = self.unit.take() {
            warn!(
                name = %self.name,
                unit = %unit.id(),
                "Timer dropped while running; signalling stop without waiting"
            );
            self.stop_flag.set();
        }
    }
}

impl fmt::Debug for ScopedUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedUpdater")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("renderer", &self.renderer)
            .field("stop_requested", &self.stop_flag.is_set())
            .field("unit", &self.unit)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

/// RAII scope around an active updater. Dropping it stops the updater.
///
/// Derefs to the updater so calls can be chained inside the scope.
#[must_use = "dropping the guard stops the timer immediately"]
pub struct ScopeGuard<'a> {
    updater: &'a mut ScopedUpdater,
}

impl Deref for ScopeGuard<'_> {
    type Target = ScopedUpdater;

    fn deref(&self) -> &Self::Target {
        self.updater
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.updater
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.updater.stop();
    }
}

impl fmt::Debug for ScopeGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeGuard").field(&self.updater).finish()
    }
}
