//! Frame rendering: print the elapsed time, hold it for one step, erase it.
//!
//! The render path never allocates. A forked child runs this code after
//! `fork()`, where the allocator may be in an inconsistent state.

use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use inline_timer_types::{Precision, Step};

use crate::clock::{Clock, elapsed_between};

/// Room for 20 integer digits (u64 seconds), a point and MAX_PRECISION decimals.
const FRAME_CAPACITY: usize = 48;

const BACKSPACE: u8 = 0x08;
static ERASE: [u8; FRAME_CAPACITY] = [BACKSPACE; FRAME_CAPACITY];

/// Exit status a process unit reports when its sink failed without an OS code.
const SINK_FAILURE_STATUS: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to write frame: {0}")]
    Write(#[source] io::Error),
    #[error("failed to flush frame: {0}")]
    Flush(#[source] io::Error),
    #[error("failed to erase frame: {0}")]
    Erase(#[source] io::Error),
    #[error("background process exited with status {code}")]
    Exited { code: i32 },
    #[error("background process was killed by signal {signal}")]
    Signaled { signal: i32 },
    /// The child's exit could not be confirmed.
    #[error("failed to wait for background process: {0}")]
    Reap(#[source] io::Error),
    #[error("background loop panicked")]
    Panicked,
}

impl FrameError {
    /// Status a forked unit exits with so the parent can recover the cause.
    ///
    /// Sink failures carry their errno (it fits a process status on every
    /// supported platform); everything else collapses to a generic failure.
    #[must_use]
    pub fn exit_status(&self) -> i32 {
        match self {
            FrameError::Write(err) | FrameError::Flush(err) | FrameError::Erase(err) => err
                .raw_os_error()
                .filter(|code| (1..=255).contains(code))
                .unwrap_or(SINK_FAILURE_STATUS),
            FrameError::Exited { code } => *code,
            FrameError::Signaled { .. } | FrameError::Reap(_) | FrameError::Panicked => {
                SINK_FAILURE_STATUS
            }
        }
    }

    /// The OS error a process unit most likely hit, decoded from its status.
    #[must_use]
    pub fn os_error(&self) -> Option<io::Error> {
        match self {
            FrameError::Exited { code } if *code != SINK_FAILURE_STATUS => {
                Some(io::Error::from_raw_os_error(*code))
            }
            FrameError::Write(err)
            | FrameError::Flush(err)
            | FrameError::Erase(err)
            | FrameError::Reap(err) => err.raw_os_error().map(io::Error::from_raw_os_error),
            _ => None,
        }
    }
}

/// One formatted elapsed-time reading, held on the stack.
#[derive(Clone, Copy)]
pub struct Frame {
    buf: [u8; FRAME_CAPACITY],
    len: usize,
}

impl Frame {
    const fn empty() -> Self {
        Self {
            buf: [0; FRAME_CAPACITY],
            len: 0,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }

    /// Character width on screen. Frames are ASCII, so bytes == columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backspaces that move the cursor back over this frame.
    #[must_use]
    pub fn erase_sequence(&self) -> &'static [u8] {
        erase_sequence(self.len)
    }
}

impl fmt::Write for Frame {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > FRAME_CAPACITY {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&self.as_str()).finish()
    }
}

/// Fixed-point text for `elapsed` with exactly `precision` decimals.
///
/// Precision 0 yields a bare integer with no decimal point.
#[must_use]
pub fn format_elapsed(elapsed: Duration, precision: Precision) -> Frame {
    let mut frame = Frame::empty();
    // Cannot overflow: FRAME_CAPACITY covers u64::MAX seconds at MAX_PRECISION.
    let _ = write!(frame, "{:.*}", precision.digits(), elapsed.as_secs_f64());
    frame
}

/// `len` backspace characters, capped at the widest possible frame.
#[must_use]
pub fn erase_sequence(len: usize) -> &'static [u8] {
    &ERASE[..len.min(FRAME_CAPACITY)]
}

/// Draws frames measured from a fixed start reading.
pub struct FrameRenderer {
    clock: Arc<dyn Clock>,
    start: Duration,
    precision: Precision,
    step: Duration,
}

impl FrameRenderer {
    /// Captures the clock's current reading as the start time.
    pub fn new(clock: Arc<dyn Clock>, precision: Precision, step: Step) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            precision,
            step: step.as_duration(),
        }
    }

    #[must_use]
    pub fn start_time(&self) -> Duration {
        self.start
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    #[must_use]
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Time since the start reading, never negative.
    #[must_use]
    pub fn sample(&self) -> Duration {
        elapsed_between(self.start, self.clock.now())
    }

    #[must_use]
    pub fn frame(&self) -> Frame {
        format_elapsed(self.sample(), self.precision)
    }

    /// One full cycle: write and flush the frame, sleep one step, backspace over it.
    ///
    /// The erase is not flushed; the next frame's flush (or the loop's final
    /// flush) pushes it out.
    pub fn render(&self, sink: &mut dyn Write) -> Result<(), FrameError> {
        let frame = self.frame();
        let text = frame.as_bytes();
        sink.write_all(text).map_err(FrameError::Write)?;
        sink.flush().map_err(FrameError::Flush)?;
        thread::sleep(self.step);
        let erase = frame.erase_sequence();
        sink.write_all(erase).map_err(FrameError::Erase)?;
        Ok(())
    }
}

impl fmt::Debug for FrameRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRenderer")
            .field("start", &self.start)
            .field("precision", &self.precision)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}
