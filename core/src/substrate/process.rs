use std::io;
use std::sync::Arc;

use inline_timer_types::SubstrateKind;

use super::{BackgroundUnit, Job, Substrate};
use crate::flag::StopFlag;

/// Runs the loop in a forked child process.
///
/// The child gets a copy-on-write snapshot of the parent: only bytes it writes
/// to file-descriptor-backed sinks are visible outside it, and the stop flag
/// lives in shared memory. Unix only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSubstrate;

#[cfg(unix)]
mod unix {
    use std::ffi::CString;
    use std::io;
    use std::panic::{self, AssertUnwindSafe};

    use tracing::{debug, warn};

    use super::super::{BackgroundUnit, Job, UnitId};
    use crate::frame::FrameError;

    pub(super) fn fork_unit(name: &str, job: Job) -> io::Result<Box<dyn BackgroundUnit>> {
        // Everything the child needs is prepared before fork; the child must
        // not allocate.
        let comm = CString::new(super::super::sanitize_unit_name(name)).ok();
        // SAFETY: getpid has no preconditions.
        let parent = unsafe { libc::getpid() };

        // SAFETY: the child runs only `run_child`, which sticks to
        // async-signal-safe calls plus the lock-free render loop, then `_exit`s.
        match unsafe { libc::fork() } {
            -1 => Err(io::Error::last_os_error()),
            0 => {
                let status = run_child(parent, comm.as_ref(), job);
                // SAFETY: leave without unwinding into the parent's stack or
                // running its atexit handlers.
                unsafe { libc::_exit(status) }
            }
            pid => {
                debug!(pid, name, "Forked timer process");
                Ok(Box::new(ProcessUnit::new(pid)))
            }
        }
    }

    fn run_child(parent: libc::pid_t, comm: Option<&CString>, job: Job) -> libc::c_int {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: plain prctl calls on the calling process.
            unsafe {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM, 0, 0, 0);
                if let Some(comm) = comm {
                    libc::prctl(libc::PR_SET_NAME, comm.as_ptr(), 0, 0, 0);
                }
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = comm;

        // Parent already gone: nobody is left to show the readout to.
        // SAFETY: getppid has no preconditions.
        if unsafe { libc::getppid() } != parent {
            return 0;
        }

        match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => 0,
            Ok(Err(err)) => err.exit_status(),
            Err(_) => FrameError::Panicked.exit_status(),
        }
    }

    #[derive(Debug)]
    pub(super) struct ProcessUnit {
        pid: libc::pid_t,
        status: Option<Result<(), FrameError>>,
        reaped: bool,
    }

    impl ProcessUnit {
        fn new(pid: libc::pid_t) -> Self {
            Self {
                pid,
                status: None,
                reaped: false,
            }
        }

        /// `None` means still running (only possible with `WNOHANG`).
        fn wait(&mut self, flags: libc::c_int) -> Option<Result<(), FrameError>> {
            let outcome = self.wait_raw(flags);
            if let Some(result) = &outcome
                && !matches!(result, Err(FrameError::Reap(_)))
            {
                self.reaped = true;
            }
            outcome
        }

        fn wait_raw(&self, flags: libc::c_int) -> Option<Result<(), FrameError>> {
            loop {
                let mut status: libc::c_int = 0;
                // SAFETY: `pid` is a child of this process.
                let rc = unsafe { libc::waitpid(self.pid, &raw mut status, flags) };
                if rc == self.pid {
                    return Some(decode_status(status));
                }
                if rc == 0 {
                    return None;
                }
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => {}
                    Some(libc::ECHILD) => {
                        // Reaped elsewhere (e.g. SIGCHLD ignored): it is gone either way.
                        debug!(pid = self.pid, "Timer process already reaped");
                        return Some(Ok(()));
                    }
                    _ => {
                        warn!(pid = self.pid, "waitpid failed: {err}");
                        return Some(Err(FrameError::Reap(err)));
                    }
                }
            }
        }
    }

    fn decode_status(status: libc::c_int) -> Result<(), FrameError> {
        if libc::WIFEXITED(status) {
            match libc::WEXITSTATUS(status) {
                0 => Ok(()),
                code => Err(FrameError::Exited { code }),
            }
        } else if libc::WIFSIGNALED(status) {
            Err(FrameError::Signaled {
                signal: libc::WTERMSIG(status),
            })
        } else {
            Ok(())
        }
    }

    impl BackgroundUnit for ProcessUnit {
        fn id(&self) -> UnitId {
            UnitId::Process(self.pid as u32)
        }

        fn is_finished(&mut self) -> bool {
            if self.status.is_none() {
                // A failed wait is not an exit; leave it for `join` to report.
                self.status = self
                    .wait(libc::WNOHANG)
                    .filter(|outcome| !matches!(outcome, Err(FrameError::Reap(_))));
            }
            self.status.is_some()
        }

        fn join(mut self: Box<Self>) -> Result<(), FrameError> {
            match self.status.take() {
                Some(outcome) => outcome,
                None => self.wait(0).unwrap_or(Ok(())),
            }
        }
    }

    impl Drop for ProcessUnit {
        fn drop(&mut self) {
            // Best-effort reap of a detached child; never block here.
            if !self.reaped {
                let _ = self.wait(libc::WNOHANG);
            }
        }
    }

}

impl Substrate for ProcessSubstrate {
    fn kind(&self) -> SubstrateKind {
        SubstrateKind::Process
    }

    #[cfg(unix)]
    fn new_flag(&self) -> io::Result<Arc<dyn StopFlag>> {
        Ok(Arc::new(crate::flag::SharedFlag::new()?))
    }

    #[cfg(unix)]
    fn launch(&self, name: &str, job: Job) -> io::Result<Box<dyn BackgroundUnit>> {
        unix::fork_unit(name, job)
    }

    #[cfg(not(unix))]
    fn new_flag(&self) -> io::Result<Arc<dyn StopFlag>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process timers require a unix platform",
        ))
    }

    #[cfg(not(unix))]
    fn launch(&self, _name: &str, _job: Job) -> io::Result<Box<dyn BackgroundUnit>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process timers require a unix platform",
        ))
    }
}
