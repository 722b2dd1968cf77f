use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// The single output the readout draws on.
///
/// Cloning shares the same writer. The background loop holds the lock for
/// as long as it runs; callers should not write to the same stream while a
/// timer scope is active.
///
/// One running updater per sink: a clone handed to a second updater is
/// refused at `start()` while the first one's loop holds the writer, since a
/// process child forked at that moment would inherit the lock held.
#[derive(Clone)]
pub struct Sink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Sink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Standard output through a duplicated file descriptor.
    ///
    /// Bypasses `std::io::Stdout`'s internal lock so a forked child can
    /// write without inheriting a lock some other thread held at fork time.
    #[cfg(unix)]
    pub fn stdout() -> io::Result<Self> {
        use std::fs::File;
        use std::os::fd::AsFd;

        let fd = io::stdout().as_fd().try_clone_to_owned()?;
        Ok(Self::new(File::from(fd)))
    }

    #[cfg(not(unix))]
    pub fn stdout() -> io::Result<Self> {
        Ok(Self::new(io::stdout()))
    }

    /// True while a running loop holds the writer.
    pub(crate) fn is_busy(&self) -> bool {
        matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        // A panic mid-frame leaves the writer itself intact.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}
