//! Stop flags polled by the background loop once per frame.

use std::sync::atomic::{AtomicBool, Ordering};

/// A settable, clearable flag shared between the caller and its background unit.
///
/// `set` must happen-before any later `is_set` that observes it, on whichever
/// side of the substrate boundary the reader lives.
pub trait StopFlag: Send + Sync {
    fn set(&self);
    fn clear(&self);
    fn is_set(&self) -> bool;
}

/// Flag for units that share this process's memory.
#[derive(Debug, Default)]
pub struct LocalFlag(AtomicBool);

impl StopFlag for LocalFlag {
    fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(unix)]
pub use shared::SharedFlag;

#[cfg(unix)]
mod shared {
    use std::io;
    use std::mem;
    use std::ptr::{self, NonNull};
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::StopFlag;

    /// Flag stored in an anonymous shared mapping, so a forked child sees
    /// the parent's writes (and the other way round).
    #[derive(Debug)]
    pub struct SharedFlag {
        ptr: NonNull<AtomicBool>,
    }

    // SAFETY: the pointee is an atomic; all access goes through atomic ops.
    unsafe impl Send for SharedFlag {}
    // SAFETY: as above.
    unsafe impl Sync for SharedFlag {}

    impl SharedFlag {
        pub fn new() -> io::Result<Self> {
            // SAFETY: requesting a fresh anonymous mapping; no existing memory is touched.
            let raw = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    mem::size_of::<AtomicBool>(),
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if raw == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            let ptr = NonNull::new(raw.cast::<AtomicBool>())
                .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
            // SAFETY: the mapping is page-aligned, writable and large enough.
            unsafe { ptr.as_ptr().write(AtomicBool::new(false)) };
            Ok(Self { ptr })
        }

        fn atomic(&self) -> &AtomicBool {
            // SAFETY: initialized in `new`, unmapped only in `drop`.
            unsafe { self.ptr.as_ref() }
        }
    }

    impl StopFlag for SharedFlag {
        fn set(&self) {
            self.atomic().store(true, Ordering::Release);
        }

        fn clear(&self) {
            self.atomic().store(false, Ordering::Release);
        }

        fn is_set(&self) -> bool {
            self.atomic().load(Ordering::Acquire)
        }
    }

    impl Drop for SharedFlag {
        fn drop(&mut self) {
            // SAFETY: `ptr` came from mmap with this exact length. A forked
            // child keeps its own mapping of the page.
            let len = mem::size_of::<AtomicBool>();
            let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), len) };
            if rc != 0 {
                tracing::warn!(
                    "Failed to unmap shared stop flag: {}",
                    io::Error::last_os_error()
                );
            }
        }
    }
}
