//! End-to-end behaviour of the fork-backed updater.
//!
//! A forked child writes through its own copy of the sink, so these tests
//! draw to a temp file and read it back after the child has been joined.

use std::fs::{self, File};
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::thread;
use std::time::{Duration, Instant};

use inline_timer_core::{FrameError, ScopedUpdater, Sink, SubstrateKind, UnitId, UpdaterError};
use tempfile::NamedTempFile;

use crate::common::{assert_frames_well_formed, options, parse_frames, wait_until};

fn process_updater(file: &NamedTempFile, name: &str, precision: u32, step: f64) -> ScopedUpdater {
    let sink = Sink::new(file.reopen().unwrap());
    ScopedUpdater::with_sink(options(name, precision, step), SubstrateKind::Process, sink).unwrap()
}

fn is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[test]
fn scoped_run_writes_and_erases_whole_frames() {
    let file = NamedTempFile::new().unwrap();
    let mut updater = process_updater(&file, "t", 2, 0.01);

    let pid = {
        let guard = updater.scope().unwrap();
        let Some(UnitId::Process(pid)) = guard.unit_id() else {
            panic!("expected a process unit");
        };
        thread::sleep(Duration::from_millis(50));
        pid
    };

    assert!(!updater.is_active());
    assert!(!is_alive(pid), "child {pid} still running after scope exit");

    let frames = parse_frames(&fs::read(file.path()).unwrap()).unwrap();
    assert!(!frames.is_empty(), "no frame was drawn");
    assert_frames_well_formed(&frames, 2);
    assert!(updater.last_error().is_none());
}

#[test]
fn default_name_is_the_process_variant() {
    let file = NamedTempFile::new().unwrap();
    let sink = Sink::new(file.reopen().unwrap());
    let updater = ScopedUpdater::with_sink(
        inline_timer_core::TimerOptions::default(),
        SubstrateKind::Process,
        sink,
    )
    .unwrap();
    assert_eq!(updater.name(), "ProcessTimer");
    assert_eq!(updater.kind(), SubstrateKind::Process);
}

#[cfg(target_os = "linux")]
#[test]
fn child_process_carries_the_unit_name() {
    let file = NamedTempFile::new().unwrap();
    let mut updater = process_updater(&file, "busy-timer", 2, 0.01);

    updater.start().unwrap();
    let Some(UnitId::Process(pid)) = updater.unit_id() else {
        panic!("expected a process unit");
    };
    let comm_path = format!("/proc/{pid}/comm");
    let named = wait_until(Duration::from_secs(2), || {
        fs::read_to_string(&comm_path)
            .is_ok_and(|comm| comm.trim_end() == "busy-timer")
    });
    updater.stop();

    assert!(named, "child never renamed itself");
}

#[test]
fn stop_right_after_start_is_bounded_by_a_few_steps() {
    let file = NamedTempFile::new().unwrap();
    let step = Duration::from_millis(10);
    let mut updater = process_updater(&file, "t", 4, step.as_secs_f64());

    updater.start().unwrap();
    let began = Instant::now();
    updater.stop();
    let took = began.elapsed();

    assert!(
        took <= step * 3 + Duration::from_millis(500),
        "stop took {took:?}"
    );
    assert!(!updater.is_active());
    parse_frames(&fs::read(file.path()).unwrap()).unwrap();
}

#[test]
fn stop_is_idempotent_and_restart_forks_a_new_child() {
    let file = NamedTempFile::new().unwrap();
    let mut updater = process_updater(&file, "t", 3, 0.005);

    updater.stop();

    updater.start().unwrap();
    let first = updater.unit_id().unwrap();
    thread::sleep(Duration::from_millis(15));
    updater.stop();
    updater.stop();

    updater.start().unwrap();
    let second = updater.unit_id().unwrap();
    updater.stop();

    assert_ne!(first, second);
    assert!(!updater.is_active());
    parse_frames(&fs::read(file.path()).unwrap()).unwrap();
}

#[test]
fn double_start_does_not_leak_a_second_child() {
    let file = NamedTempFile::new().unwrap();
    let mut updater = process_updater(&file, "t", 2, 0.005);

    updater.start().unwrap();
    let first = updater.unit_id();
    assert!(updater.start().is_err());
    assert_eq!(updater.unit_id(), first);
    updater.stop();
}

#[test]
fn busy_sink_is_refused_before_forking() {
    let file = NamedTempFile::new().unwrap();
    let sink = Sink::new(file.reopen().unwrap());
    let mut drawing = ScopedUpdater::with_sink(
        options("t", 2, 0.005),
        SubstrateKind::Thread,
        sink.clone(),
    )
    .unwrap();
    let mut forking = ScopedUpdater::with_sink(
        options("p", 2, 0.005),
        SubstrateKind::Process,
        sink,
    )
    .unwrap();

    drawing.start().unwrap();
    let path = file.path().to_path_buf();
    assert!(wait_until(Duration::from_secs(2), || {
        fs::metadata(&path).is_ok_and(|meta| meta.len() > 0)
    }));

    let err = forking.start().unwrap_err();
    assert!(matches!(err, UpdaterError::SinkBusy { .. }), "{err:?}");
    assert!(forking.unit_id().is_none());

    drawing.stop();
    forking.start().unwrap();
    forking.stop();
    assert!(forking.last_error().is_none());
    parse_frames(&fs::read(file.path()).unwrap()).unwrap();
}

#[test]
fn broken_pipe_in_the_child_is_reported_after_stop() {
    let mut fds = [0; 2];
    // SAFETY: `fds` has room for both ends.
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    // SAFETY: both descriptors are fresh and owned here.
    let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    // SAFETY: as above.
    let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };
    drop(read_end);

    let mut updater = ScopedUpdater::with_sink(
        options("t", 2, 0.005),
        SubstrateKind::Process,
        Sink::new(File::from(write_end)),
    )
    .unwrap();

    updater.start().unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || !updater.is_running()),
        "child kept running with a broken sink"
    );
    updater.stop();

    match updater.last_error() {
        Some(FrameError::Exited { code }) => {
            assert_eq!(*code, libc::EPIPE);
            let os = updater.last_error().and_then(FrameError::os_error);
            assert_eq!(os.map(|err| err.kind()), Some(io::ErrorKind::BrokenPipe));
        }
        // Only when SIGPIPE is not ignored by the test harness.
        Some(FrameError::Signaled { signal }) => assert_eq!(*signal, libc::SIGPIPE),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
