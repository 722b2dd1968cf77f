//! The scope guard stops the readout on every way out of the guarded block.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use inline_timer_core::{ScopedUpdater, Sink, SubstrateKind, UpdaterError};

use crate::common::{SharedBuffer, options, parse_frames};

#[derive(Debug, PartialEq, Eq)]
struct BuildFailed(&'static str);

#[derive(Debug)]
enum TaskError {
    Timer(UpdaterError),
    Build(BuildFailed),
}

impl From<UpdaterError> for TaskError {
    fn from(err: UpdaterError) -> Self {
        TaskError::Timer(err)
    }
}

impl From<BuildFailed> for TaskError {
    fn from(err: BuildFailed) -> Self {
        TaskError::Build(err)
    }
}

fn failing_step() -> Result<(), BuildFailed> {
    thread::sleep(Duration::from_millis(15));
    Err(BuildFailed("linker"))
}

fn guarded_task(updater: &mut ScopedUpdater) -> Result<(), TaskError> {
    let _guard = updater.scope()?;
    failing_step()?;
    unreachable!("failing_step always errors");
}

fn explode() {
    panic!("work exploded");
}

fn guard_updater(buf: &SharedBuffer) -> ScopedUpdater {
    ScopedUpdater::with_sink(
        options("guard", 2, 0.003),
        SubstrateKind::Thread,
        Sink::new(buf.clone()),
    )
    .unwrap()
}

#[test]
fn early_return_with_error_stops_and_keeps_the_error() {
    let buf = SharedBuffer::default();
    let mut updater = guard_updater(&buf);

    let err = guarded_task(&mut updater).unwrap_err();

    assert!(matches!(err, TaskError::Build(BuildFailed("linker"))));
    assert!(!updater.is_active());
    let written = buf.len();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(buf.len(), written);
    parse_frames(&buf.bytes()).unwrap();
}

#[test]
fn failed_start_surfaces_as_the_timer_error() {
    let buf = SharedBuffer::default();
    let mut updater = guard_updater(&buf);
    updater.start().unwrap();

    let err = guarded_task(&mut updater).unwrap_err();

    assert!(matches!(
        err,
        TaskError::Timer(UpdaterError::AlreadyRunning { .. })
    ));
    assert!(updater.is_active());
    updater.stop();
}

#[test]
fn panic_inside_scope_still_stops() {
    let buf = SharedBuffer::default();
    let mut updater = guard_updater(&buf);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = updater.scope().unwrap();
        thread::sleep(Duration::from_millis(10));
        explode();
    }));

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"work exploded"));
    assert!(!updater.is_active());
    parse_frames(&buf.bytes()).unwrap();
}

#[test]
fn run_passes_the_work_error_through_unchanged() {
    let buf = SharedBuffer::default();
    let mut updater = guard_updater(&buf);

    let outcome = updater.run(failing_step).unwrap();

    assert_eq!(outcome, Err(BuildFailed("linker")));
    assert!(!updater.is_active());
}

#[test]
fn start_inside_an_active_scope_is_rejected() {
    let buf = SharedBuffer::default();
    let mut updater = guard_updater(&buf);

    let mut guard = updater.scope().unwrap();
    let err = guard.start().unwrap_err();
    assert!(matches!(err, UpdaterError::AlreadyRunning { .. }));
    assert!(guard.is_active());
    drop(guard);

    assert!(!updater.is_active());
}
