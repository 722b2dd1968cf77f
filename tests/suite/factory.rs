//! Factories pick the substrate and never start anything on their own.

#[cfg(unix)]
use inline_timer_core::make_process_updater;
use inline_timer_core::{SubstrateKind, TimerOptions, make_thread_updater, make_updater};

use crate::common::options;

#[test]
fn switch_off_selects_the_thread_substrate() {
    let thread = make_updater(false, TimerOptions::default()).unwrap();
    assert_eq!(thread.kind(), SubstrateKind::Thread);
    assert_eq!(thread.name(), "ThreadTimer");
    assert!(!thread.is_active());
}

#[cfg(unix)]
#[test]
fn switch_on_selects_the_process_substrate() {
    let process = make_updater(true, TimerOptions::default()).unwrap();
    assert_eq!(process.kind(), SubstrateKind::Process);
    assert_eq!(process.name(), "ProcessTimer");
    assert!(!process.is_active());
}

#[test]
fn direct_factories_keep_the_given_options() {
    let updater = make_thread_updater(options("builder", 3, 0.25)).unwrap();
    assert_eq!(updater.kind(), SubstrateKind::Thread);
    assert_eq!(updater.name(), "builder");
    assert_eq!(updater.precision().digits(), 3);
    assert_eq!(updater.step(), std::time::Duration::from_millis(250));
    assert!(updater.unit_id().is_none());
}

#[cfg(unix)]
#[test]
fn process_factory_uses_the_process_default_name() {
    let updater = make_process_updater(TimerOptions::default()).unwrap();
    assert_eq!(updater.kind(), SubstrateKind::Process);
    assert_eq!(updater.name(), "ProcessTimer");
    assert!(updater.unit_id().is_none());
}
