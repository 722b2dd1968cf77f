use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use inline_timer_types::SubstrateKind;

use super::{BackgroundUnit, Job, Substrate, UnitId, sanitize_unit_name};
use crate::flag::{LocalFlag, StopFlag};
use crate::frame::FrameError;

/// Runs the loop on a named thread in this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSubstrate;

impl Substrate for ThreadSubstrate {
    fn kind(&self) -> SubstrateKind {
        SubstrateKind::Thread
    }

    fn new_flag(&self) -> io::Result<Arc<dyn StopFlag>> {
        Ok(Arc::new(LocalFlag::default()))
    }

    fn launch(&self, name: &str, job: Job) -> io::Result<Box<dyn BackgroundUnit>> {
        let handle = thread::Builder::new()
            .name(sanitize_unit_name(name))
            .spawn(job)?;
        Ok(Box::new(ThreadUnit { handle }))
    }
}

#[derive(Debug)]
pub struct ThreadUnit {
    handle: JoinHandle<Result<(), FrameError>>,
}

impl BackgroundUnit for ThreadUnit {
    fn id(&self) -> UnitId {
        UnitId::Thread(self.handle.thread().id())
    }

    fn is_finished(&mut self) -> bool {
        self.handle.is_finished()
    }

    fn join(self: Box<Self>) -> Result<(), FrameError> {
        match self.handle.join() {
            Ok(outcome) => outcome,
            Err(_) => Err(FrameError::Panicked),
        }
    }
}
