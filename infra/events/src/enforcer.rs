//! Thread-affinity policies checked at the start of every public bus operation.

use crate::bus::EventBus;
use crate::error::BusError;
use std::fmt;
use std::thread::{self, ThreadId};

/// Decides whether the calling thread may use a bus.
pub trait ThreadEnforcer: Send + Sync + fmt::Debug {
    /// Returns [`BusError::ThreadAffinity`] when the current thread is not allowed.
    fn enforce(&self, bus: &EventBus) -> Result<(), BusError>;
}

/// Accepts every thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyThread;

impl ThreadEnforcer for AnyThread {
    fn enforce(&self, _bus: &EventBus) -> Result<(), BusError> {
        Ok(())
    }
}

/// Accepts a single designated thread.
#[derive(Debug, Clone, Copy)]
pub struct DesignatedThread {
    owner: ThreadId,
}

impl DesignatedThread {
    /// Binds the policy to the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self { owner: thread::current().id() }
    }

    #[must_use]
    pub const fn new(owner: ThreadId) -> Self {
        Self { owner }
    }

    #[must_use]
    pub const fn owner(&self) -> ThreadId {
        self.owner
    }
}

impl ThreadEnforcer for DesignatedThread {
    fn enforce(&self, bus: &EventBus) -> Result<(), BusError> {
        let current = thread::current();
        if current.id() == self.owner {
            return Ok(());
        }

        Err(BusError::ThreadAffinity {
            message: format!(
                "{bus} may only be used from {:?}, called from {:?} ({})",
                self.owner,
                current.id(),
                current.name().unwrap_or("unnamed")
            )
            .into(),
            context: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EmptyFinder;

    #[test]
    fn test_any_thread_accepts_foreign_threads() {
        let bus = EventBus::new(EmptyFinder);
        let result = thread::spawn(move || AnyThread.enforce(&bus)).join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_designated_thread_rejects_other_threads() {
        let bus = EventBus::new(EmptyFinder);
        let policy = DesignatedThread::current();

        assert!(policy.enforce(&bus).is_ok());

        let result = thread::spawn(move || policy.enforce(&bus)).join().unwrap();
        assert!(matches!(result, Err(BusError::ThreadAffinity { .. })));
    }
}
