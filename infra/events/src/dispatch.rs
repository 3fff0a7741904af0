use crate::binding::Subscription;
use crate::error::BusError;
use crate::event::Routable;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

thread_local! {
    static QUEUES: RefCell<FxHashMap<u64, Slot>> = RefCell::new(FxHashMap::default());
}

/// An event waiting to be handed to one subscription.
struct Dispatch {
    event: Arc<dyn Routable>,
    subscription: Arc<Subscription>,
}

#[derive(Default)]
struct Slot {
    pending: VecDeque<Dispatch>,
    draining: bool,
}

/// Per-thread FIFO of pending deliveries for one bus.
///
/// Every thread gets its own queue for every bus it posts on. A drain started
/// while another drain of the same queue is running on the same thread returns
/// immediately; the outer drain picks up whatever was enqueued meanwhile, so a
/// handler that posts never re-enters another handler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DispatchQueue {
    bus_id: u64,
}

impl DispatchQueue {
    pub(crate) const fn new(bus_id: u64) -> Self {
        Self { bus_id }
    }

    pub(crate) fn enqueue(&self, event: Arc<dyn Routable>, subscription: Arc<Subscription>) {
        QUEUES.with_borrow_mut(|queues| {
            queues
                .entry(self.bus_id)
                .or_default()
                .pending
                .push_back(Dispatch { event, subscription });
        });
    }

    /// Delivers pending events in FIFO order until the queue is empty.
    ///
    /// Entries whose subscription became invalid after enqueueing are skipped.
    /// The first delivery error stops the drain and leaves the remaining
    /// entries queued for the next drain on this thread. Until then those
    /// entries, and any bus handle a queued [`DeadEvent`] carries, stay alive
    /// for as long as the thread does.
    ///
    /// [`DeadEvent`]: crate::event::DeadEvent
    pub(crate) fn drain(&self) -> Result<(), BusError> {
        if !self.enter() {
            return Ok(());
        }
        let _guard = DrainGuard { bus_id: self.bus_id };

        while let Some(next) = self.pop() {
            if !next.subscription.is_valid() {
                trace!(subscriber = %next.subscription, "Skipping dispatch to invalid subscriber");
                continue;
            }
            next.subscription.deliver(&*next.event)?;
        }

        Ok(())
    }

    /// Number of deliveries still queued on the current thread.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        QUEUES.with_borrow(|queues| queues.get(&self.bus_id).map_or(0, |slot| slot.pending.len()))
    }

    fn enter(&self) -> bool {
        QUEUES.with_borrow_mut(|queues| {
            let slot = queues.entry(self.bus_id).or_default();
            !std::mem::replace(&mut slot.draining, true)
        })
    }

    fn pop(&self) -> Option<Dispatch> {
        QUEUES.with_borrow_mut(|queues| queues.get_mut(&self.bus_id)?.pending.pop_front())
    }
}

/// Clears the draining flag on every exit path, unwinding included, and frees
/// the slot once nothing is left in it.
struct DrainGuard {
    bus_id: u64,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        let _ = QUEUES.try_with(|queues| {
            let Ok(mut queues) = queues.try_borrow_mut() else {
                return;
            };
            if let Some(slot) = queues.get_mut(&self.bus_id) {
                slot.draining = false;
                if slot.pending.is_empty() {
                    queues.remove(&self.bus_id);
                }
            }
        });
    }
}
