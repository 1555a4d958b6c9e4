//! Double-buffered per-node message storage.
//!
//! Each generation is a paged array of per-node inbox slots guarded by their
//! own mutex, so concurrent senders only contend when they target the same
//! node. During superstep `T`, generation `T % 2` is the inbox (drained by the
//! node's own worker) and generation `(T + 1) % 2` is the outbox (appended to
//! by any worker). Swapping generations at the barrier is a change of
//! superstep parity; no data moves.
//!
//! Slots are drained rather than replaced, so the capacity a node needed in
//! one superstep is reused the next time its slot serves as an outbox.

use parking_lot::{Mutex, MutexGuard};

use crate::error::{AllocationError, PregelError};
use crate::message::{InboxBuffer, Message, Reduction};
use crate::paged::PagedArray;

type Slot<M> = Mutex<InboxBuffer<M>>;

/// Why a message could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendError {
    UnknownTarget,
    Allocation(AllocationError),
}

/// Outcome of delivering one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Stored as a new entry in the target's slot.
    Stored,
    /// Reduced into the value already held by the slot.
    Combined,
}

pub(crate) struct MessageStore<'c, M> {
    generations: [PagedArray<Slot<M>>; 2],
    reduction: Reduction<'c, M>,
}

impl<'c, M: Message> MessageStore<'c, M> {
    pub(crate) fn try_new(node_count: usize, reduction: Reduction<'c, M>) -> Result<Self, PregelError> {
        let alloc = || {
            PagedArray::try_from_fn(node_count, |_| Mutex::new(InboxBuffer::new()))
                .map_err(|e: AllocationError| e.into_pregel("message slots"))
        };
        Ok(MessageStore {
            generations: [alloc()?, alloc()?],
            reduction,
        })
    }

    /// Locks the inbox slot of `node` for `superstep`.
    ///
    /// Only the worker executing `node` touches this slot during the
    /// superstep, so the lock is uncontended.
    #[inline]
    pub(crate) fn inbox(&self, superstep: u32, node: usize) -> Option<MutexGuard<'_, InboxBuffer<M>>> {
        self.generations[(superstep % 2) as usize]
            .get(node)
            .map(|slot| slot.lock())
    }

    /// Appends `message` to the outbox of `target` for `superstep + 1`,
    /// reducing it into the existing value when a combiner is configured.
    #[inline]
    pub(crate) fn send(
        &self,
        superstep: u32,
        target: usize,
        message: M,
    ) -> Result<Delivery, SendError> {
        let Some(slot) = self.generations[((superstep + 1) % 2) as usize].get(target) else {
            return Err(SendError::UnknownTarget);
        };
        let mut buffer = slot.lock();

        if self.reduction.is_combining() {
            if let Some(current) = buffer.pop() {
                buffer.push(self.reduction.apply(current, message));
                return Ok(Delivery::Combined);
            }
        }

        if buffer.len() == buffer.capacity() {
            buffer.try_reserve(1).map_err(|_| {
                SendError::Allocation(AllocationError {
                    requested: buffer.len() + 1,
                })
            })?;
        }
        buffer.push(message);
        Ok(Delivery::Stored)
    }

    /// Number of messages waiting in the inbox generation of `superstep`.
    #[cfg(test)]
    pub(crate) fn pending(&self, superstep: u32) -> usize {
        self.generations[(superstep % 2) as usize]
            .iter()
            .map(|slot| slot.lock().len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CombinerKind, Messages};

    #[test]
    fn messages_become_visible_one_superstep_later() {
        let store = MessageStore::<u32>::try_new(4, Reduction::Keep).unwrap();
        store.send(0, 2, 7).unwrap();
        store.send(0, 2, 8).unwrap();

        assert!(store.inbox(0, 2).unwrap().is_empty());
        assert_eq!(store.pending(1), 2);

        let mut inbox = store.inbox(1, 2).unwrap();
        let received: Vec<u32> = Messages::new(&mut inbox).collect();
        assert_eq!(received, vec![7, 8]);
        assert!(inbox.is_empty());
    }

    #[test]
    fn combiner_keeps_one_value_per_node() {
        let store = MessageStore::<u64>::try_new(3, Reduction::Builtin(CombinerKind::Sum)).unwrap();
        assert_eq!(store.send(4, 1, 1).unwrap(), Delivery::Stored);
        assert_eq!(store.send(4, 1, 2).unwrap(), Delivery::Combined);
        assert_eq!(store.send(4, 1, 3).unwrap(), Delivery::Combined);

        let inbox = store.inbox(5, 1).unwrap();
        assert_eq!(inbox.as_slice(), &[6]);
    }

    #[test]
    fn drained_slot_is_reused_as_outbox() {
        let store = MessageStore::<u8>::try_new(1, Reduction::Keep).unwrap();
        for m in 0..10 {
            store.send(0, 0, m).unwrap();
        }
        let capacity = {
            let mut inbox = store.inbox(1, 0).unwrap();
            let capacity = inbox.capacity();
            assert_eq!(Messages::new(&mut inbox).count(), 10);
            capacity
        };
        // Superstep 2 writes into the generation drained during superstep 1.
        store.send(2, 0, 1).unwrap();
        let inbox = store.inbox(3, 0).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.capacity(), capacity);
    }

    #[test]
    fn concurrent_senders_lose_nothing() {
        let store = MessageStore::<u64>::try_new(8, Reduction::Keep).unwrap();
        crossbeam::thread::scope(|s| {
            for t in 0..4u64 {
                let store = &store;
                s.spawn(move |_| {
                    for i in 0..250u64 {
                        store.send(0, (i % 8) as usize, t * 1000 + i).unwrap();
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(store.send(0, 8, 1), Err(SendError::UnknownTarget));
        assert_eq!(store.pending(1), 1000);
    }
}
