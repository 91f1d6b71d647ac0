//! Bounded hand-off structures shared by the orchestrator and the workers.
//!
//! The input side is a bounded channel: one producer (the orchestrator),
//! many consumers (the workers). The output side is a slot array indexed by
//! `id % capacity`; workers reserve a slot before they pull input, so the
//! collection can never hold more than `capacity` finished blocks and the
//! orchestrator finds the next block to write in O(1).

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};

/// Creates an input queue holding at most `capacity` blocks.
pub fn input_queue<T>(capacity: usize) -> (InputProducer<T>, InputConsumer<T>) {
    let (tx, rx) = bounded(capacity);
    (InputProducer { tx }, InputConsumer { rx })
}

/// Orchestrator side of the input queue. Dropping it closes the queue.
pub struct InputProducer<T> {
    tx: Sender<T>,
}

impl<T> InputProducer<T> {
    /// Enqueues without blocking; a full queue hands the item back.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) | Err(TrySendError::Disconnected(item)) => Err(item),
        }
    }

    pub fn has_capacity(&self) -> bool {
        !self.tx.is_full()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Signals that no more input will arrive.
    pub fn close(self) {}
}

/// Outcome of a dequeue attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue<T> {
    Item(T),
    /// Nothing arrived before the timeout; the producer is still live.
    Empty,
    /// The producer is gone and every item has been handed out.
    Closed,
}

/// Worker side of the input queue.
#[derive(Clone)]
pub struct InputConsumer<T> {
    rx: Receiver<T>,
}

impl<T> InputConsumer<T> {
    /// Waits up to `timeout` for the next item.
    pub fn dequeue(&self, timeout: Duration) -> Dequeue<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Dequeue::Item(item),
            Err(RecvTimeoutError::Timeout) => Dequeue::Empty,
            Err(RecvTimeoutError::Disconnected) => Dequeue::Closed,
        }
    }

    pub fn try_dequeue(&self) -> Dequeue<T> {
        match self.rx.try_recv() {
            Ok(item) => Dequeue::Item(item),
            Err(TryRecvError::Empty) => Dequeue::Empty,
            Err(TryRecvError::Disconnected) => Dequeue::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

struct SlotState<T> {
    slots: Vec<Option<(u64, T)>>,
    reserved: usize,
    stored: usize,
    high_water: usize,
}

/// Capacity-bounded collection of finished blocks, keyed by block id.
///
/// A slot must be reserved before a block is published. Reservations are
/// released when the orchestrator takes the block, or explicitly when a
/// worker gives up without producing one.
pub struct OutputSlots<T> {
    state: Mutex<SlotState<T>>,
    space: Condvar,
    ready: Condvar,
    capacity: usize,
}

impl<T> OutputSlots<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(SlotState {
                slots: (0..capacity).map(|_| None).collect(),
                reserved: 0,
                stored: 0,
                high_water: 0,
            }),
            space: Condvar::new(),
            ready: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserves room for one block without waiting.
    pub fn try_reserve(&self) -> bool {
        let mut state = self.lock();
        if state.reserved < self.capacity {
            state.reserved += 1;
            true
        } else {
            false
        }
    }

    /// Reserves room for one block, waiting up to `timeout` while full.
    pub fn reserve_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.lock();
        if state.reserved >= self.capacity {
            state = self
                .space
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if state.reserved < self.capacity {
            state.reserved += 1;
            true
        } else {
            false
        }
    }

    /// Gives back a reservation that will not be used.
    pub fn release(&self) {
        let mut state = self.lock();
        state.reserved = state.reserved.saturating_sub(1);
        drop(state);
        self.space.notify_one();
    }

    /// Stores a finished block in a previously reserved slot.
    pub fn publish(&self, id: u64, item: T) {
        let mut state = self.lock();
        let index = self.slot_index(id);
        debug_assert!(
            state.slots[index].is_none(),
            "slot {index} still holds a block while publishing id {id}"
        );
        state.slots[index] = Some((id, item));
        state.stored += 1;
        state.high_water = state.high_water.max(state.stored);
        drop(state);
        self.ready.notify_all();
    }

    /// Reserves and publishes in one step, for blocks produced by the
    /// orchestrator itself. Returns the item if the collection is full.
    pub fn try_insert(&self, id: u64, item: T) -> Result<(), T> {
        if !self.try_reserve() {
            return Err(item);
        }
        self.publish(id, item);
        Ok(())
    }

    /// Removes block `id` if it has been published.
    pub fn take(&self, id: u64) -> Option<T> {
        let mut state = self.lock();
        let item = self.take_locked(&mut state, id);
        drop(state);
        if item.is_some() {
            self.space.notify_one();
        }
        item
    }

    /// Like [`take`](Self::take), but waits up to `timeout` for the block
    /// to be published.
    pub fn take_timeout(&self, id: u64, timeout: Duration) -> Option<T> {
        let mut state = self.lock();
        if !self.is_published(&state, id) {
            state = self
                .ready
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        let item = self.take_locked(&mut state, id);
        drop(state);
        if item.is_some() {
            self.space.notify_one();
        }
        item
    }

    /// Number of finished blocks currently stored.
    pub fn len(&self) -> usize {
        self.lock().stored
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored blocks plus slots reserved by busy workers.
    pub fn reserved(&self) -> usize {
        self.lock().reserved
    }

    /// Largest number of finished blocks ever stored at once.
    pub fn high_water(&self) -> usize {
        self.lock().high_water
    }

    /// Wakes every thread waiting on this collection.
    pub fn wake_all(&self) {
        self.space.notify_all();
        self.ready.notify_all();
    }

    fn slot_index(&self, id: u64) -> usize {
        (id % self.capacity as u64) as usize
    }

    fn is_published(&self, state: &SlotState<T>, id: u64) -> bool {
        matches!(&state.slots[self.slot_index(id)], Some((stored_id, _)) if *stored_id == id)
    }

    fn take_locked(&self, state: &mut SlotState<T>, id: u64) -> Option<T> {
        if !self.is_published(state, id) {
            return None;
        }
        let index = self.slot_index(id);
        let (_, item) = state.slots[index].take()?;
        state.stored -= 1;
        state.reserved = state.reserved.saturating_sub(1);
        Some(item)
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn input_queue_is_fifo_and_bounded() {
        let (producer, consumer) = input_queue(2);
        assert!(producer.try_enqueue(1).is_ok());
        assert!(producer.try_enqueue(2).is_ok());
        assert!(!producer.has_capacity());
        assert_eq!(producer.try_enqueue(3), Err(3));

        assert_eq!(consumer.try_dequeue(), Dequeue::Item(1));
        assert_eq!(consumer.try_dequeue(), Dequeue::Item(2));
        assert_eq!(consumer.try_dequeue(), Dequeue::Empty);
    }

    #[test]
    fn closed_queue_drains_before_reporting_closed() {
        let (producer, consumer) = input_queue(4);
        producer.try_enqueue("a").unwrap();
        producer.close();
        assert_eq!(
            consumer.dequeue(Duration::from_millis(5)),
            Dequeue::Item("a")
        );
        assert_eq!(consumer.dequeue(Duration::from_millis(5)), Dequeue::Closed);
    }

    #[test]
    fn reservations_bound_the_collection() {
        let slots = OutputSlots::new(2);
        assert!(slots.try_reserve());
        assert!(slots.try_reserve());
        assert!(!slots.try_reserve());
        assert!(!slots.reserve_timeout(Duration::from_millis(5)));

        slots.publish(7, "seven");
        slots.publish(8, "eight");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.take(8), Some("eight"));
        assert!(slots.try_reserve());
        slots.release();
        assert_eq!(slots.reserved(), 1);
        assert_eq!(slots.high_water(), 2);
    }

    #[test]
    fn take_only_matches_exact_id() {
        let slots = OutputSlots::new(4);
        slots.try_insert(5, 'x').unwrap();
        // 1 and 9 share slot 1 with 5.
        assert_eq!(slots.take(1), None);
        assert_eq!(slots.take(9), None);
        assert_eq!(slots.take(5), Some('x'));
        assert!(slots.is_empty());
        assert_eq!(slots.reserved(), 0);
    }

    #[test]
    fn take_timeout_wakes_on_publish() {
        let slots = Arc::new(OutputSlots::new(4));
        assert!(slots.try_reserve());

        let publisher = Arc::clone(&slots);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publisher.publish(0, vec![1u8, 2, 3]);
        });

        let mut taken = None;
        for _ in 0..200 {
            taken = slots.take_timeout(0, Duration::from_millis(50));
            if taken.is_some() {
                break;
            }
        }
        handle.join().unwrap();
        assert_eq!(taken, Some(vec![1, 2, 3]));
    }

    #[test]
    fn blocked_reservation_resumes_after_take() {
        let slots = Arc::new(OutputSlots::new(1));
        slots.try_insert(0, 0u8).unwrap();

        let waiter = Arc::clone(&slots);
        let handle = thread::spawn(move || {
            let mut reserved = false;
            for _ in 0..200 {
                if waiter.reserve_timeout(Duration::from_millis(50)) {
                    reserved = true;
                    break;
                }
            }
            reserved
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(slots.take(0), Some(0));
        assert!(handle.join().unwrap());
    }
}
