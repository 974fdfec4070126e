//! Time-ordered queue of pending work.
//!
//! `PlanQueue<T>` holds values of type `T` keyed by an `f64` time. Plans at the same time
//! come out in the order they were pushed, which keeps seeded runs reproducible. Pushing
//! is *O*(log(*n*)); cancelling only forgets the value and the stale heap slot is skipped
//! on the way out.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::hashing::HashMap;

/// Handle returned by `PlanQueue::push`, used to cancel a plan.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlanId(u64);

pub struct PlanQueue<T> {
    heap: BinaryHeap<Slot>,
    pending: HashMap<u64, T>,
    next_id: u64,
}

impl<T> PlanQueue<T> {
    #[must_use]
    pub fn new() -> PlanQueue<T> {
        PlanQueue {
            heap: BinaryHeap::new(),
            pending: HashMap::default(),
            next_id: 0,
        }
    }

    pub fn push(&mut self, time: f64, value: T) -> PlanId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Slot { time, id });
        self.pending.insert(id, value);
        PlanId(id)
    }

    /// Returns `false` if the plan already ran or was cancelled.
    pub fn cancel(&mut self, id: PlanId) -> bool {
        self.pending.remove(&id.0).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes the earliest pending plan.
    pub fn pop(&mut self) -> Option<(f64, T)> {
        while let Some(slot) = self.heap.pop() {
            if let Some(value) = self.pending.remove(&slot.id) {
                return Some((slot.time, value));
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }
}

impl<T> Default for PlanQueue<T> {
    fn default() -> Self {
        PlanQueue::new()
    }
}

struct Slot {
    time: f64,
    id: u64,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `BinaryHeap` is a max-heap: the earliest time and then the oldest id compare greatest.
impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T>(queue: &mut PlanQueue<T>) -> Vec<(f64, T)> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn pops_in_time_order() {
        let mut queue = PlanQueue::new();
        queue.push(3.0, 'c');
        queue.push(1.0, 'a');
        queue.push(2.5, 'b');
        assert_eq!(queue.len(), 3);

        assert_eq!(drain(&mut queue), vec![(1.0, 'a'), (2.5, 'b'), (3.0, 'c')]);
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut queue = PlanQueue::new();
        for tick in ["first", "second", "third"] {
            queue.push(1.0, tick);
        }
        queue.push(0.5, "earlier");

        let order: Vec<_> = drain(&mut queue).into_iter().map(|(_, v)| v).collect();
        assert_eq!(order, vec!["earlier", "first", "second", "third"]);
    }

    #[test]
    fn cancelled_plans_are_skipped() {
        let mut queue = PlanQueue::new();
        let cancelled = queue.push(1.0, 1);
        queue.push(2.0, 2);
        assert!(queue.cancel(cancelled));
        assert!(!queue.cancel(cancelled));
        assert_eq!(queue.len(), 1);

        assert_eq!(drain(&mut queue), vec![(2.0, 2)]);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut queue = PlanQueue::new();
        let id = queue.push(1.0, ());
        queue.clear();
        assert!(queue.is_empty());
        assert!(!queue.cancel(id));
        assert!(queue.pop().is_none());
    }
}
