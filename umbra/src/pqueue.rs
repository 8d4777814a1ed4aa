//! A bounded, array-backed binary heap parameterized over its element type
//! and a caller-supplied comparator. The event scheduler is the only consumer
//! inside this crate, but the structure is generic because nothing about it
//! is event-specific.

use heapless::Vec as InlineVec;

use crate::error::{Error, Result};

/// The ordering function for a [`Pqueue`]. Returns `true` when the first
/// element is *lower* priority than the second. Supplying `|a, b| a > b`
/// therefore yields a min-heap.
pub type Comparator<T> = fn(&T, &T) -> bool;

/// A fixed-capacity priority queue.
///
/// Invariant: after every public operation returns, no parent is lower
/// priority than either of its children, i.e. `comparator(data[p], data[i])`
/// is false for every non-root index `i` with parent `p`.
///
/// Overflow and underflow are reported as [`Error`]s rather than silently
/// dropped or treated as undefined behavior.
#[derive(Debug, Clone)]
pub struct Pqueue<T, const N: usize> {
    data: InlineVec<T, N>,
    comparator: Comparator<T>,
}

impl<T, const N: usize> Pqueue<T, N> {
    pub fn new(comparator: Comparator<T>) -> Self {
        Self {
            data: InlineVec::new(),
            comparator,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == N
    }

    /// Inserts an element and sifts it up to its place in the heap. Fails
    /// with [`Error::CapacityExceeded`] when the queue is full, without
    /// mutating the queue.
    pub fn push(&mut self, element: T) -> Result<()> {
        self.data
            .push(element)
            .map_err(|_| Error::CapacityExceeded)?;
        let mut curr = self.data.len() - 1;
        while curr > 0 {
            let parent = (curr - 1) / 2;
            if !(self.comparator)(&self.data[parent], &self.data[curr]) {
                break;
            }
            self.data.swap(parent, curr);
            curr = parent;
        }
        Ok(())
    }

    /// Returns the highest-priority element without removing it.
    pub fn front(&self) -> Result<&T> {
        self.data.first().ok_or(Error::EmptyContainer)
    }

    /// Removes and returns the highest-priority element, restoring the heap
    /// by moving the last element to the root and sifting it down through the
    /// higher-priority child at each level.
    pub fn pop(&mut self) -> Result<T> {
        if self.data.is_empty() {
            return Err(Error::EmptyContainer);
        }
        let last = self.data.len() - 1;
        self.data.swap(0, last);
        // Infallible: the queue was just observed to be non-empty.
        let front = self.data.pop().ok_or(Error::EmptyContainer)?;
        let mut curr = 0;
        loop {
            let next = self.pick_priority(curr);
            if next == curr {
                break;
            }
            self.data.swap(curr, next);
            curr = next;
        }
        Ok(front)
    }

    /// Of `root` and its children, returns the index of the highest-priority
    /// element.
    fn pick_priority(&self, root: usize) -> usize {
        let mut winner = root;
        let left = root * 2 + 1;
        let right = left + 1;
        if left < self.data.len() && (self.comparator)(&self.data[winner], &self.data[left]) {
            winner = left;
        }
        if right < self.data.len() && (self.comparator)(&self.data[winner], &self.data[right]) {
            winner = right;
        }
        winner
    }

    /// Grants mutable access to the backing storage. Callers must apply only
    /// order-preserving transforms (the scheduler's timestamp rebase shifts
    /// every element by the same offset), otherwise the heap invariant is
    /// lost.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_heap() -> Pqueue<u32, 5> {
        Pqueue::new(|a, b| a > b)
    }

    #[test]
    fn empty_queue_reports_underflow() {
        let mut pq = min_heap();
        assert!(pq.is_empty());
        assert_eq!(pq.front(), Err(Error::EmptyContainer));
        assert_eq!(pq.pop(), Err(Error::EmptyContainer));
    }

    #[test]
    fn full_queue_reports_overflow_without_mutating() {
        let mut pq = min_heap();
        for x in [5, 2, 8, 4, 6] {
            pq.push(x).unwrap();
        }
        assert!(pq.is_full());
        assert_eq!(pq.push(10), Err(Error::CapacityExceeded));
        assert_eq!(pq.len(), 5);
        assert_eq!(pq.front(), Ok(&2));
    }

    #[test]
    fn pops_in_priority_order() {
        let mut pq = min_heap();
        for x in [5, 2, 8, 4, 6] {
            pq.push(x).unwrap();
        }
        assert_eq!(pq.pop(), Ok(2));
        assert_eq!(pq.pop(), Ok(4));
        // Interleave pushes with pops like a real scheduling workload.
        pq.push(1).unwrap();
        pq.push(10).unwrap();
        assert_eq!(pq.front(), Ok(&1));
        for expected in [1, 5, 6, 8, 10] {
            assert_eq!(pq.pop(), Ok(expected));
        }
        assert_eq!(pq.pop(), Err(Error::EmptyContainer));
    }

    #[test]
    fn heap_invariant_holds_after_every_op() {
        let mut pq: Pqueue<u32, 5> = Pqueue::new(|a, b| a > b);
        let check = |pq: &Pqueue<u32, 5>| {
            for i in 1..pq.data.len() {
                let p = (i - 1) / 2;
                assert!(pq.data[p] <= pq.data[i], "heap broken: {:?}", pq.data);
            }
        };
        for x in [9, 3, 7, 1, 5] {
            pq.push(x).unwrap();
            check(&pq);
        }
        while !pq.is_empty() {
            pq.pop().unwrap();
            check(&pq);
        }
    }

    #[test]
    fn max_heap_via_inverted_comparator() {
        let mut pq: Pqueue<u32, 5> = Pqueue::new(|a, b| a < b);
        for x in [5, 2, 8] {
            pq.push(x).unwrap();
        }
        assert_eq!(pq.pop(), Ok(8));
        assert_eq!(pq.pop(), Ok(5));
        assert_eq!(pq.pop(), Ok(2));
    }
}
