//! FIFO queue with removal of an arbitrary element.

use std::collections::VecDeque;

/// First-in first-out queue.
///
/// `offer`/`poll` are O(1); `remove_where` scans from the head and removes
/// the first element the predicate accepts in O(n).
#[derive(Debug)]
pub struct FifoQueue<E> {
    items: VecDeque<E>,
}

impl<E> Default for FifoQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FifoQueue<E> {
    pub fn new() -> Self {
        Self { items: VecDeque::new() }
    }

    /// Append to the tail.
    pub fn offer(&mut self, item: E) {
        self.items.push_back(item);
    }

    /// Remove and return the head.
    pub fn poll(&mut self) -> Option<E> {
        self.items.pop_front()
    }

    /// Remove the first element matching `pred`, preserving the order of the rest.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&E) -> bool) -> Option<E> {
        let index = self.items.iter().position(|item| pred(item))?;
        self.items.remove(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.items.iter()
    }
}
