//! Double-ended ordered queue.
//!
//! Backs the batch scheduler's FIFO of pending batches. All mutating
//! operations are amortized O(1); iteration preserves insertion order.
//! Removing or peeking on an empty queue is a caller bug and is reported as
//! [`QueueError::Empty`] rather than a value that could pass for an element.

use std::collections::VecDeque;

use crate::error::QueueError;

/// Ordered queue with append/remove at both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for OrderedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append to the back.
    pub fn push_back(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Append to the front.
    pub fn push_front(&mut self, item: T) {
        self.items.push_front(item);
    }

    /// Remove and return the front element.
    pub fn pop_front(&mut self) -> Result<T, QueueError> {
        self.items.pop_front().ok_or(QueueError::Empty)
    }

    /// Remove and return the back element.
    pub fn pop_back(&mut self) -> Result<T, QueueError> {
        self.items.pop_back().ok_or(QueueError::Empty)
    }

    pub fn front(&self) -> Result<&T, QueueError> {
        self.items.front().ok_or(QueueError::Empty)
    }

    pub fn back(&self) -> Result<&T, QueueError> {
        self.items.back().ok_or(QueueError::Empty)
    }

    pub fn front_mut(&mut self) -> Result<&mut T, QueueError> {
        self.items.front_mut().ok_or(QueueError::Empty)
    }

    pub fn back_mut(&mut self) -> Result<&mut T, QueueError> {
        self.items.back_mut().ok_or(QueueError::Empty)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate front to back.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Copy the elements, front to back, into a `Vec`.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a OrderedQueue<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for OrderedQueue<T> {
    type Item = T;
    type IntoIter = std::collections::vec_deque::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T> FromIterator<T> for OrderedQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> Extend<T> for OrderedQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}
