//! Fixed-capacity ring buffer that overwrites its oldest element when full.
//!
//! Storage is allocated once up front. Logical index 0 is always the oldest
//! element currently held and `len() - 1` the most recent; the VWAP
//! aggregator relies on this to find the element a push is about to evict.
//!
//! # Layout
//!
//! ```text
//! capacity = 4, after pushing a, b, c, d, e:
//!
//!   slots: [ e | b | c | d ]
//!                ^ start (logical 0)
//! ```
//!
//! Not internally synchronized — a window has exactly one writer.

use crate::error::WindowError;

#[derive(Debug, Clone)]
pub struct CircularWindow<T> {
    slots: Vec<T>,
    capacity: usize,
    /// Physical slot of the oldest element.
    start: usize,
}

impl<T> CircularWindow<T> {
    /// Create an empty window. A capacity of 0 yields a window that discards
    /// every push.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            start: 0,
        }
    }

    /// Append `value`, evicting the oldest element if the window is full.
    #[inline]
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }

        if self.slots.len() < self.capacity {
            self.slots.push(value);
            return;
        }

        self.slots[self.start] = value;
        self.start = (self.start + 1) % self.capacity;
    }

    /// The `index`-th oldest element held.
    #[inline]
    pub fn at(&self, index: usize) -> Result<&T, WindowError> {
        let len = self.slots.len();
        if index >= len {
            return Err(WindowError::OutOfRange { index, len });
        }
        Ok(&self.slots[(self.start + index) % self.capacity])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the next push will evict the oldest element.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.slots.len() == self.capacity
    }

    /// Iterate from oldest to most recent.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (wrapped, head) = self.slots.split_at(self.start);
        head.iter().chain(wrapped.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_then_wraps() {
        let mut w = CircularWindow::new(3);
        for i in 0..3 {
            w.push(i);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(*w.at(0).unwrap(), 0);
        assert_eq!(*w.at(2).unwrap(), 2);

        w.push(3);
        w.push(4);
        assert_eq!(w.len(), 3);
        assert_eq!(w.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(*w.at(0).unwrap(), 2);
        assert_eq!(*w.at(2).unwrap(), 4);
    }

    #[test]
    fn len_is_min_of_pushes_and_capacity() {
        for cap in 1..6usize {
            let mut w = CircularWindow::new(cap);
            for n in 1..20usize {
                w.push(n);
                assert_eq!(w.len(), n.min(cap));
                assert_eq!(w.capacity(), cap);
                // oldest held and most recent
                assert_eq!(*w.at(0).unwrap(), n.saturating_sub(cap) + 1);
                assert_eq!(*w.at(w.len() - 1).unwrap(), n);
            }
        }
    }

    #[test]
    fn zero_capacity_discards_everything() {
        let mut w = CircularWindow::new(0);
        for i in 0..10 {
            w.push(i);
        }
        assert_eq!(w.len(), 0);
        assert!(w.is_empty());
        assert!(!w.is_full());
        assert_eq!(w.at(0), Err(WindowError::OutOfRange { index: 0, len: 0 }));
        assert!(w.at(usize::MAX).is_err());
        assert_eq!(w.iter().count(), 0);
    }

    #[test]
    fn out_of_range_past_len() {
        let mut w = CircularWindow::new(4);
        w.push('a');
        w.push('b');
        assert_eq!(w.at(2), Err(WindowError::OutOfRange { index: 2, len: 2 }));
        assert!(!w.is_full());
    }

    #[test]
    fn capacity_one_keeps_latest() {
        let mut w = CircularWindow::new(1);
        w.push("x");
        assert!(w.is_full());
        w.push("y");
        assert_eq!(w.len(), 1);
        assert_eq!(*w.at(0).unwrap(), "y");
    }
}
