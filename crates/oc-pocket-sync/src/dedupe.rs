//! Bounded window of recently seen event ids.

use std::collections::{HashSet, VecDeque};

/// Remembers the last `capacity` ids, evicting the oldest first.
#[derive(Debug)]
pub struct DedupeWindow {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DedupeWindow {
    /// Create a window holding at least one id.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Record `id`. Returns false if it is already inside the window.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_rejected_inside_window() {
        let mut window = DedupeWindow::new(4);
        assert!(window.insert("e1"));
        assert!(!window.insert("e1"));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let mut window = DedupeWindow::new(2);
        assert!(window.insert("e1"));
        assert!(window.insert("e2"));
        assert!(window.insert("e3"));

        assert!(!window.contains("e1"));
        assert!(window.contains("e2"));
        assert_eq!(window.len(), 2);
        // Evicted ids are accepted again.
        assert!(window.insert("e1"));
    }

    #[test]
    fn test_zero_capacity_still_dedupes_last() {
        let mut window = DedupeWindow::new(0);
        assert!(window.insert("e1"));
        assert!(!window.insert("e1"));
    }
}
