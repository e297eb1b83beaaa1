//! Ordered-completion buffer.
//!
//! Commands on one connection are numbered in arrival order and their
//! handlers may finish in any order. Completions are parked here until every
//! earlier sequence number has completed, then released together:
//!
//! ```text
//!   complete(2, c)  ->  []            pending {2}
//!   complete(0, a)  ->  [a]           pending {2}
//!   complete(1, b)  ->  [b, c]        pending {}
//! ```

use std::collections::BTreeMap;

/// Buffer that releases completions strictly in sequence order.
#[derive(Debug)]
pub struct OrderedReplies<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Default for OrderedReplies<T> {
    fn default() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }
}

impl<T> OrderedReplies<T> {
    /// Create a buffer expecting sequence 0 first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the completion of `seq` and return every completion that is
    /// now ready, in order.
    ///
    /// A sequence number that was already released is ignored.
    pub fn complete(&mut self, seq: u64, value: T) -> Vec<T> {
        if seq < self.next {
            return Vec::new();
        }
        self.pending.insert(seq, value);

        let mut ready = Vec::new();
        while let Some(value) = self.pending.remove(&self.next) {
            ready.push(value);
            self.next += 1;
        }
        ready
    }

    /// Next sequence number to be released.
    pub fn next_sequence(&self) -> u64 {
        self.next
    }

    /// Number of completions parked behind a gap.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_passes_through() {
        let mut replies = OrderedReplies::new();
        assert_eq!(replies.complete(0, "a"), vec!["a"]);
        assert_eq!(replies.complete(1, "b"), vec!["b"]);
        assert!(replies.is_empty());
    }

    #[test]
    fn test_out_of_order_is_buffered() {
        let mut replies = OrderedReplies::new();
        assert!(replies.complete(2, "c").is_empty());
        assert!(replies.complete(1, "b").is_empty());
        assert_eq!(replies.pending(), 2);

        assert_eq!(replies.complete(0, "a"), vec!["a", "b", "c"]);
        assert_eq!(replies.next_sequence(), 3);
        assert!(replies.is_empty());
    }

    #[test]
    fn test_released_sequence_ignored() {
        let mut replies = OrderedReplies::new();
        assert_eq!(replies.complete(0, 1), vec![1]);
        assert!(replies.complete(0, 2).is_empty());
        assert_eq!(replies.next_sequence(), 1);
    }
}
