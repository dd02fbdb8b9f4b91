//! Bounded per-entity history and the rules that reduce it to one value.

use std::collections::VecDeque;

use hpcwatch_types::{Placeholder, Sample, StatusReading};

/// A value type that knows how to reduce a window of its own readings.
pub trait Mergeable: Placeholder + Clone {
    /// Reduce readings, given newest first, to the display value.
    ///
    /// Must be deterministic: the same window always yields the same value.
    fn merge<'a, I>(newest_first: I) -> Self
    where
        I: Iterator<Item = &'a Self>,
        Self: 'a;
}

/// Health status: the most severe known reading wins. Unknown readings are
/// skipped; on equal severity the newest reading is kept.
impl Mergeable for StatusReading {
    fn merge<'a, I>(newest_first: I) -> Self
    where
        I: Iterator<Item = &'a Self>,
    {
        newest_first
            .filter(|r| r.status.is_known())
            .fold(None::<&StatusReading>, |best, r| match best {
                Some(b) if !r.status.outranks(b.status) => Some(b),
                _ => Some(r),
            })
            .copied()
            .unwrap_or_else(StatusReading::placeholder)
    }
}

/// Power: the newest nonzero reading wins, else zero.
impl Mergeable for u64 {
    fn merge<'a, I>(newest_first: I) -> Self
    where
        I: Iterator<Item = &'a Self>,
    {
        newest_first.copied().find(|w| *w > 0).unwrap_or(0)
    }
}

/// The last `capacity` samples of one entity, newest first.
#[derive(Debug, Clone)]
pub struct HistoryWindow<V> {
    capacity: usize,
    samples: VecDeque<Sample<V>>,
}

impl<V> HistoryWindow<V> {
    /// Create an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Push a sample to the front, evicting the oldest past capacity.
    pub fn push(&mut self, sample: Sample<V>) {
        self.samples.push_front(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_back();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample<V>> {
        self.samples.iter()
    }

    pub fn newest(&self) -> Option<&Sample<V>> {
        self.samples.front()
    }
}

impl<V: Mergeable> HistoryWindow<V> {
    /// Reduce the window to its display value.
    pub fn merge(&self) -> V {
        V::merge(self.samples.iter().map(|s| &s.value))
    }
}
