use crate::core::event::EventRecord;

/// Default number of pending events a particle may hold.
pub const DEFAULT_PEL_CAPACITY: usize = 32;

/// Per-particle event list: a bounded binary min-heap of `EventRecord`s for
/// which this particle is the primary.
///
/// Ordering is purely `EventRecord::order_key` (time, kind rank, secondary,
/// stamp); counter stamps are opaque here and stale entries are removed
/// lazily by the dispatch loop, never by the list itself.
///
/// The list is bounded: pushing into a full list displaces the worst
/// (latest) entry and records the earliest displaced time. The sorter uses
/// that mark to plant a VIRTUAL recovery sentinel once the list drains, so
/// a displaced event is re-predicted near its original time rather than
/// lost.
#[derive(Debug, Clone)]
pub struct Pel {
    entries: Vec<EventRecord>,
    cap: usize,
    /// Earliest stored time among finite events displaced since the last
    /// `clear`.
    overflow: Option<f64>,
}

impl Pel {
    /// Create an empty list holding at most `cap` events (`cap >= 1`).
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap.max(1).min(DEFAULT_PEL_CAPACITY)),
            cap: cap.max(1),
            overflow: None,
        }
    }

    /// Number of pending events.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no events are pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest pending event, if any.
    #[inline]
    pub fn peek(&self) -> Option<&EventRecord> {
        self.entries.first()
    }

    /// Insert an event, keeping the heap ordered. At capacity the worst of
    /// (current entries + `ev`) is dropped and, when the drop loses a real
    /// event, its time is recorded for recovery.
    pub fn push(&mut self, ev: EventRecord) {
        if self.entries.len() < self.cap {
            self.entries.push(ev);
            self.sift_up(self.entries.len() - 1);
            return;
        }
        // The maximum of a min-heap lives in a leaf.
        let first_leaf = self.entries.len() / 2;
        let worst = self.entries[first_leaf..]
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| e.order_key())
            .map(|(i, _)| first_leaf + i)
            .unwrap_or(0);
        let dropped = if ev.order_key() < self.entries[worst].order_key() {
            let dropped = self.entries[worst];
            self.entries[worst] = ev;
            self.sift_up(worst);
            dropped
        } else {
            ev
        };
        if dropped.dt.is_finite() {
            let t = match self.overflow {
                Some(prev) => prev.min(dropped.dt),
                None => dropped.dt,
            };
            self.overflow = Some(t);
        }
    }

    /// Remove and return the earliest pending event.
    pub fn pop(&mut self) -> Option<EventRecord> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let out = self.entries.pop();
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        out
    }

    /// Drop every pending event and forget any displaced-event mark.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.overflow = None;
    }

    /// True if a real event was displaced since the last `clear`.
    #[inline]
    pub fn saturated(&self) -> bool {
        self.overflow.is_some()
    }

    /// Read and reset the earliest displaced-event time.
    pub fn take_overflow(&mut self) -> Option<f64> {
        self.overflow.take()
    }

    /// Iterate over pending events in heap (not time) order.
    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.entries.iter()
    }

    /// Apply `f` to the stored time of every entry and restore heap order.
    /// Used by the sorter's `rescale_times`.
    pub(crate) fn map_times(&mut self, f: impl Fn(f64) -> f64) {
        for ev in &mut self.entries {
            ev.dt = f(ev.dt);
        }
        // Monotone maps preserve the order, but re-heapify to stay safe
        // under sign-of-zero and overflow edge cases.
        let n = self.entries.len();
        for i in (0..n / 2).rev() {
            self.sift_down(i);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.entries[i].order_key() < self.entries[parent].order_key() {
                self.entries.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.entries.len();
        loop {
            let (l, r) = (2 * i + 1, 2 * i + 2);
            let mut smallest = i;
            if l < n && self.entries[l].order_key() < self.entries[smallest].order_key() {
                smallest = l;
            }
            if r < n && self.entries[r].order_key() < self.entries[smallest].order_key() {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.entries.swap(i, smallest);
            i = smallest;
        }
    }
}
