use crate::core::event::{EventKind, EventRecord};
use crate::core::pel::{Pel, DEFAULT_PEL_CAPACITY};
use crate::error::{Error, Result};
use ordered_float::OrderedFloat;
use std::str::FromStr;

/// Sorter variants understood by the factory. The configuration layer hands
/// these over as opaque strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SorterKind {
    /// Complete-binary-tree tournament over the per-particle lists.
    Cbt,
}

impl FromStr for SorterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CBT" => Ok(SorterKind::Cbt),
            other => Err(Error::UnknownVariant(other.to_string())),
        }
    }
}

/// Stream index reserved for non-particle streams in the tournament tree
/// padding. Compares worse than any real stream.
const NO_STREAM: u32 = u32::MAX;

/// Global event sorter: a complete-binary-tree (tournament) index over one
/// per-particle event list per stream, ordered by each list's head.
///
/// The scheduler sizes the sorter one stream past the particle count and
/// keeps that last stream for SYSTEM events.
///
/// Times are stored relative to the sorter's epoch with a running `bias`:
/// `stream(dt)` only advances the bias, so no entry is rewritten when the
/// clock moves. An event pushed with time-to-event `dt` is stored as
/// `dt + bias` and reported back as `stored - bias`.
///
/// Ordering across streams is `(head time, stream id)`; an empty list ranks
/// as +infinity. Within a list the `EventRecord` order key breaks ties on
/// kind rank, so the combined order is the documented
/// `(time, primary, kind)` total order.
#[derive(Debug, Clone)]
pub struct CbtSorter {
    pels: Vec<Pel>,
    /// Tournament tree; `tree[1]` is the winning stream, leaves start at
    /// `leaf_base`.
    tree: Vec<u32>,
    leaf_base: usize,
    bias: f64,
    pel_cap: usize,
    dirty: Vec<u32>,
    dirty_flag: Vec<bool>,
}

impl CbtSorter {
    /// An empty sorter for `n` streams with the default list capacity.
    pub fn new(n: usize) -> Self {
        Self::with_pel_capacity(n, DEFAULT_PEL_CAPACITY)
    }

    /// An empty sorter whose per-particle lists hold at most `pel_cap`
    /// events each.
    pub fn with_pel_capacity(n: usize, pel_cap: usize) -> Self {
        let mut sorter = Self {
            pels: Vec::new(),
            tree: Vec::new(),
            leaf_base: 1,
            bias: 0.0,
            pel_cap: pel_cap.max(1),
            dirty: Vec::new(),
            dirty_flag: Vec::new(),
        };
        sorter.resize(n);
        sorter
    }

    /// Number of streams.
    #[inline]
    pub fn len(&self) -> usize {
        self.pels.len()
    }

    /// True when the sorter has no streams at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pels.is_empty()
    }

    /// Resize to `n` streams, dropping every pending event.
    pub fn resize(&mut self, n: usize) {
        let cap = self.pel_cap;
        self.pels.clear();
        self.pels.resize_with(n, || Pel::new(cap));
        self.leaf_base = n.next_power_of_two().max(1);
        self.tree = vec![NO_STREAM; 2 * self.leaf_base];
        self.dirty.clear();
        self.dirty_flag = vec![false; n];
        self.bias = 0.0;
        self.init();
    }

    /// Drop every pending event and reset the epoch, keeping the stream
    /// count.
    pub fn clear(&mut self) {
        for pel in &mut self.pels {
            pel.clear();
        }
        self.dirty.clear();
        self.dirty_flag.iter_mut().for_each(|d| *d = false);
        self.bias = 0.0;
        self.init();
    }

    /// Rebuild the whole tournament from the current list heads.
    pub fn init(&mut self) {
        for (i, slot) in self.tree[self.leaf_base..].iter_mut().enumerate() {
            *slot = if i < self.pels.len() { i as u32 } else { NO_STREAM };
        }
        for node in (1..self.leaf_base).rev() {
            let w = self.winner(self.tree[2 * node], self.tree[2 * node + 1]);
            self.tree[node] = w;
        }
        self.dirty.clear();
        self.dirty_flag.iter_mut().for_each(|d| *d = false);
    }

    /// Append `ev` to the list of stream `primary` and mark it dirty. The
    /// tournament is not touched until `update`/`sort`.
    pub fn push(&mut self, primary: u32, mut ev: EventRecord) {
        ev.primary = primary;
        ev.dt += self.bias;
        self.pels[primary as usize].push(ev);
        self.mark_dirty(primary);
    }

    /// Re-establish stream `primary`'s position in the tournament from its
    /// current list head.
    pub fn update(&mut self, primary: u32) {
        let p = primary as usize;
        // A saturated list that drained empty gets a recovery sentinel at
        // the earliest displaced time instead of ranking +inf: the
        // displaced events must be re-predicted, not forgotten.
        if self.pels[p].is_empty() {
            if let Some(t) = self.pels[p].take_overflow() {
                let mut sentinel = EventRecord::sentinel(0.0, primary);
                sentinel.dt = t.max(self.bias);
                self.pels[p].push(sentinel);
            }
        }
        self.dirty_flag[p] = false;
        let mut node = self.leaf_base + p;
        while node > 1 {
            node /= 2;
            let w = self.winner(self.tree[2 * node], self.tree[2 * node + 1]);
            self.tree[node] = w;
        }
    }

    /// Apply every outstanding update. Afterwards the root reflects the
    /// minimum head across all lists.
    pub fn sort(&mut self) {
        while let Some(p) = self.dirty.pop() {
            if self.dirty_flag[p as usize] {
                self.update(p);
            }
        }
    }

    /// Stream id currently winning the tournament.
    #[inline]
    pub fn next_id(&self) -> u32 {
        self.tree[1]
    }

    /// True when the winning stream has no pending events.
    pub fn next_pel_empty(&self) -> bool {
        match self.tree[1] {
            NO_STREAM => true,
            id => self.pels[id as usize].is_empty(),
        }
    }

    /// Time to the next event (relative to the simulation clock).
    pub fn next_dt(&self) -> f64 {
        self.head(self.tree[1]).map_or(f64::INFINITY, |ev| ev.dt - self.bias)
    }

    /// Kind of the next event. `EventKind::None` when every list is empty.
    pub fn next_kind(&self) -> EventKind {
        self.head(self.tree[1]).map_or(EventKind::None, |ev| ev.kind)
    }

    /// Secondary id of the next event.
    pub fn next_p2(&self) -> u32 {
        self.head(self.tree[1]).map_or(0, |ev| ev.secondary)
    }

    /// Counter stamp of the next event.
    pub fn next_stamp(&self) -> u64 {
        self.head(self.tree[1]).map_or(0, |ev| ev.stamp)
    }

    /// A full description of the next event for error reporting.
    pub fn next_summary(&self, sys_time: f64) -> crate::core::event::EventSummary {
        match self.head(self.tree[1]) {
            Some(ev) => {
                let mut rebased = *ev;
                rebased.dt -= self.bias;
                rebased.summary(sys_time)
            }
            None => EventRecord::none(self.tree[1]).summary(sys_time),
        }
    }

    /// Remove the head event of the winning stream without updating the
    /// tournament; callers re-`update` explicitly.
    pub fn pop_next_event(&mut self) -> Option<EventRecord> {
        let id = self.tree[1];
        if id == NO_STREAM {
            return None;
        }
        self.pels[id as usize].pop().map(|mut ev| {
            ev.dt -= self.bias;
            ev
        })
    }

    /// Empty one stream's list (its tournament position is refreshed on the
    /// caller's next `update`/`sort`).
    pub fn clear_pel(&mut self, primary: u32) {
        self.pels[primary as usize].clear();
        self.mark_dirty(primary);
    }

    /// Shift the epoch: every stored event time moves `dt` closer without
    /// touching any entry.
    pub fn stream(&mut self, dt: f64) {
        self.bias += dt;
    }

    /// Multiply every pending event time (relative to the clock) by
    /// `factor`. Never called during a dispatch.
    pub fn rescale_times(&mut self, factor: f64) {
        for pel in &mut self.pels {
            pel.map_times(|t| t * factor);
        }
        self.bias *= factor;
        self.init();
    }

    /// Read access to one stream's event list.
    pub fn pel(&self, primary: u32) -> &Pel {
        &self.pels[primary as usize]
    }

    /// Current epoch bias (time already streamed past stored entries).
    pub fn bias(&self) -> f64 {
        self.bias
    }

    fn head(&self, id: u32) -> Option<&EventRecord> {
        if id == NO_STREAM {
            return None;
        }
        self.pels[id as usize].peek()
    }

    fn mark_dirty(&mut self, primary: u32) {
        let p = primary as usize;
        if !self.dirty_flag[p] {
            self.dirty_flag[p] = true;
            self.dirty.push(primary);
        }
    }

    /// Tournament comparison: earlier head wins, ties go to the lower
    /// stream id, absent streams lose to everything.
    fn winner(&self, a: u32, b: u32) -> u32 {
        let key = |id: u32| match self.head(id) {
            Some(ev) => (OrderedFloat(ev.dt), id),
            None => (OrderedFloat(f64::INFINITY), id),
        };
        if key(a) <= key(b) {
            a
        } else {
            b
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorter(n: usize) -> CbtSorter {
        CbtSorter::new(n)
    }

    #[test]
    fn sorter_kind_factory() {
        assert_eq!("CBT".parse::<SorterKind>().unwrap(), SorterKind::Cbt);
        assert!("Fancy".parse::<SorterKind>().is_err());
    }

    #[test]
    fn root_tracks_minimum_head() {
        let mut s = sorter(4);
        s.push(2, EventRecord::local(3.0, 2, 0));
        s.push(0, EventRecord::local(1.0, 0, 0));
        s.push(3, EventRecord::local(2.0, 3, 0));
        s.sort();
        assert_eq!(s.next_id(), 0);
        assert!((s.next_dt() - 1.0).abs() < 1e-15);

        s.pop_next_event();
        s.update(0);
        s.sort();
        assert_eq!(s.next_id(), 3);
    }

    #[test]
    fn empty_streams_rank_infinite() {
        let mut s = sorter(3);
        s.sort();
        assert!(s.next_dt().is_infinite());
        assert!(s.next_pel_empty());
        s.push(1, EventRecord::local(0.5, 1, 0));
        s.sort();
        assert_eq!(s.next_id(), 1);
        assert!(!s.next_pel_empty());
    }

    #[test]
    fn ties_break_on_stream_id() {
        let mut s = sorter(4);
        s.push(3, EventRecord::local(1.0, 3, 0));
        s.push(1, EventRecord::local(1.0, 1, 0));
        s.sort();
        assert_eq!(s.next_id(), 1);
    }

    #[test]
    fn stream_shifts_reported_times_without_reordering() {
        let mut s = sorter(2);
        s.push(0, EventRecord::local(1.0, 0, 0));
        s.push(1, EventRecord::local(2.0, 1, 0));
        s.sort();
        s.stream(0.75);
        assert!((s.next_dt() - 0.25).abs() < 1e-15);

        // Events pushed after streaming are rebased onto the same epoch.
        s.push(0, EventRecord::local(0.1, 0, 0));
        s.sort();
        assert!((s.next_dt() - 0.1).abs() < 1e-15);
    }

    #[test]
    fn rescale_scales_pending_times() {
        let mut s = sorter(2);
        s.push(0, EventRecord::local(1.0, 0, 0));
        s.push(1, EventRecord::local(4.0, 1, 0));
        s.sort();
        s.stream(0.5);
        s.rescale_times(2.0);
        assert!((s.next_dt() - 1.0).abs() < 1e-12);

        s.pop_next_event();
        s.update(0);
        s.sort();
        assert!((s.next_dt() - 7.0).abs() < 1e-12);
    }

    #[test]
    fn clear_pel_marks_stream_dirty() {
        let mut s = sorter(2);
        s.push(0, EventRecord::local(1.0, 0, 0));
        s.push(1, EventRecord::local(2.0, 1, 0));
        s.sort();
        assert_eq!(s.next_id(), 0);
        s.clear_pel(0);
        s.sort();
        assert_eq!(s.next_id(), 1);
    }

    #[test]
    fn saturated_stream_recovers_with_a_sentinel() {
        let mut s = CbtSorter::with_pel_capacity(1, 1);
        s.push(0, EventRecord::local(1.0, 0, 0));
        s.push(0, EventRecord::local(2.0, 0, 1));
        s.sort();
        s.pop_next_event();
        s.update(0);
        s.sort();
        // The displaced dt=2.0 event is represented by a sentinel at its time.
        assert_eq!(s.next_kind(), EventKind::Virtual);
        assert!((s.next_dt() - 2.0).abs() < 1e-15);
    }

    #[test]
    fn resize_supports_non_power_of_two_counts() {
        for n in [1usize, 3, 5, 6, 7, 9] {
            let mut s = sorter(n);
            for i in 0..n {
                s.push(i as u32, EventRecord::local(n as f64 - i as f64, i as u32, 0));
            }
            s.sort();
            assert_eq!(s.next_id() as usize, n - 1, "n={n}");
        }
    }
}
