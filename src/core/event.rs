use ordered_float::OrderedFloat;
use std::fmt;

/// Kinds of events the dispatch loop understands.
///
/// The declaration order doubles as the tie-break rank when two events share
/// a time: `Interaction` runs before `Global`, and so on. `None` always
/// sorts last; reaching the root of the queue with it means the simulation
/// has no events left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    /// Two-particle interaction (collision, well crossing, ...).
    Interaction,
    /// Global source event (e.g. a neighbour-cell crossing).
    Global,
    /// Local source event (walls, fields).
    Local,
    /// System-wide timer (thermostat tick, scheduler maintainer).
    System,
    /// Sentinel forcing a re-prediction without physical consequence.
    Virtual,
    /// No event. Used by predictors to signal "never happens".
    None,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Interaction => "INTERACTION",
            EventKind::Global => "GLOBAL",
            EventKind::Local => "LOCAL",
            EventKind::System => "SYSTEM",
            EventKind::Virtual => "VIRTUAL",
            EventKind::None => "NONE",
        };
        f.write_str(name)
    }
}

/// A predicted event, as stored in a per-particle event list.
///
/// - `dt`: time until the event. Predictors produce it relative to the
///   current simulation clock; inside the sorter it is rebased onto the
///   sorter's epoch (see `CbtSorter`).
/// - `primary`: the particle that owns this record in its event list.
/// - `secondary`: the other participant. Partner particle for
///   `Interaction`, wall/field id for `Local`, global-source id for
///   `Global`, system-event id for `System`.
/// - `stamp`: for `Interaction`, the partner's event counter captured at
///   prediction time; the event is valid only while that counter has not
///   advanced. Zero for every other kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRecord {
    pub dt: f64,
    pub kind: EventKind,
    pub primary: u32,
    pub secondary: u32,
    pub stamp: u64,
}

impl EventRecord {
    /// Pair interaction between `primary` and `partner`, stamped with the
    /// partner's event counter.
    pub fn interaction(dt: f64, primary: u32, partner: u32, stamp: u64) -> Self {
        Self {
            dt,
            kind: EventKind::Interaction,
            primary,
            secondary: partner,
            stamp,
        }
    }

    /// Event against local source `local_id` (a wall, a field region).
    pub fn local(dt: f64, primary: u32, local_id: u32) -> Self {
        Self {
            dt,
            kind: EventKind::Local,
            primary,
            secondary: local_id,
            stamp: 0,
        }
    }

    /// Event against global source `global_id`.
    pub fn global(dt: f64, primary: u32, global_id: u32) -> Self {
        Self {
            dt,
            kind: EventKind::Global,
            primary,
            secondary: global_id,
            stamp: 0,
        }
    }

    /// System timer event `system_id`, owned by the sorter's system slot.
    pub fn system(dt: f64, slot: u32, system_id: u32) -> Self {
        Self {
            dt,
            kind: EventKind::System,
            primary: slot,
            secondary: system_id,
            stamp: 0,
        }
    }

    /// Sentinel that forces a re-prediction of `primary` at `dt`.
    pub fn sentinel(dt: f64, primary: u32) -> Self {
        Self {
            dt,
            kind: EventKind::Virtual,
            primary,
            secondary: 0,
            stamp: 0,
        }
    }

    /// The "never happens" record for `primary`.
    pub fn none(primary: u32) -> Self {
        Self {
            dt: f64::INFINITY,
            kind: EventKind::None,
            primary,
            secondary: 0,
            stamp: 0,
        }
    }

    /// Total order used inside a per-particle event list: time first, then
    /// kind rank, then the secondary id and stamp for stability. NaN times
    /// sort last so a broken prediction cannot shadow real events.
    #[inline]
    pub fn order_key(&self) -> (OrderedFloat<f64>, EventKind, u32, u64) {
        (OrderedFloat(self.dt), self.kind, self.secondary, self.stamp)
    }

    /// Short description used by fatal dispatch errors.
    pub fn summary(&self, sys_time: f64) -> EventSummary {
        EventSummary {
            time: sys_time + self.dt,
            dt: self.dt,
            kind: self.kind,
            primary: self.primary,
            secondary: self.secondary,
        }
    }
}

/// Full description of an event, attached to fatal scheduler errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSummary {
    /// Absolute event time.
    pub time: f64,
    /// Time to the event from the clock value at which it failed.
    pub dt: f64,
    pub kind: EventKind,
    pub primary: u32,
    pub secondary: u32,
}

impl fmt::Display for EventSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time={} dt={} kind={} primary={} secondary={}",
            self.time, self.dt, self.kind, self.primary, self.secondary
        )
    }
}
