use crate::core::event::{EventKind, EventRecord};
use crate::core::model::{Model, NeighbourSource, Updated};
use crate::core::pel::DEFAULT_PEL_CAPACITY;
use crate::core::sorter::CbtSorter;
use crate::core::world::World;
use crate::error::{Error, Result};
use log::{debug, info};
use std::fmt;
use std::str::FromStr;

/// How many consecutive times a recomputed event may land after the next
/// queued event before the scheduler gives up and runs it anyway.
const REJECTION_LIMIT: u32 = 10;

/// Per-particle invalidation stamps.
///
/// `counter[i]` advances whenever particle `i` is invalidated; any queued
/// interaction that captured an older value of `counter[i]` for its partner
/// is dead and gets skipped at dispatch. Counters never decrease.
#[derive(Debug, Clone, Default)]
pub struct EventCounters {
    counts: Vec<u64>,
}

impl EventCounters {
    /// Grow or shrink to `n` particles, preserving surviving stamps.
    pub fn resize(&mut self, n: usize) {
        self.counts.resize(n, 0);
    }

    #[inline]
    pub fn get(&self, p: u32) -> u64 {
        self.counts[p as usize]
    }

    #[inline]
    pub fn bump(&mut self, p: u32) {
        self.counts[p as usize] += 1;
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Executed-event statistics plus the silent bookkeeping counts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventTally {
    pub interactions: u64,
    pub locals: u64,
    pub globals: u64,
    pub systems: u64,
    pub virtuals: u64,
    /// Lazily-invalidated interactions skipped at dispatch.
    pub stale_skips: u64,
    /// Recoverable re-predictions (numerical reorders, vanished events).
    pub repredictions: u64,
    /// Free-streamed time absorbed into executed events.
    pub freestream_time: f64,
}

impl EventTally {
    /// Total number of executed events.
    pub fn executed(&self) -> u64 {
        self.interactions + self.locals + self.globals + self.systems + self.virtuals
    }
}

/// Scheduler variants understood by the factory (§ configuration strings).
///
/// All variants share the dispatch contract; they differ only in how
/// interaction partners are enumerated when (re)predicting a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    /// Every particle is a candidate partner (O(N^2) prediction).
    Dumb,
    /// Partners come from an injected neighbour source.
    NeighbourList,
    /// Only system timers are scheduled; no particle events at all.
    SystemOnly,
    /// Mixed-range variant; enumerates through the neighbour source.
    Complex,
    /// Sequential protocol of the neighbour-list variant.
    ThreadedNeighbourList,
}

impl SchedulerKind {
    fn needs_neighbour_source(self) -> bool {
        matches!(
            self,
            SchedulerKind::NeighbourList
                | SchedulerKind::Complex
                | SchedulerKind::ThreadedNeighbourList
        )
    }
}

impl FromStr for SchedulerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Dumb" => Ok(SchedulerKind::Dumb),
            "NeighbourList" => Ok(SchedulerKind::NeighbourList),
            "SystemOnly" => Ok(SchedulerKind::SystemOnly),
            "Complex" => Ok(SchedulerKind::Complex),
            "ThreadedNeighbourList" => Ok(SchedulerKind::ThreadedNeighbourList),
            other => Err(Error::UnknownVariant(other.to_string())),
        }
    }
}

/// Partner enumeration backing a scheduler variant.
enum PartnerStrategy {
    AllPairs,
    Neighbours(Box<dyn NeighbourSource>),
    SystemOnly,
}

impl fmt::Debug for PartnerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartnerStrategy::AllPairs => f.write_str("AllPairs"),
            PartnerStrategy::Neighbours(_) => f.write_str("Neighbours(..)"),
            PartnerStrategy::SystemOnly => f.write_str("SystemOnly"),
        }
    }
}

/// What a single turn of the dispatch loop did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    /// An event executed; the clock advanced by `dt`.
    Ran { kind: EventKind, dt: f64 },
    /// A recoverable numerical condition was resolved by re-prediction;
    /// the clock did not advance.
    Repredicted { kind: EventKind },
}

/// The event scheduler: builds predictions, keeps the global sorter
/// consistent, and runs the dispatch loop against the collaborating
/// predictor/executor.
///
/// Stream `N` of the sorter (one past the particles) holds SYSTEM events.
#[derive(Debug)]
pub struct Scheduler {
    sorter: CbtSorter,
    counters: EventCounters,
    strategy: PartnerStrategy,
    interaction_rejections: u32,
    local_rejections: u32,
    tally: EventTally,
}

impl Scheduler {
    /// Build a scheduler of the given variant. Variants that enumerate
    /// partners through a neighbour source require one.
    pub fn new(kind: SchedulerKind, source: Option<Box<dyn NeighbourSource>>) -> Result<Self> {
        Self::with_pel_capacity(kind, source, DEFAULT_PEL_CAPACITY)
    }

    /// As `new`, with an explicit per-particle event list capacity.
    pub fn with_pel_capacity(
        kind: SchedulerKind,
        source: Option<Box<dyn NeighbourSource>>,
        pel_capacity: usize,
    ) -> Result<Self> {
        let strategy = if kind.needs_neighbour_source() {
            match source {
                Some(src) => PartnerStrategy::Neighbours(src),
                None => {
                    return Err(Error::InvalidParam(format!(
                        "scheduler variant {kind:?} requires a neighbour source"
                    )))
                }
            }
        } else if kind == SchedulerKind::SystemOnly {
            PartnerStrategy::SystemOnly
        } else {
            PartnerStrategy::AllPairs
        };
        Ok(Self {
            sorter: CbtSorter::with_pel_capacity(1, pel_capacity),
            counters: EventCounters::default(),
            strategy,
            interaction_rejections: 0,
            local_rejections: 0,
            tally: EventTally::default(),
        })
    }

    /// Seed every particle's event list from scratch and arm the system
    /// timers. Also used to rebuild the queue after external state changes.
    pub fn initialise(&mut self, world: &mut World, model: &dyn Model) {
        let n = world.num_particles();
        info!("initialising event queues for {n} particles");
        self.sorter.resize(n + 1);
        self.counters.resize(n);
        self.interaction_rejections = 0;
        self.local_rejections = 0;
        for p in 0..n as u32 {
            self.add_events_filtered(world, model, p, true);
        }
        self.sorter.init();
        self.rebuild_system_events(world, model);
    }

    /// Predict and queue every event for particle `p` (steady state: every
    /// partner is considered; the sorter dispatches exactly one of any
    /// duplicated pair).
    pub fn add_events(&mut self, world: &mut World, model: &dyn Model, p: u32) {
        self.add_events_filtered(world, model, p, false);
    }

    fn add_events_filtered(&mut self, world: &mut World, model: &dyn Model, p: u32, init: bool) {
        if matches!(self.strategy, PartnerStrategy::SystemOnly) {
            return;
        }
        model.sync_particle(world, p);

        for gid in model.globals_for(world, p) {
            let ev = model.predict_global(world, p, gid);
            self.sorter.push(p, ev);
        }
        for lid in model.locals_for(world, p) {
            let ev = model.predict_local(world, p, lid);
            self.sorter.push(p, ev);
        }

        let partners: Vec<u32> = match &self.strategy {
            PartnerStrategy::AllPairs => (0..world.num_particles() as u32).collect(),
            PartnerStrategy::Neighbours(src) => src.partners(world, p),
            PartnerStrategy::SystemOnly => Vec::new(),
        };
        for q in partners {
            if q == p || q as usize >= world.num_particles() {
                continue;
            }
            if init && !init_pair_allowed(p, q) {
                continue;
            }
            model.sync_particle(world, q);
            let mut ev = model.predict_interaction(world, p, q);
            if ev.kind != EventKind::None {
                ev.stamp = self.counters.get(q);
                self.sorter.push(p, ev);
            }
        }
    }

    /// Drop every queued event owned by `p` and advance its counter,
    /// killing queued interactions that reference it from other lists.
    pub fn invalidate_events(&mut self, p: u32) {
        self.counters.bump(p);
        self.sorter.clear_pel(p);
    }

    /// Atomic re-prediction for one particle.
    pub fn full_update(&mut self, world: &mut World, model: &dyn Model, p: u32) {
        self.invalidate_events(p);
        self.add_events(world, model, p);
        self.sorter.update(p);
    }

    /// Atomic re-prediction for a pair. Both are invalidated before either
    /// is re-predicted, so the fresh mutual events carry each other's
    /// post-bump counters and survive the stale check.
    pub fn full_update_pair(&mut self, world: &mut World, model: &dyn Model, p1: u32, p2: u32) {
        self.invalidate_events(p1);
        self.invalidate_events(p2);
        self.add_events(world, model, p1);
        self.add_events(world, model, p2);
        self.sorter.update(p1);
        self.sorter.update(p2);
    }

    /// Re-arm every system timer in the dedicated sorter stream.
    pub fn rebuild_system_events(&mut self, world: &World, model: &dyn Model) {
        let slot = self.system_slot();
        self.sorter.clear_pel(slot);
        for (system_id, dt) in model.system_events(world) {
            self.sorter.push(slot, EventRecord::system(dt, slot, system_id));
        }
        self.sorter.update(slot);
    }

    /// Time to the next event, or `None` when the queue holds nothing
    /// dispatchable (all lists empty or exhausted).
    pub fn next_event_dt(&mut self) -> Option<f64> {
        self.sorter.sort();
        if self.sorter.next_pel_empty() || self.sorter.next_kind() == EventKind::None {
            return None;
        }
        Some(self.sorter.next_dt())
    }

    /// Pop and process the earliest event in the simulation.
    ///
    /// Preconditions: the sorter reflects every earlier mutation (any
    /// `push` has been followed by `update`/`sort`, which every public
    /// mutator here guarantees).
    pub fn run_next_event(&mut self, world: &mut World, model: &dyn Model) -> Result<Dispatch> {
        self.sorter.sort();
        if self.sorter.next_pel_empty() {
            return Err(Error::EmptyEventList(self.sorter.next_id()));
        }

        // Drain lazily-invalidated interactions: a stale counter stamp
        // means the partner's history moved on since the prediction.
        while self.sorter.next_kind() == EventKind::Interaction
            && self.sorter.next_stamp() != self.counters.get(self.sorter.next_p2())
        {
            self.tally.stale_skips += 1;
            self.sorter.pop_next_event();
            let id = self.sorter.next_id();
            self.sorter.update(id);
            self.sorter.sort();
            if self.sorter.next_pel_empty() {
                return Err(Error::EmptyEventList(self.sorter.next_id()));
            }
        }

        let kind = self.sorter.next_kind();
        if kind != EventKind::None && !self.sorter.next_dt().is_finite() {
            return Err(Error::BrokenPrediction(self.sorter.next_summary(world.time())));
        }

        match kind {
            EventKind::Interaction => self.run_interaction(world, model),
            EventKind::Global => self.run_global(world, model),
            EventKind::Local => self.run_local(world, model),
            EventKind::System => self.run_system(world, model),
            EventKind::Virtual => {
                // The recovery valve: no physics, just re-predict the owner.
                let p = self.sorter.next_id();
                self.tally.virtuals += 1;
                if p == self.system_slot() {
                    // A sentinel in the system stream means timers were
                    // displaced; re-arming them replaces it.
                    self.rebuild_system_events(world, model);
                } else {
                    self.full_update(world, model, p);
                }
                Ok(Dispatch::Ran {
                    kind: EventKind::Virtual,
                    dt: 0.0,
                })
            }
            EventKind::None => Err(Error::OutOfEvents(self.sorter.next_summary(world.time()))),
        }
    }

    fn run_interaction(&mut self, world: &mut World, model: &dyn Model) -> Result<Dispatch> {
        let p1 = self.sorter.next_id();
        let p2 = self.sorter.next_p2();

        // Ready the next event before recomputing this one
        self.sorter.pop_next_event();
        self.sorter.update(p1);
        self.sorter.sort();

        // Recompute from the pair's currently-valid state
        model.sync_pair(world, p1, p2);
        let event = model.predict_interaction(world, p1, p2);

        if event.dt > self.sorter.next_dt() {
            self.interaction_rejections += 1;
            if self.interaction_rejections < REJECTION_LIMIT {
                // The recomputed time now falls after the queue's next
                // event. Unless that next event is a mirrored copy of this
                // same pair, treat it as a numerical reorder and re-predict.
                let np1 = self.sorter.next_id();
                let np2 = self.sorter.next_p2();
                let same_pair = self.sorter.next_kind() == EventKind::Interaction
                    && (np1 == p1 || np1 == p2)
                    && (np2 == p1 || np2 == p2);
                if !same_pair {
                    debug!(
                        "interaction [{p1},{p2}] recomputed to occur later than the next event, re-predicting"
                    );
                    self.tally.repredictions += 1;
                    self.full_update_pair(world, model, p1, p2);
                    return Ok(Dispatch::Repredicted {
                        kind: EventKind::Interaction,
                    });
                }
                // A near-duplicate of the same event; execute it.
            }
        }
        self.interaction_rejections = 0;

        if event.kind == EventKind::None {
            debug!(
                "interaction [{p1},{p2}] no longer occurs (glancing collision lost to numerical noise), re-predicting"
            );
            self.tally.repredictions += 1;
            self.full_update_pair(world, model, p1, p2);
            return Ok(Dispatch::Repredicted {
                kind: EventKind::Interaction,
            });
        }

        if !event.dt.is_finite() {
            return Err(Error::BrokenPrediction(event.summary(world.time())));
        }

        world.advance_clock(event.dt);
        self.sorter.stream(event.dt);
        model.sync_pair(world, p1, p2);
        let updated = model.execute_interaction(world, p1, p2, &event)?;
        self.tally.interactions += 1;
        self.tally.freestream_time += world.take_freestream();
        self.apply_outcome(world, model, updated);
        Ok(Dispatch::Ran {
            kind: EventKind::Interaction,
            dt: event.dt,
        })
    }

    fn run_local(&mut self, world: &mut World, model: &dyn Model) -> Result<Dispatch> {
        let p = self.sorter.next_id();
        let local_id = self.sorter.next_p2();

        self.sorter.pop_next_event();
        self.sorter.update(p);
        self.sorter.sort();

        model.sync_particle(world, p);
        let event = model.predict_local(world, p, local_id);

        if event.kind == EventKind::None {
            debug!("local event [{p}] no longer occurs (tenuous event lost to numerical noise), re-predicting");
            self.tally.repredictions += 1;
            self.full_update(world, model, p);
            return Ok(Dispatch::Repredicted {
                kind: EventKind::Local,
            });
        }

        if event.dt > self.sorter.next_dt() {
            self.local_rejections += 1;
            if self.local_rejections < REJECTION_LIMIT {
                debug!("local event [{p}] recomputed to occur later than the next event, re-predicting");
                self.tally.repredictions += 1;
                self.full_update(world, model, p);
                return Ok(Dispatch::Repredicted {
                    kind: EventKind::Local,
                });
            }
        }
        self.local_rejections = 0;

        if !event.dt.is_finite() {
            return Err(Error::BrokenPrediction(event.summary(world.time())));
        }

        world.advance_clock(event.dt);
        self.sorter.stream(event.dt);
        model.sync_particle(world, p);
        let updated = model.execute_local(world, p, local_id, &event)?;
        self.tally.locals += 1;
        self.tally.freestream_time += world.take_freestream();
        self.apply_outcome(world, model, updated);
        Ok(Dispatch::Ran {
            kind: EventKind::Local,
            dt: event.dt,
        })
    }

    fn run_global(&mut self, world: &mut World, model: &dyn Model) -> Result<Dispatch> {
        let p = self.sorter.next_id();
        let global_id = self.sorter.next_p2();

        // Globals own their clock bookkeeping; the executor reports how
        // much time it streamed and the follow-up re-prediction replaces
        // the fired event.
        let (streamed, updated) = model.execute_global(world, p, global_id)?;
        if streamed != 0.0 {
            world.advance_clock(streamed);
            self.sorter.stream(streamed);
        }
        self.tally.globals += 1;
        self.tally.freestream_time += world.take_freestream();
        match updated {
            // Guard against a stuck root: the fired event must leave the queue.
            Updated::None => self.full_update(world, model, p),
            other => self.apply_outcome(world, model, other),
        }
        Ok(Dispatch::Ran {
            kind: EventKind::Global,
            dt: streamed,
        })
    }

    fn run_system(&mut self, world: &mut World, model: &dyn Model) -> Result<Dispatch> {
        let system_id = self.sorter.next_p2();
        let dt = self.sorter.next_dt();

        world.advance_clock(dt);
        self.sorter.stream(dt);
        let updated = model.execute_system(world, system_id)?;
        self.tally.systems += 1;
        self.tally.freestream_time += world.take_freestream();
        // System timers re-arm themselves through the rebuilt stream.
        self.rebuild_system_events(world, model);
        self.apply_outcome(world, model, updated);
        Ok(Dispatch::Ran {
            kind: EventKind::System,
            dt,
        })
    }

    fn apply_outcome(&mut self, world: &mut World, model: &dyn Model, updated: Updated) {
        match updated {
            Updated::None => {}
            Updated::One(p) => self.full_update(world, model, p),
            Updated::Pair(a, b) => self.full_update_pair(world, model, a, b),
            Updated::All => self.initialise(world, model),
        }
    }

    /// Shift every queued event `dt` closer (the sorter stores times
    /// relative to its epoch, so this is a single bias move).
    pub fn stream(&mut self, dt: f64) {
        self.sorter.stream(dt);
    }

    /// Uniformly rescale every queued event time. Only valid between
    /// dispatches.
    pub fn rescale_times(&mut self, factor: f64) {
        self.sorter.rescale_times(factor);
    }

    /// The sorter stream reserved for SYSTEM events.
    pub fn system_slot(&self) -> u32 {
        (self.sorter.len().saturating_sub(1)) as u32
    }

    pub fn counters(&self) -> &EventCounters {
        &self.counters
    }

    pub fn tally(&self) -> &EventTally {
        &self.tally
    }

    pub fn sorter(&self) -> &CbtSorter {
        &self.sorter
    }
}

/// Pair-splitting rule for symmetric initialisation: each unordered pair is
/// generated from exactly one side, split so the lists stay balanced even
/// when ids correlate with positions (e.g. a frozen lattice).
fn init_pair_allowed(p: u32, q: u32) -> bool {
    if p % 2 == 1 {
        // Odd owners take even partners, and odd partners above them.
        !(q % 2 == 1 && q < p)
    } else {
        // Even owners take only even partners below them.
        q % 2 == 0 && q < p
    }
}
