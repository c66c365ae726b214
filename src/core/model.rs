use crate::core::event::EventRecord;
use crate::core::world::World;
use crate::error::Result;

/// Which particles an executor mutated. The scheduler answers with the
/// matching `full_update`, so freshly generated mutual events carry
/// post-bump counter stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Updated {
    /// Nothing changed (the scheduler still re-predicts the primary as a
    /// livelock guard for GLOBAL events).
    None,
    /// A single particle changed.
    One(u32),
    /// Both members of a pair changed.
    Pair(u32, u32),
    /// The whole store changed; the scheduler rebuilds every queue.
    All,
}

/// Produces event predictions and keeps particle state current.
///
/// Predicted times are relative to the world clock at the moment of the
/// call, for particles that have been synced to it. A prediction of kind
/// `EventKind::None` means "never happens".
pub trait Predictor {
    /// Next interaction between `p1` and `p2`. The scheduler stamps the
    /// returned record with `p2`'s event counter before queueing it.
    fn predict_interaction(&self, world: &World, p1: u32, p2: u32) -> EventRecord;

    /// Next event between `p` and local source `local_id`.
    fn predict_local(&self, world: &World, p: u32, local_id: u32) -> EventRecord;

    /// Next event between `p` and global source `global_id`.
    fn predict_global(&self, world: &World, p: u32, global_id: u32) -> EventRecord;

    /// Ids of the local sources claiming `p`.
    fn locals_for(&self, world: &World, p: u32) -> Vec<u32>;

    /// Ids of the global sources claiming `p`.
    fn globals_for(&self, world: &World, p: u32) -> Vec<u32>;

    /// System timers to arm, as `(system_id, dt)` pairs. Called whenever
    /// the scheduler rebuilds its system events; timers re-arm themselves
    /// by reporting their next period here.
    fn system_events(&self, world: &World) -> Vec<(u32, f64)>;

    /// Stream particle `p` to the current clock value.
    fn sync_particle(&self, world: &mut World, p: u32);

    /// Stream both members of a pair to the current clock value.
    fn sync_pair(&self, world: &mut World, p1: u32, p2: u32) {
        self.sync_particle(world, p1);
        self.sync_particle(world, p2);
    }
}

/// Realises the physical consequences of events. Each method reports which
/// particles it mutated; the scheduler re-predicts them.
pub trait Executor {
    /// Run the interaction event `ev` between `p1` and `p2`, both already
    /// streamed to the event time.
    fn execute_interaction(
        &self,
        world: &mut World,
        p1: u32,
        p2: u32,
        ev: &EventRecord,
    ) -> Result<Updated>;

    /// Run the local event `ev` between `p` and `local_id`.
    fn execute_local(&self, world: &mut World, p: u32, local_id: u32, ev: &EventRecord)
        -> Result<Updated>;

    /// Run the global event for `p` against `global_id`. Returns the amount
    /// of simulation time the global streamed (0 when clock-transparent)
    /// along with the mutated set; the scheduler mirrors the streamed time
    /// onto the clock and the sorter.
    fn execute_global(&self, world: &mut World, p: u32, global_id: u32) -> Result<(f64, Updated)>;

    /// Run system timer `system_id`. The clock has already advanced to the
    /// timer's fire time.
    fn execute_system(&self, world: &mut World, system_id: u32) -> Result<Updated>;
}

/// The full collaborator capability set consumed by the scheduler.
///
/// `Send + Sync` is part of the contract so a simulation can be held across
/// the Python boundary and computed with the GIL released.
pub trait Model: Predictor + Executor + Send + Sync {}

impl<T: Predictor + Executor + Send + Sync> Model for T {}

/// Enumerates candidate interaction partners for a particle. Injected into
/// neighbour-list style schedulers; the geometry behind the answer is the
/// source's business.
pub trait NeighbourSource: Send + Sync {
    /// Candidate partner ids for `p`. May contain duplicates or `p` itself;
    /// the scheduler filters.
    fn partners(&self, world: &World, p: u32) -> Vec<u32>;
}
