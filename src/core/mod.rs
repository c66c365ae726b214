//! Core of the event-driven molecular dynamics engine.
//!
//! The scheduler advances simulation time directly to the next physical
//! event: per-particle event lists feed a complete-binary-tree sorter, a
//! counter table invalidates stale cross-references lazily, and the
//! dispatch loop recomputes each event from currently-valid state before
//! running it.

pub mod event;
pub mod hard_sphere;
pub mod model;
pub mod particle;
pub mod pel;
pub mod scheduler;
pub mod sim;
pub mod sorter;
pub mod world;

pub use event::{EventKind, EventRecord, EventSummary};
pub use hard_sphere::HardSphereModel;
pub use model::{Executor, Model, NeighbourSource, Predictor, Updated};
pub use particle::Particle;
pub use pel::Pel;
pub use scheduler::{Dispatch, EventCounters, EventTally, Scheduler, SchedulerKind};
pub use sim::Simulation;
pub use sorter::{CbtSorter, SorterKind};
pub use world::World;
