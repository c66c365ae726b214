use crate::core::hard_sphere::{HardSphereModel, EPS_TIME};
use crate::core::model::{Model, NeighbourSource};
use crate::core::particle::DIM;
use crate::core::scheduler::{Dispatch, EventTally, Scheduler, SchedulerKind};
use crate::core::sorter::SorterKind;
use crate::core::world::World;
use crate::error::{Error, Result};

/// A complete event-driven simulation: the particle store and clock, the
/// scheduler, and the boxed predictor/executor collaborator.
///
/// The dispatch loop is strictly sequential; between any two events the
/// world is fully consistent.
pub struct Simulation {
    pub world: World,
    scheduler: Scheduler,
    model: Box<dyn Model>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("world", &self.world)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Simulation {
    /// Create a hard-sphere gas of `num_particles` identical spheres in a
    /// static axis-aligned box, scheduled with the full-partner variant.
    ///
    /// Particles are placed with rejection sampling to avoid initial
    /// overlap; velocities are sampled uniformly in [-1, 1] per component.
    pub fn new(
        num_particles: usize,
        box_size: [f64; DIM],
        radius: f64,
        mass: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        let world = World::populated(num_particles, box_size, radius, mass, seed)?;
        Self::from_parts(world, Box::new(HardSphereModel::new()), SchedulerKind::Dumb)
    }

    /// Assemble a simulation from an existing world and collaborator.
    pub fn from_parts(world: World, model: Box<dyn Model>, kind: SchedulerKind) -> Result<Self> {
        let scheduler = Scheduler::new(kind, None)?;
        Self::with_scheduler(world, model, scheduler)
    }

    /// Assemble a simulation around a fully-configured scheduler (e.g. a
    /// neighbour-list variant with its source injected).
    pub fn with_scheduler(
        world: World,
        model: Box<dyn Model>,
        scheduler: Scheduler,
    ) -> Result<Self> {
        let mut sim = Self {
            world,
            scheduler,
            model,
        };
        sim.scheduler.initialise(&mut sim.world, sim.model.as_ref());
        Ok(sim)
    }

    /// Assemble from opaque factory keys, as handed over by the persisted
    /// configuration. Unknown keys are fatal.
    pub fn from_config(
        world: World,
        model: Box<dyn Model>,
        scheduler_kind: &str,
        sorter_kind: &str,
        source: Option<Box<dyn NeighbourSource>>,
    ) -> Result<Self> {
        let kind: SchedulerKind = scheduler_kind.parse()?;
        let SorterKind::Cbt = sorter_kind.parse::<SorterKind>()?;
        let scheduler = Scheduler::new(kind, source)?;
        Self::with_scheduler(world, model, scheduler)
    }

    /// Returns current simulation time.
    pub fn time(&self) -> f64 {
        self.world.time()
    }

    /// Number of particles.
    pub fn num_particles(&self) -> usize {
        self.world.num_particles()
    }

    /// Positions as a Vec of fixed-size arrays.
    pub fn positions(&self) -> Vec<[f64; DIM]> {
        self.world.positions()
    }

    /// Velocities as a Vec of fixed-size arrays.
    pub fn velocities(&self) -> Vec<[f64; DIM]> {
        self.world.velocities()
    }

    /// Compute total kinetic energy (diagnostic).
    pub fn kinetic_energy(&self) -> f64 {
        self.world.kinetic_energy()
    }

    /// Executed-event statistics.
    pub fn tally(&self) -> &EventTally {
        self.scheduler.tally()
    }

    /// Read access to the scheduler (counters, queue state).
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Absolute time of the next queued event, or `None` when nothing is
    /// left to dispatch.
    pub fn next_event_time(&mut self) -> Option<f64> {
        let now = self.world.time();
        self.scheduler.next_event_dt().map(|dt| now + dt)
    }

    /// Pop and process the earliest event.
    pub fn run_next_event(&mut self) -> Result<Dispatch> {
        self.scheduler
            .run_next_event(&mut self.world, self.model.as_ref())
    }

    /// Process events until `count` of them have executed (re-predictions
    /// do not count).
    pub fn run_events(&mut self, count: u64) -> Result<()> {
        let mut executed = 0u64;
        while executed < count {
            if let Dispatch::Ran { .. } = self.run_next_event()? {
                executed += 1;
            }
        }
        Ok(())
    }

    /// Atomically re-predict one particle's future.
    pub fn full_update(&mut self, p: u32) {
        self.scheduler
            .full_update(&mut self.world, self.model.as_ref(), p);
    }

    /// Advance the simulation to `target_time` (must be ≥ current time),
    /// dispatching every event up to it, then drifting all particles the
    /// remaining way.
    pub fn advance_to(&mut self, target_time: f64) -> Result<()> {
        if !target_time.is_finite() {
            return Err(Error::InvalidParam("target_time must be finite".into()));
        }
        if target_time < self.world.time() - EPS_TIME {
            return Err(Error::InvalidParam(
                "target_time cannot be earlier than current time".into(),
            ));
        }

        loop {
            let Some(dt) = self.scheduler.next_event_dt() else {
                break;
            };
            if self.world.time() + dt > target_time {
                break;
            }
            self.scheduler
                .run_next_event(&mut self.world, self.model.as_ref())?;
        }

        // Drift the remaining way, keeping the queue's epoch aligned with
        // the clock.
        let dt = target_time - self.world.time();
        if dt > EPS_TIME {
            self.world.advance_clock(dt);
            self.scheduler.stream(dt);
            for p in 0..self.world.num_particles() as u32 {
                self.model.sync_particle(&mut self.world, p);
            }
        }
        Ok(())
    }

    /// Rebuild the event queue from the current particle states.
    ///
    /// This should be called after externally modifying positions or
    /// velocities (e.g., via the Python setters) so event predictions are
    /// consistent again.
    pub fn rebuild_event_queue(&mut self) -> Result<()> {
        self.scheduler.initialise(&mut self.world, self.model.as_ref());
        Ok(())
    }

    /// Multiply every queued event time by `factor` (reduced-unit
    /// rescaling). Must not be called from inside a dispatch.
    pub fn rescale_event_times(&mut self, factor: f64) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(Error::InvalidParam(
                "rescale factor must be finite and > 0".into(),
            ));
        }
        self.scheduler.rescale_times(factor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_small_sim_ok() -> Result<()> {
        let mut sim = Simulation::new(4, [10.0, 10.0, 10.0], 0.2, 1.0, Some(1234))?;
        assert_eq!(sim.num_particles(), 4);
        assert!(sim.kinetic_energy().is_finite());
        // Advance a little to trigger some events or drift
        sim.advance_to(0.1)?;
        assert!(sim.time() >= 0.1 - 1e-12);
        Ok(())
    }

    #[test]
    fn advance_rejects_bad_targets() -> Result<()> {
        let mut sim = Simulation::new(2, [10.0, 10.0, 10.0], 0.2, 1.0, Some(1))?;
        assert!(sim.advance_to(f64::NAN).is_err());
        sim.advance_to(1.0)?;
        assert!(sim.advance_to(0.5).is_err());
        Ok(())
    }

    #[test]
    fn unknown_factory_keys_are_fatal() -> Result<()> {
        let world = World::populated(2, [10.0, 10.0, 10.0], 0.2, 1.0, Some(3))?;
        let err = Simulation::from_config(
            world,
            Box::new(HardSphereModel::new()),
            "Sideways",
            "CBT",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownVariant(_)));
        Ok(())
    }

    #[test]
    fn rescale_rejects_bad_factors() -> Result<()> {
        let mut sim = Simulation::new(2, [10.0, 10.0, 10.0], 0.2, 1.0, Some(4))?;
        assert!(sim.rescale_event_times(0.0).is_err());
        assert!(sim.rescale_event_times(f64::INFINITY).is_err());
        sim.rescale_event_times(2.0)?;
        Ok(())
    }
}
