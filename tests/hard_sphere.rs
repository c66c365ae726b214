use edmd::core::{
    Dispatch, EventKind, HardSphereModel, Particle, SchedulerKind, Simulation, World,
};
use edmd::error::Result;

/// Two-particle head-on collision in an effectively infinite box: one
/// interaction at t = 0.5, velocities swap sign, and nothing further.
#[test]
fn head_on_pair_swaps_velocities() -> Result<()> {
    let l = 1.0e9;
    let c = l / 2.0;
    let particles = vec![
        Particle::new(0, [c - 1.0, c, c], [1.0, 0.0, 0.0], 0.5, 1.0)?,
        Particle::new(1, [c + 1.0, c, c], [-1.0, 0.0, 0.0], 0.5, 1.0)?,
    ];
    let world = World::new(particles, [l, l, l])?;
    let mut sim = Simulation::from_parts(world, Box::new(HardSphereModel::new()), SchedulerKind::Dumb)?;

    let step = sim.run_next_event()?;
    match step {
        Dispatch::Ran { kind, dt } => {
            assert_eq!(kind, EventKind::Interaction);
            assert!((dt - 0.5).abs() < 1e-12, "collision dt {dt} should be 0.5");
        }
        other => panic!("expected an executed interaction, got {other:?}"),
    }
    assert!((sim.time() - 0.5).abs() < 1e-12);

    let v = sim.velocities();
    assert!((v[0][0] + 1.0).abs() < 1e-12, "particle 0 should rebound");
    assert!((v[1][0] - 1.0).abs() < 1e-12, "particle 1 should rebound");

    // The pair now separates; no further interactions for a long while.
    sim.advance_to(10.0)?;
    assert_eq!(sim.tally().interactions, 1);
    let r = sim.positions();
    assert!((r[0][0] - (c - 0.5 - 9.5)).abs() < 1e-6);
    Ok(())
}

/// A lone particle reflects specularly off a wall.
#[test]
fn wall_reflection_basic() -> Result<()> {
    let particles = vec![Particle::new(0, [1.0, 2.5, 2.5], [-1.0, 0.0, 0.0], 0.5, 1.0)?];
    let world = World::new(particles, [5.0, 5.0, 5.0])?;
    let mut sim = Simulation::from_parts(world, Box::new(HardSphereModel::new()), SchedulerKind::Dumb)?;

    // Contact when x reaches radius = 0.5, starting at 1.0 moving -1.0: dt = 0.5
    let step = sim.run_next_event()?;
    assert_eq!(
        step,
        Dispatch::Ran {
            kind: EventKind::Local,
            dt: 0.5
        }
    );
    assert!((sim.positions()[0][0] - 0.5).abs() < 1e-12);
    assert!((sim.velocities()[0][0] - 1.0).abs() < 1e-12);
    assert_eq!(sim.tally().locals, 1);
    Ok(())
}

/// Energy conservation in an NVE hard-sphere gas: advance through many
/// collisions and assert total kinetic energy stays constant within a tight
/// floating-point tolerance.
#[test]
fn energy_conservation_nve() -> Result<()> {
    let mut sim = Simulation::new(64, [20.0, 20.0, 20.0], 0.2, 1.0, Some(12345))?;
    let e0 = sim.kinetic_energy();

    let t_end = 50.0;
    let steps = 200;
    for s in 1..=steps {
        let t = t_end * (s as f64) / (steps as f64);
        sim.advance_to(t)?;
    }

    let e1 = sim.kinetic_energy();
    let rel = ((e1 - e0) / e0).abs();
    assert!(
        rel < 1e-8,
        "relative energy drift {} too large (E0={}, E1={})",
        rel,
        e0,
        e1
    );
    assert!(
        sim.tally().executed() > 0,
        "expected the gas to undergo events"
    );
    Ok(())
}

/// The monotone-clock invariant: every executed event advances the clock by
/// exactly its dt, and the clock never decreases.
#[test]
fn clock_is_monotone_and_matches_event_dt() -> Result<()> {
    let mut sim = Simulation::new(24, [12.0, 12.0, 12.0], 0.3, 1.0, Some(2024))?;
    let mut executed = 0;
    while executed < 200 {
        let before = sim.time();
        match sim.run_next_event()? {
            Dispatch::Ran { dt, .. } => {
                executed += 1;
                assert!(dt >= 0.0, "event dt {dt} must be non-negative");
                let after = sim.time();
                assert!(after >= before);
                assert!(
                    ((after - before) - dt).abs() < 1e-9,
                    "clock moved {} for an event of dt {}",
                    after - before,
                    dt
                );
            }
            Dispatch::Repredicted { .. } => {
                assert_eq!(sim.time(), before, "re-prediction must not move the clock");
            }
        }
    }
    Ok(())
}

/// Heap discipline: after a dispatch the queue root is the minimum over
/// every pending event in every list.
#[test]
fn root_is_global_minimum_after_dispatch() -> Result<()> {
    let mut sim = Simulation::new(16, [10.0, 10.0, 10.0], 0.25, 1.0, Some(777))?;
    for _ in 0..100 {
        sim.run_next_event()?;
        let sorter = sim.scheduler().sorter();
        let root = sorter.next_dt() + sorter.bias();
        for s in 0..sorter.len() as u32 {
            for ev in sorter.pel(s).iter() {
                assert!(
                    ev.dt >= root - 1e-9,
                    "entry at stored time {} undercuts the root {}",
                    ev.dt,
                    root
                );
            }
        }
    }
    Ok(())
}

/// Re-predicting a particle is idempotent modulo counter advancement:
/// repeating invalidate + add + sort reproduces the same list head.
#[test]
fn full_update_is_idempotent() -> Result<()> {
    let mut sim = Simulation::new(12, [10.0, 10.0, 10.0], 0.25, 1.0, Some(31415))?;
    sim.run_events(10)?;

    sim.full_update(3);
    let t1 = sim.next_event_time();
    let c1 = sim.scheduler().counters().get(3);
    let head1 = sim.scheduler().sorter().pel(3).peek().copied();

    sim.full_update(3);
    let t2 = sim.next_event_time();
    let c2 = sim.scheduler().counters().get(3);
    let head2 = sim.scheduler().sorter().pel(3).peek().copied();

    assert_eq!(c2, c1 + 1, "counters advance on every invalidation");
    match (t1, t2) {
        (Some(a), Some(b)) => assert!((a - b).abs() < 1e-12),
        (a, b) => assert_eq!(a, b),
    }
    match (head1, head2) {
        (Some(a), Some(b)) => {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.secondary, b.secondary);
            assert!(a.dt == b.dt || (a.dt - b.dt).abs() < 1e-12);
        }
        (a, b) => assert_eq!(a.map(|e| e.kind), b.map(|e| e.kind)),
    }
    Ok(())
}

/// A periodic maintainer timer rebuilds the queue without disturbing the
/// trajectory: a run with the timer matches a run without it.
#[test]
fn maintainer_tick_is_trajectory_neutral() -> Result<()> {
    let make_world = || World::populated(6, [12.0, 12.0, 12.0], 0.15, 1.0, Some(8642));

    let mut with_tick = Simulation::from_parts(
        make_world()?,
        Box::new(HardSphereModel::with_maintainer(1.0)?),
        SchedulerKind::Dumb,
    )?;
    let mut without = Simulation::from_parts(
        make_world()?,
        Box::new(HardSphereModel::new()),
        SchedulerKind::Dumb,
    )?;

    with_tick.advance_to(5.0)?;
    without.advance_to(5.0)?;

    let systems = with_tick.tally().systems;
    assert!(
        (4..=5).contains(&systems),
        "expected the period-1 timer to fire ~5 times by t=5, got {systems}"
    );
    assert_eq!(without.tally().systems, 0);

    let (ra, rb) = (with_tick.positions(), without.positions());
    let (va, vb) = (with_tick.velocities(), without.velocities());
    for i in 0..ra.len() {
        for k in 0..3 {
            assert!(
                (ra[i][k] - rb[i][k]).abs() < 1e-6,
                "position drift at particle {i} axis {k}: {} vs {}",
                ra[i][k],
                rb[i][k]
            );
            assert!((va[i][k] - vb[i][k]).abs() < 1e-6);
        }
    }
    Ok(())
}

/// Rescaling queued event times doubles the time to the next event relative
/// to an un-rescaled control run.
#[test]
fn rescale_doubles_next_event_time() -> Result<()> {
    let mut a = Simulation::new(16, [10.0, 10.0, 10.0], 0.2, 1.0, Some(99))?;
    let mut b = Simulation::new(16, [10.0, 10.0, 10.0], 0.2, 1.0, Some(99))?;

    a.run_events(100)?;
    b.run_events(100)?;
    assert!((a.time() - b.time()).abs() < 1e-12);
    let now = a.time();

    a.rescale_event_times(2.0)?;
    let dt_a = a.next_event_time().expect("events pending") - now;
    let dt_b = b.next_event_time().expect("events pending") - now;
    assert!(
        (dt_a - 2.0 * dt_b).abs() < 1e-9 * dt_b.abs().max(1.0),
        "rescaled dt {dt_a} should be twice {dt_b}"
    );
    Ok(())
}
