use crate::core::event::EventRecord;
use crate::core::model::{Executor, Predictor, Updated};
use crate::core::particle::DIM;
use crate::core::world::World;
use crate::error::{Error, Result};

/// Small numeric tolerance for time and geometric checks.
pub(crate) const EPS_TIME: f64 = 1e-12;

/// System-event id of the periodic queue maintainer.
const MAINTAINER: u32 = 0;

/// Hard-sphere gas in a static axis-aligned box with adiabatic walls.
///
/// The reference `Predictor`/`Executor` pair: quadratic flight-time pair
/// prediction, one local source per wall plane, specular reflection, and an
/// optional periodic maintainer timer that requests a full queue rebuild.
///
/// Particles are streamed lazily: positions are only advanced to the clock
/// when a prediction or execution needs them.
#[derive(Debug, Clone, Default)]
pub struct HardSphereModel {
    maintainer_period: Option<f64>,
}

impl HardSphereModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the periodic queue maintainer with the given period.
    pub fn with_maintainer(period: f64) -> Result<Self> {
        if !period.is_finite() || period <= 0.0 {
            return Err(Error::InvalidParam(
                "maintainer period must be finite and > 0".into(),
            ));
        }
        Ok(Self {
            maintainer_period: Some(period),
        })
    }
}

impl Predictor for HardSphereModel {
    /// Predict the time to collision for the pair, `None` if they miss.
    /// Both particles must already be streamed to the clock.
    fn predict_interaction(&self, world: &World, p1: u32, p2: u32) -> EventRecord {
        let pi = &world.particles[p1 as usize];
        let pj = &world.particles[p2 as usize];

        let mut d = [0.0_f64; DIM];
        let mut u = [0.0_f64; DIM];
        for (k, u_k) in u.iter_mut().enumerate() {
            d[k] = pj.r[k] - pi.r[k];
            *u_k = pj.v[k] - pi.v[k];
        }
        let a = dot(&u, &u);
        if a <= EPS_TIME {
            return EventRecord::none(p1); // No relative motion
        }
        let b = 2.0 * dot(&d, &u);
        let r_sum = pi.radius + pj.radius;
        let c = dot(&d, &d) - r_sum * r_sum;

        let disc = b * b - 4.0 * a * c;
        if disc <= 0.0 {
            return EventRecord::none(p1);
        }
        let sqrt_disc = disc.sqrt();

        // Earlier root; require an approaching pair (b < 0) and positive time
        let t_rel = (-b - sqrt_disc) / (2.0 * a);
        if b >= 0.0 || t_rel <= EPS_TIME || !t_rel.is_finite() {
            return EventRecord::none(p1);
        }

        EventRecord::interaction(t_rel, p1, p2, 0)
    }

    /// Time until `p` reaches the plane of wall `local_id`, `None` while it
    /// recedes from it.
    fn predict_local(&self, world: &World, p: u32, local_id: u32) -> EventRecord {
        let part = &world.particles[p as usize];
        let (axis, is_max) = wall_axis_side(local_id);
        let l = world.box_size()[axis];
        let x = part.r[axis];
        let v = part.v[axis];

        let t_rel = if is_max {
            if v > EPS_TIME {
                (l - part.radius - x) / v
            } else {
                return EventRecord::none(p);
            }
        } else if v < -EPS_TIME {
            (part.radius - x) / v
        } else {
            return EventRecord::none(p);
        };

        if t_rel <= EPS_TIME || !t_rel.is_finite() {
            return EventRecord::none(p);
        }
        EventRecord::local(t_rel, p, local_id)
    }

    fn predict_global(&self, _world: &World, p: u32, _global_id: u32) -> EventRecord {
        EventRecord::none(p)
    }

    /// Every finite wall plane claims every particle.
    fn locals_for(&self, world: &World, _p: u32) -> Vec<u32> {
        let box_size = world.box_size();
        (0..2 * DIM as u32)
            .filter(|&w| box_size[wall_axis_side(w).0].is_finite())
            .collect()
    }

    fn globals_for(&self, _world: &World, _p: u32) -> Vec<u32> {
        Vec::new()
    }

    fn system_events(&self, _world: &World) -> Vec<(u32, f64)> {
        match self.maintainer_period {
            Some(period) => vec![(MAINTAINER, period)],
            None => Vec::new(),
        }
    }

    /// Stream `p` to the clock by linear motion, clamping into the box as a
    /// fallback against numerical drift.
    fn sync_particle(&self, world: &mut World, p: u32) {
        let now = world.time();
        let box_size = world.box_size();
        let part = &mut world.particles[p as usize];
        let dt = now - part.last_update;
        part.last_update = now;
        if dt.abs() <= EPS_TIME {
            return;
        }
        for k in 0..DIM {
            part.r[k] += part.v[k] * dt;
            if box_size[k].is_finite() {
                let lo = part.radius;
                let hi = box_size[k] - part.radius;
                part.r[k] = part.r[k].clamp(lo, hi);
            }
        }
    }
}

impl Executor for HardSphereModel {
    /// Resolve an elastic hard-sphere collision between `p1` and `p2`.
    fn execute_interaction(
        &self,
        world: &mut World,
        p1: u32,
        p2: u32,
        _ev: &EventRecord,
    ) -> Result<Updated> {
        let (i, j) = (p1 as usize, p2 as usize);

        // Unit normal at contact from i -> j
        let (ri, rj) = (world.particles[i].r, world.particles[j].r);
        let mut n = [0.0_f64; DIM];
        for ((nk, &rjk), &rik) in n.iter_mut().zip(rj.iter()).zip(ri.iter()) {
            *nk = rjk - rik;
        }
        let dist = dot(&n, &n).sqrt();
        if dist <= EPS_TIME {
            // Nearly coincident centers - numerical pathology
            return Err(Error::MathError(
                "degenerate contact normal in pair collision".into(),
            ));
        }
        for nk in &mut n {
            *nk /= dist;
        }

        let (mi, mj) = (world.particles[i].mass, world.particles[j].mass);
        let mut u = [0.0_f64; DIM];
        for ((uk, &vj), &vi) in u
            .iter_mut()
            .zip(world.particles[j].v.iter())
            .zip(world.particles[i].v.iter())
        {
            *uk = vj - vi;
        }
        let u_n = dot(&u, &n);

        // Update velocities (only normal component changes)
        let fi = (2.0 * mj / (mi + mj)) * u_n;
        let fj = (2.0 * mi / (mi + mj)) * u_n;
        for (k, &nk) in n.iter().enumerate() {
            world.particles[i].v[k] += fi * nk;
            world.particles[j].v[k] -= fj * nk;
        }
        Ok(Updated::Pair(p1, p2))
    }

    /// Specular reflection on the hit axis, snapping the position to the
    /// exact contact plane.
    fn execute_local(
        &self,
        world: &mut World,
        p: u32,
        local_id: u32,
        _ev: &EventRecord,
    ) -> Result<Updated> {
        let (axis, is_max) = wall_axis_side(local_id);
        let box_size = world.box_size();
        let part = &mut world.particles[p as usize];
        part.v[axis] = -part.v[axis];

        let lo = part.radius;
        let hi = box_size[axis] - part.radius;
        part.r[axis] = if is_max { hi } else { lo };
        Ok(Updated::One(p))
    }

    fn execute_global(&self, _world: &mut World, _p: u32, _global_id: u32) -> Result<(f64, Updated)> {
        Err(Error::InvalidParam(
            "hard-sphere model has no global sources".into(),
        ))
    }

    fn execute_system(&self, _world: &mut World, system_id: u32) -> Result<Updated> {
        match system_id {
            MAINTAINER => Ok(Updated::All),
            other => Err(Error::InvalidParam(format!(
                "unknown system event id {other}"
            ))),
        }
    }
}

#[inline]
fn dot(a: &[f64; DIM], b: &[f64; DIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub(crate) fn wall_axis_side(wall_id: u32) -> (usize, bool) {
    let axis = (wall_id / 2) as usize;
    let is_max = wall_id % 2 == 1;
    (axis, is_max)
}
