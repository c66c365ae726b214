use crate::core::particle::{Particle, DIM};
use crate::error::{Error, Result};
use rand::{rng, rngs::StdRng, Rng, SeedableRng};

/// The particle store and simulation clock.
///
/// Owns every particle, the static axis-aligned box, the monotone
/// simulation clock and the free-stream accumulator. The scheduler holds
/// particle ids only; executors mutate particles through `&mut World`.
///
/// Walls are implicitly represented by six planes: for axis k in {0,1,2},
/// wall_id = 2*k (min wall at x_k = 0), wall_id = 2*k+1 (max wall at
/// x_k = L_k).
#[derive(Debug)]
pub struct World {
    pub particles: Vec<Particle>,
    box_size: [f64; DIM],
    time: f64,
    freestream_acc: f64,
}

impl World {
    /// Wrap an existing particle set in a box with edge lengths `box_size`.
    pub fn new(particles: Vec<Particle>, box_size: [f64; DIM]) -> Result<Self> {
        if !box_size.iter().all(|&l| l > 0.0 && !l.is_nan()) {
            return Err(Error::InvalidParam(
                "box_size components must be positive".into(),
            ));
        }
        Ok(Self {
            particles,
            box_size,
            time: 0.0,
            freestream_acc: 0.0,
        })
    }

    /// Populate a box with `num_particles` identical hard spheres at
    /// non-overlapping rejection-sampled positions, velocities uniform in
    /// [-1, 1] per component.
    pub fn populated(
        num_particles: usize,
        box_size: [f64; DIM],
        radius: f64,
        mass: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        if num_particles == 0 {
            return Err(Error::InvalidParam("num_particles must be > 0".into()));
        }
        if !box_size.iter().all(|&l| l.is_finite() && l > 0.0) {
            return Err(Error::InvalidParam(
                "box_size components must be finite and > 0".into(),
            ));
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidParam("radius must be finite and > 0".into()));
        }
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        for &l in &box_size {
            if l < 2.0 * radius {
                return Err(Error::InvalidParam(
                    "box_size must be at least 2 * radius in every dimension".into(),
                ));
            }
        }

        let mut rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };

        // Rejection sample non-overlapping initial positions
        let mut particles: Vec<Particle> = Vec::with_capacity(num_particles);
        let max_attempts = 1_000_000usize;
        for id in 0..(num_particles as u32) {
            let mut attempts = 0usize;
            let r = loop {
                if attempts >= max_attempts {
                    return Err(Error::InvalidParam(format!(
                        "failed to place particle {} without overlap; try fewer particles or smaller radius",
                        id
                    )));
                }
                attempts += 1;
                // Sample positions within [radius, L - radius]
                let mut r = [0.0_f64; DIM];
                for (k, r_k) in r.iter_mut().enumerate() {
                    let lo = radius;
                    let hi = box_size[k] - radius;
                    *r_k = rng.random_range(lo..=hi);
                }
                if !overlaps_existing(&particles, &r, radius) {
                    break r;
                }
            };

            // Random initial velocities in [-1, 1] for each component
            let mut v = [0.0_f64; DIM];
            v.iter_mut().for_each(|x| *x = rng.random_range(-1.0..=1.0));

            particles.push(Particle::new(id, r, v, radius, mass)?);
        }

        Self::new(particles, box_size)
    }

    /// Current simulation time.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of particles.
    #[inline]
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Box edge lengths.
    #[inline]
    pub fn box_size(&self) -> [f64; DIM] {
        self.box_size
    }

    /// Advance the clock by `dt`. The dispatch loop is the only caller
    /// during event processing; `dt` comes from a validated event time.
    pub fn advance_clock(&mut self, dt: f64) {
        self.time += dt;
    }

    /// Accumulate silently free-streamed time; the next executed event
    /// absorbs it (see `EventTally::freestream_time`).
    pub fn add_freestream(&mut self, dt: f64) {
        self.freestream_acc += dt;
    }

    /// Read and reset the free-stream accumulator.
    pub fn take_freestream(&mut self) -> f64 {
        std::mem::replace(&mut self.freestream_acc, 0.0)
    }

    /// Positions as a Vec of fixed-size arrays.
    pub fn positions(&self) -> Vec<[f64; DIM]> {
        self.particles.iter().map(|p| p.r).collect()
    }

    /// Velocities as a Vec of fixed-size arrays.
    pub fn velocities(&self) -> Vec<[f64; DIM]> {
        self.particles.iter().map(|p| p.v).collect()
    }

    /// Compute total kinetic energy (diagnostic).
    pub fn kinetic_energy(&self) -> f64 {
        self.particles.iter().map(|p| p.kinetic_energy()).sum()
    }
}

fn overlaps_existing(existing: &[Particle], r: &[f64; DIM], radius: f64) -> bool {
    if existing.is_empty() {
        return false;
    }
    let min_sq = (2.0 * radius) * (2.0 * radius);
    for p in existing {
        let mut dsq = 0.0;
        for (rk, pk) in r.iter().zip(p.r.iter()) {
            dsq += (rk - pk) * (rk - pk);
        }
        if dsq < min_sq {
            return true;
        }
    }
    false
}
