use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::HashMap;

pub mod core;
pub mod error;

use crate::core::{HardSphereModel, Simulation, World};

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Python-facing wrapper around the event-driven simulation core.
///
/// API:
/// - __new__(num_particles, box_size, radius=1.0, mass=1.0, dim=3, seed=None,
///           scheduler="Dumb", sorter="CBT", maintainer_period=None)
/// - advance_to(time)
/// - run_events(count)
/// - get_positions() / get_velocities() -> np.ndarray, shape (N, 3)
/// - set_positions(arr) / set_velocities(arr) (+ rebuild_event_queue())
/// - time(), kinetic_energy(), event_counts(), rescale_event_times(factor)
#[pyclass]
pub struct EdmdSim {
    sim: Simulation,
}

#[pymethods]
impl EdmdSim {
    /// Initialize a hard-sphere gas simulation in a static axis-aligned 3D box.
    ///
    /// Parameters
    /// - num_particles: number of particles (int, > 0)
    /// - box_size: iterable of 3 positive floats [Lx, Ly, Lz]
    /// - radius: sphere radius (float, > 0)
    /// - mass: particle mass (float, > 0)
    /// - dim: spatial dimension; currently only 3 is supported in this build
    /// - seed: RNG seed (int) for reproducibility; None for nondeterministic
    /// - scheduler: scheduler variant key ("Dumb", "SystemOnly", ...)
    /// - sorter: sorter variant key ("CBT")
    /// - maintainer_period: optional period of the queue-rebuild timer
    ///
    /// Errors: raises ValueError on invalid parameters or unknown variant keys.
    #[new]
    #[pyo3(signature = (num_particles, box_size, radius=1.0, mass=1.0, dim=3, seed=None, scheduler="Dumb", sorter="CBT", maintainer_period=None))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        num_particles: usize,
        box_size: Vec<f64>,
        radius: f64,
        mass: f64,
        dim: usize,
        seed: Option<u64>,
        scheduler: &str,
        sorter: &str,
        maintainer_period: Option<f64>,
    ) -> PyResult<Self> {
        if dim != crate::core::particle::DIM {
            return Err(py_err(format!(
                "only dim={} is supported in this build",
                crate::core::particle::DIM
            )));
        }
        if box_size.len() != crate::core::particle::DIM {
            return Err(py_err(format!(
                "box_size must have length {}",
                crate::core::particle::DIM
            )));
        }
        let mut bs = [0.0f64; crate::core::particle::DIM];
        for (k, v) in box_size.iter().enumerate() {
            bs[k] = *v;
        }
        let world = World::populated(num_particles, bs, radius, mass, seed).map_err(py_err)?;
        let model = match maintainer_period {
            Some(period) => HardSphereModel::with_maintainer(period).map_err(py_err)?,
            None => HardSphereModel::new(),
        };
        let sim = Simulation::from_config(world, Box::new(model), scheduler, sorter, None)
            .map_err(py_err)?;
        Ok(Self { sim })
    }

    /// Advance the simulation to the specified absolute time (releases the GIL during computation).
    fn advance_to(&mut self, py: Python<'_>, target_time: f64) -> PyResult<()> {
        py.allow_threads(|| self.sim.advance_to(target_time))
            .map_err(py_err)
    }

    /// Process events until `count` of them have executed (releases the GIL).
    fn run_events(&mut self, py: Python<'_>, count: u64) -> PyResult<()> {
        py.allow_threads(|| self.sim.run_events(count)).map_err(py_err)
    }

    /// Current simulation time.
    fn time(&self) -> f64 {
        self.sim.time()
    }

    /// Total kinetic energy (diagnostic).
    fn kinetic_energy(&self) -> f64 {
        self.sim.kinetic_energy()
    }

    /// Executed-event statistics as a dict.
    fn event_counts(&self) -> HashMap<&'static str, u64> {
        let tally = self.sim.tally();
        HashMap::from([
            ("interactions", tally.interactions),
            ("locals", tally.locals),
            ("globals", tally.globals),
            ("systems", tally.systems),
            ("virtuals", tally.virtuals),
            ("stale_skips", tally.stale_skips),
            ("repredictions", tally.repredictions),
        ])
    }

    /// Return positions as a NumPy array of shape (N, 3), dtype=float64.
    fn get_positions<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let n = self.sim.num_particles();
        let dim = crate::core::particle::DIM;
        let mut arr = Array2::<f64>::zeros((n, dim));
        for (i, p) in self.sim.world.particles.iter().enumerate() {
            for k in 0..dim {
                arr[[i, k]] = p.r[k];
            }
        }
        let pyarr = arr.into_pyarray(py);
        Ok(pyarr.to_owned().into())
    }

    /// Return velocities as a NumPy array of shape (N, 3), dtype=float64.
    fn get_velocities<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let n = self.sim.num_particles();
        let dim = crate::core::particle::DIM;
        let mut arr = Array2::<f64>::zeros((n, dim));
        for (i, p) in self.sim.world.particles.iter().enumerate() {
            for k in 0..dim {
                arr[[i, k]] = p.v[k];
            }
        }
        let pyarr = arr.into_pyarray(py);
        Ok(pyarr.to_owned().into())
    }

    /// Set all particle positions from a NumPy array of shape (N, 3), dtype=float64.
    /// Values must be finite; caller is responsible for ensuring they lie within the
    /// domain and are non-overlapping. Call rebuild_event_queue() afterwards.
    fn set_positions<'py>(&mut self, positions: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
        let arr = positions.as_array();
        let n = self.sim.num_particles();
        let dim = crate::core::particle::DIM;
        if arr.ndim() != 2 || arr.shape()[0] != n || arr.shape()[1] != dim {
            return Err(py_err(format!(
                "positions must have shape ({}, {}), got {:?}",
                n,
                dim,
                arr.shape()
            )));
        }
        let now = self.sim.time();
        for i in 0..n {
            let mut r = [0.0_f64; crate::core::particle::DIM];
            for (k, r_k) in r.iter_mut().enumerate() {
                *r_k = arr[[i, k]];
            }
            self.sim.world.particles[i].set_position(r).map_err(py_err)?;
            // The new state is taken to be valid at the current clock value.
            self.sim.world.particles[i].last_update = now;
        }
        Ok(())
    }

    /// Set all particle velocities from a NumPy array of shape (N, 3), dtype=float64.
    /// Values must be finite. Call rebuild_event_queue() afterwards.
    fn set_velocities<'py>(&mut self, velocities: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
        let arr = velocities.as_array();
        let n = self.sim.num_particles();
        let dim = crate::core::particle::DIM;
        if arr.ndim() != 2 || arr.shape()[0] != n || arr.shape()[1] != dim {
            return Err(py_err(format!(
                "velocities must have shape ({}, {}), got {:?}",
                n,
                dim,
                arr.shape()
            )));
        }
        for i in 0..n {
            let mut v = [0.0_f64; crate::core::particle::DIM];
            for (k, v_k) in v.iter_mut().enumerate() {
                *v_k = arr[[i, k]];
            }
            self.sim.world.particles[i].set_velocity(v).map_err(py_err)?;
        }
        Ok(())
    }

    /// Rebuild the event queue from the current particle states. Must be
    /// called after set_positions/set_velocities.
    fn rebuild_event_queue(&mut self) -> PyResult<()> {
        self.sim.rebuild_event_queue().map_err(py_err)
    }

    /// Multiply every pending event time by `factor` (reduced-unit rescaling).
    fn rescale_event_times(&mut self, factor: f64) -> PyResult<()> {
        self.sim.rescale_event_times(factor).map_err(py_err)
    }
}

/// The edmd Python module entry point.
#[pymodule]
fn edmd(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<EdmdSim>()?;
    Ok(())
}
