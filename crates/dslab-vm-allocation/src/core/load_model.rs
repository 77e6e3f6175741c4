//! VM CPU load models.

use dyn_clone::{clone_trait_object, DynClone};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// A load model defines which fraction of requested CPU capacity a VM uses at the moment.
///
/// `time` is the current simulation time, `time_from_start` is the time passed since VM was placed on its current
/// host (it is dropped to zero when VM is migrated).
pub trait LoadModel: DynClone {
    fn get_resource_load(&self, time: f64, time_from_start: f64) -> f64;
}

clone_trait_object!(LoadModel);

/// The simplest load model, the constant load.
#[derive(Clone)]
pub struct ConstantLoadModel {
    load: f64,
}

impl ConstantLoadModel {
    pub fn new(load: f64) -> Self {
        Self { load }
    }
}

impl LoadModel for ConstantLoadModel {
    fn get_resource_load(&self, _time: f64, _time_from_start: f64) -> f64 {
        self.load
    }
}

/// Load drawn uniformly from `[min_load, max_load]`.
///
/// The value depends only on the seed and the current time, so repeated queries at the same time
/// return the same load and runs with equal seeds are reproducible.
#[derive(Clone)]
pub struct RandomLoadModel {
    min_load: f64,
    max_load: f64,
    seed: u64,
}

impl RandomLoadModel {
    pub fn new(min_load: f64, max_load: f64, seed: u64) -> Self {
        Self {
            min_load,
            max_load,
            seed,
        }
    }
}

impl LoadModel for RandomLoadModel {
    fn get_resource_load(&self, time: f64, _time_from_start: f64) -> f64 {
        if self.max_load <= self.min_load {
            return self.min_load;
        }
        let mut rng = Pcg64::seed_from_u64(self.seed ^ time.to_bits());
        rng.gen_range(self.min_load..=self.max_load)
    }
}
