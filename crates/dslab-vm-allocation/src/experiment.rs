//! Tools for running experiments with multiple simulation runs.

use std::fs;
use std::fs::File;
use std::sync::{Arc, Mutex};

use indexmap::map::IndexMap;
use serde::Serialize;
use threadpool::ThreadPool;

/// Results of a single simulation run.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub id: usize,
    pub seed: u64,
    pub results: IndexMap<String, f64>,
}

/// Runs independent simulation instances, one per seed, on a thread pool.
///
/// Each run builds its own simulation inside the factory, so runs share no mutable state.
pub struct Experiment {
    seeds: Vec<u64>,
    num_threads: usize,
    output_dir: Option<String>,
}

impl Experiment {
    pub fn new(seeds: Vec<u64>, num_threads: usize) -> Self {
        Self {
            seeds,
            num_threads: num_threads.max(1),
            output_dir: None,
        }
    }

    /// Sets the directory where `results.json` is written after the experiment.
    pub fn with_output_dir(mut self, dir: &str) -> Self {
        self.output_dir = Some(dir.to_string());
        self
    }

    /// Runs the experiment. The factory gets the run seed and returns results of the run.
    ///
    /// Summaries are returned in the order of seeds.
    pub fn run<F>(&self, factory: F) -> std::io::Result<Vec<RunSummary>>
    where
        F: Fn(u64) -> IndexMap<String, f64> + Send + Sync + 'static,
    {
        let results = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(factory);
        let pool = ThreadPool::new(self.num_threads);

        for (run_id, &seed) in self.seeds.iter().enumerate() {
            let results = results.clone();
            let factory = factory.clone();
            pool.execute(move || {
                log::info!("run {} started with seed {}", run_id, seed);
                let run_results = factory(seed);
                let summary = RunSummary {
                    id: run_id,
                    seed,
                    results: run_results,
                };
                if let Ok(mut results) = results.lock() {
                    results.push(summary);
                }
            });
        }

        pool.join();
        let mut results = match results.lock() {
            Ok(results) => results.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        results.sort_by_key(|summary| summary.id);
        if results.len() < self.seeds.len() {
            log::error!("{} runs panicked", self.seeds.len() - results.len());
        }

        if let Some(dir) = &self.output_dir {
            fs::create_dir_all(dir)?;
            let mut file = File::create(format!("{}/results.json", dir))?;
            serde_json::to_writer_pretty(&mut file, &results)?;
        }
        Ok(results)
    }
}
