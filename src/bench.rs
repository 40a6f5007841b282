//! Synthetic local-search workload over [`SyntheticGuest`].
//!
//! Each step scores the whole assignment in parallel, then moves one task to
//! another worker through a setter, which invalidates that task's results.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use guestmemo_cache::CacheStats;
use guestmemo_identity::Relations;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MemoConfig;
use crate::guest::{self, SyntheticGuest};
use crate::invoke::InvokeError;
use crate::memory::{Fields, GuestMemory, LinearMemory, MemoryError};
use crate::metrics::MemoMetricsSnapshot;
use crate::relations::GuestRelations;
use crate::scope::CacheScope;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("guest address {0:#x} has no handle")]
    MissingHandle(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct BenchOptions {
    pub tasks: usize,
    pub workers: usize,
    pub iterations: usize,
    pub seed: u64,
    pub config: MemoConfig,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            tasks: 200,
            workers: 8,
            iterations: 100,
            seed: 7,
            config: MemoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub memoize: bool,
    pub tasks: usize,
    pub workers: usize,
    pub iterations: usize,
    /// Score of the assignment after the last move.
    pub final_score: i64,
    /// Sum of the scores of every step.
    pub checksum: i64,
    /// Distinct workers holding a task at the end.
    pub workers_in_use: usize,
    pub guest_calls: u64,
    pub elapsed_ms: f64,
    pub metrics: MemoMetricsSnapshot,
    pub cache: CacheStats,
}

struct Model {
    memory: Arc<LinearMemory>,
    scope: CacheScope,
    tasks: Vec<u32>,
    workers: Vec<u32>,
    guest: Arc<SyntheticGuest>,
}

fn build_model(options: &BenchOptions, rng: &mut StdRng) -> Result<Model, BenchError> {
    let size = 64 + options.tasks * guest::task::SIZE + options.workers * guest::worker::SIZE;
    let memory = Arc::new(LinearMemory::new(size));
    let synthetic = Arc::new(SyntheticGuest::new(Arc::clone(&memory)));
    let scope = CacheScope::new(synthetic.clone(), options.config);

    let mut workers = Vec::with_capacity(options.workers);
    for id in 0..options.workers {
        let w = memory.alloc(guest::worker::SIZE, 8)?;
        memory.write_i32(w + guest::worker::ID, i32::try_from(id).unwrap_or(i32::MAX))?;
        memory.write_i32(w + guest::worker::SPEED, rng.gen_range(1..=3))?;
        workers.push(w);
    }

    let mut tasks = Vec::with_capacity(options.tasks);
    for _ in 0..options.tasks {
        let t = memory.alloc(guest::task::SIZE, 8)?;
        memory.write_i32(t + guest::task::DURATION, rng.gen_range(1..=20))?;
        memory.write_i64(t + guest::task::START, rng.gen_range(0..=500))?;
        let assigned = pick_worker(&workers, rng);
        memory.write_u32(t + guest::task::WORKER, assigned)?;
        tasks.push(t);
    }

    // Worker handles order by worker id, read through the guest.
    scope.set_relations(
        GuestRelations::new()
            .with_compare("compareWorkers")
            .bind(&scope),
    );

    Ok(Model {
        memory,
        scope,
        tasks,
        workers,
        guest: synthetic,
    })
}

/// Null (unassigned) one time in five.
fn pick_worker(workers: &[u32], rng: &mut StdRng) -> u32 {
    if workers.is_empty() || rng.gen_ratio(1, 5) {
        0
    } else {
        workers[rng.gen_range(0..workers.len())]
    }
}

fn score(model: &Model) -> Result<i64, BenchError> {
    let scope = &model.scope;
    let tasks = &model.tasks;
    tasks
        .par_iter()
        .enumerate()
        .map(|(i, &t)| -> Result<i64, BenchError> {
            if !scope.function("isAssigned").test(&[t])? {
                return Ok(100);
            }
            let next = tasks[(i + 1) % tasks.len()];
            let mut cost = scope.function("endTime").apply_long(&[t])?;
            if scope.function("sameWorker").test(&[t, next])? {
                cost += 10 * i64::from(scope.function("overlap").apply_int(&[t, next])?);
            }
            if i + 5 <= tasks.len() {
                let window = [t, tasks[i + 1], tasks[i + 2], tasks[i + 3], tasks[i + 4]];
                if scope.function("busiest").map(&window)?.is_some() {
                    cost += 1;
                }
            }
            Ok(cost)
        })
        .try_reduce(|| 0, |a, b| Ok(a + b))
}

fn workers_in_use(model: &Model) -> Result<usize, BenchError> {
    let mut in_use = BTreeSet::new();
    for &t in &model.tasks {
        if let Some(worker) = model.scope.function("workerOf").map(&[t])? {
            in_use.insert(worker);
        }
    }
    Ok(in_use.len())
}

fn apply_move(model: &Model, rng: &mut StdRng) -> Result<(), BenchError> {
    let t = model.tasks[rng.gen_range(0..model.tasks.len())];
    let target = pick_worker(&model.workers, rng);

    let task = model
        .scope
        .handle_with(t, Relations::default())
        .ok_or(BenchError::MissingHandle(t))?;
    let target = match target {
        0 => None,
        w => Some(model.scope.handle(w).ok_or(BenchError::MissingHandle(w))?),
    };
    Fields::new(&*model.memory, &task).set_reference(guest::task::WORKER, target.as_deref())?;
    Ok(())
}

pub fn run(options: &BenchOptions) -> Result<BenchReport, BenchError> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let model = build_model(options, &mut rng)?;
    debug!(
        tasks = options.tasks,
        workers = options.workers,
        memoize = options.config.memoize,
        "bench model built"
    );

    let started = Instant::now();
    let mut checksum = 0i64;
    let mut final_score = 0;
    for _ in 0..options.iterations {
        if !model.tasks.is_empty() {
            final_score = score(&model)?;
            checksum = checksum.wrapping_add(final_score);
            apply_move(&model, &mut rng)?;
        }
    }
    let workers_in_use = workers_in_use(&model)?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let report = BenchReport {
        memoize: options.config.memoize,
        tasks: options.tasks,
        workers: options.workers,
        iterations: options.iterations,
        final_score,
        checksum,
        workers_in_use,
        guest_calls: model.guest.calls(),
        elapsed_ms,
        metrics: model.scope.metrics(),
        cache: model.scope.stats(),
    };
    info!(calls = report.guest_calls, elapsed_ms, "bench finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(memoize: bool) -> BenchOptions {
        BenchOptions {
            tasks: 40,
            workers: 4,
            iterations: 25,
            seed: 11,
            config: MemoConfig {
                memoize,
                ..MemoConfig::default()
            },
        }
    }

    #[test]
    fn memoized_run_matches_direct_run() {
        let direct = run(&small(false)).expect("direct run");
        let memoized = run(&small(true)).expect("memoized run");

        assert_eq!(direct.checksum, memoized.checksum);
        assert_eq!(direct.final_score, memoized.final_score);
        assert_eq!(direct.workers_in_use, memoized.workers_in_use);
        assert!(memoized.workers_in_use <= 4);
        assert_eq!(direct.metrics.hits, 0);
        assert!(memoized.metrics.hits > 0);
        assert!(memoized.guest_calls < direct.guest_calls);
    }

    #[test]
    fn empty_model_is_a_no_op() {
        let report = run(&BenchOptions {
            tasks: 0,
            ..small(true)
        })
        .expect("run");
        assert_eq!(report.final_score, 0);
        assert_eq!(report.guest_calls, 0);
    }
}
