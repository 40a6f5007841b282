//! An in-process guest module over [`LinearMemory`], laid out like a small
//! task-assignment model. Used by the `bench` command and the tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::invoke::{GuestInvoker, InvokeError};
use crate::memory::{GuestMemory, LinearMemory, MemoryError};

/// Task fields: assigned worker pointer, duration, start time.
pub mod task {
    pub const WORKER: u32 = 0;
    pub const DURATION: u32 = 4;
    pub const START: u32 = 8;
    pub const SIZE: usize = 16;
}

/// Worker fields: id and per-task speed factor.
pub mod worker {
    pub const ID: u32 = 0;
    pub const SPEED: u32 = 4;
    pub const SIZE: usize = 8;
}

pub const EXPORTS: [&str; 9] = [
    "isAssigned",
    "duration",
    "workerOf",
    "endTime",
    "sameWorker",
    "overlap",
    "compareWorkers",
    "workerHash",
    "busiest",
];

pub struct SyntheticGuest {
    memory: Arc<LinearMemory>,
    calls: AtomicU64,
}

impl SyntheticGuest {
    pub fn new(memory: Arc<LinearMemory>) -> Self {
        Self {
            memory,
            calls: AtomicU64::new(0),
        }
    }

    pub const fn memory(&self) -> &Arc<LinearMemory> {
        &self.memory
    }

    /// Number of export invocations served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn worker_of(&self, t: u32) -> Result<u32, MemoryError> {
        self.memory.read_u32(field(t, task::WORKER))
    }

    fn effective_duration(&self, t: u32) -> Result<i64, MemoryError> {
        let base = i64::from(self.memory.read_i32(field(t, task::DURATION))?);
        match self.worker_of(t)? {
            0 => Ok(base),
            w => Ok(base * i64::from(self.memory.read_i32(field(w, worker::SPEED))?)),
        }
    }

    fn end_time(&self, t: u32) -> Result<i64, MemoryError> {
        Ok(self.memory.read_i64(field(t, task::START))? + self.effective_duration(t)?)
    }

    fn overlap(&self, a: u32, b: u32) -> Result<i64, MemoryError> {
        let shared = self.worker_of(a)?;
        if shared == 0 || shared != self.worker_of(b)? {
            return Ok(0);
        }
        let start = self
            .memory
            .read_i64(field(a, task::START))?
            .max(self.memory.read_i64(field(b, task::START))?);
        let end = self.end_time(a)?.min(self.end_time(b)?);
        Ok((end - start).max(0))
    }

    fn dispatch(&self, name: &str, args: &[u32]) -> Result<i64, MemoryError> {
        let value = match (name, args) {
            ("isAssigned", &[t]) => i64::from(self.worker_of(t)? != 0),
            ("duration", &[t]) => self.effective_duration(t)?,
            ("workerOf", &[t]) => i64::from(self.worker_of(t)?),
            ("endTime", &[t]) => self.end_time(t)?,
            ("sameWorker", &[a, b]) => {
                let assigned = self.worker_of(a)?;
                i64::from(assigned != 0 && assigned == self.worker_of(b)?)
            }
            ("overlap", &[a, b]) => self.overlap(a, b)?,
            ("compareWorkers", &[a, b]) => {
                let left = self.memory.read_i32(field(a, worker::ID))?;
                let right = self.memory.read_i32(field(b, worker::ID))?;
                i64::from(left.cmp(&right) as i8)
            }
            ("workerHash", &[w]) => i64::from(self.memory.read_i32(field(w, worker::ID))?),
            // Worker of the longest assigned task among five.
            ("busiest", &[t1, t2, t3, t4, t5]) => {
                let mut best = (0u32, i64::MIN);
                for t in [t1, t2, t3, t4, t5] {
                    let assigned = self.worker_of(t)?;
                    if assigned != 0 {
                        let load = self.effective_duration(t)?;
                        if load > best.1 {
                            best = (assigned, load);
                        }
                    }
                }
                i64::from(best.0)
            }
            _ => 0,
        };
        Ok(value)
    }
}

// Saturates so that a wild pointer fails the bounds check instead of wrapping.
const fn field(base: u32, offset: u32) -> u32 {
    base.saturating_add(offset)
}

fn arity(name: &str) -> Option<usize> {
    match name {
        "isAssigned" | "duration" | "workerOf" | "endTime" | "workerHash" => Some(1),
        "sameWorker" | "overlap" | "compareWorkers" => Some(2),
        "busiest" => Some(5),
        _ => None,
    }
}

impl GuestInvoker for SyntheticGuest {
    fn invoke(&self, name: &str, args: &[u32]) -> Result<i64, InvokeError> {
        let expected = arity(name).ok_or_else(|| InvokeError::missing_export(name, EXPORTS))?;
        if args.len() != expected {
            return Err(InvokeError::ArgumentCount {
                name: name.to_string(),
                expected,
                actual: args.len(),
            });
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        if args.contains(&0) {
            return Err(InvokeError::Trap {
                name: name.to_string(),
                message: "null pointer dereference".to_string(),
            });
        }
        self.dispatch(name, args).map_err(|error| InvokeError::Trap {
            name: name.to_string(),
            message: error.to_string(),
        })
    }
}
