//! Concurrent throughput harness
//!
//! Starts one worker thread per connection. Each worker connects, issues a
//! fixed number of sequential calls and closes. The harness joins every
//! worker before computing throughput, and a failing worker only ends its
//! own run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rmpv::Value;
use tracing::{info, warn};

use crate::rpc::client::call;
use crate::rpc::codec::RpcResult;
use crate::rpc::common::{Result, RpcError};
use crate::rpc::connection::Connection;
use crate::rpc::transport::Transport;

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of concurrent workers, one connection each (default: 7)
    pub workers: usize,
    /// Sequential calls per worker (default: 100000)
    pub calls_per_worker: u64,
    /// Remote function called by every worker
    pub method: String,
    /// Arguments passed on every call
    pub args: Vec<Value>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workers: 7,
            calls_per_worker: 100_000,
            method: "getSecurityInfo".to_string(),
            args: vec![Value::from("SPBFUT"), Value::from("SBER")],
        }
    }
}

/// Outcome of one worker
#[derive(Debug)]
pub struct WorkerReport {
    pub id: usize,
    pub calls_completed: u64,
    pub elapsed: Duration,
    /// First error that ended this worker, if any
    pub error: Option<RpcError>,
}

impl WorkerReport {
    fn failed(id: usize, error: RpcError) -> Self {
        Self {
            id,
            calls_completed: 0,
            elapsed: Duration::ZERO,
            error: Some(error),
        }
    }
}

/// Aggregate outcome of a harness run
#[derive(Debug)]
pub struct HarnessReport {
    pub workers: Vec<WorkerReport>,
    /// Wall-clock time from first spawn to last join
    pub elapsed: Duration,
    total_calls: u64,
}

impl HarnessReport {
    /// Calls completed across all workers
    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    /// Completed calls per wall-clock second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_calls as f64 / secs
        } else {
            0.0
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = (usize, &RpcError)> {
        self.workers
            .iter()
            .filter_map(|w| w.error.as_ref().map(|e| (w.id, e)))
    }

    pub fn is_success(&self) -> bool {
        self.errors().next().is_none()
    }
}

/// Run the harness. `factory` builds the connection for a worker id and is
/// called on that worker's thread.
///
/// Every reply is decoded into `R`; a reply of another shape ends the
/// worker with a decoding error instead of counting as a completed call.
pub fn run<R, T, F>(config: &HarnessConfig, factory: F) -> HarnessReport
where
    R: RpcResult,
    T: Transport,
    F: Fn(usize) -> Result<Connection<T>> + Sync,
{
    info!(
        "Starting {} workers x {} calls of {}",
        config.workers, config.calls_per_worker, config.method
    );

    let completed = AtomicU64::new(0);
    let started = Instant::now();

    let workers = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.workers)
            .map(|id| {
                let factory = &factory;
                let completed = &completed;
                thread::Builder::new()
                    .name(format!("rpc-worker-{}", id))
                    .spawn_scoped(scope, move || run_worker::<R, T, F>(id, config, factory, completed))
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(id, handle)| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| WorkerReport::failed(id, RpcError::WorkerPanicked(id))),
                Err(e) => WorkerReport::failed(
                    id,
                    RpcError::WorkerSpawn {
                        worker: id,
                        reason: e.to_string(),
                    },
                ),
            })
            .collect::<Vec<_>>()
    });

    let report = HarnessReport {
        workers,
        elapsed: started.elapsed(),
        total_calls: completed.load(Ordering::Acquire),
    };
    info!(
        "Harness finished: {} calls in {:.3}s, {:.0} calls/s, {} failed workers",
        report.total_calls(),
        report.elapsed.as_secs_f64(),
        report.throughput(),
        report.errors().count()
    );
    report
}

fn run_worker<R, T, F>(id: usize, config: &HarnessConfig, factory: &F, completed: &AtomicU64) -> WorkerReport
where
    R: RpcResult,
    T: Transport,
    F: Fn(usize) -> Result<Connection<T>>,
{
    let started = Instant::now();
    let mut calls_completed = 0;

    let error = match factory(id) {
        Err(e) => Some(e),
        Ok(mut connection) => {
            let result = drive::<R, T>(&mut connection, config, &mut calls_completed, completed);
            let closed = connection.close();
            result.and(closed).err()
        }
    };

    if let Some(e) = &error {
        warn!("Worker {} stopped after {} calls: {}", id, calls_completed, e);
    }

    WorkerReport {
        id,
        calls_completed,
        elapsed: started.elapsed(),
        error,
    }
}

fn drive<R: RpcResult, T: Transport>(
    connection: &mut Connection<T>,
    config: &HarnessConfig,
    calls_completed: &mut u64,
    completed: &AtomicU64,
) -> Result<()> {
    connection.connect()?;
    for _ in 0..config.calls_per_worker {
        call::<T, R>(connection, &config.method, &config.args)?;
        *calls_completed += 1;
        completed.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}
