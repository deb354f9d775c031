//! # Worker Pool and Plan Scheduler
//!
//! ## Pool
//!
//! A bounded pool of `[core_threads, max_threads]` OS threads fed by a
//! zero-capacity channel: submission is a synchronous handoff that
//! blocks until some worker accepts the job. That gives natural
//! admission control: when every worker is busy and the pool is at its
//! ceiling, submitters wait. Core workers live forever; surplus workers
//! exit after `keep_alive` without work. A handoff that no worker
//! accepts within `keep_alive` fails the submission with `TaskTimeout`.
//!
//! ## Plan execution
//!
//! The scheduler drains ready tasks (all parents complete) into the
//! pool and re-evaluates dependents on every completion:
//!
//! - a task whose parent failed is not executed; it completes as
//!   `ParentFailed` and the failure cascades to its own descendants;
//! - cancellation marks not-yet-started tasks `TaskCancelled` while
//!   in-flight tasks run to completion; partial results are discarded;
//! - no ordering exists among sibling tasks beyond the declared edges.
//!
//! The root task's output is the query result.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use eyre::Result;
use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::error::DbError;
use crate::exec::plan::{ExecutionPlan, TaskId};
use crate::types::Recordset;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolShared {
    receiver: Receiver<Job>,
    live: AtomicUsize,
    core_threads: usize,
    max_threads: usize,
    keep_alive: Duration,
}

/// Bounded worker pool with synchronous handoff.
pub struct WorkerPool {
    sender: Sender<Job>,
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    pub fn new(core_threads: usize, max_threads: usize, keep_alive: Duration) -> Self {
        let core_threads = core_threads.max(1);
        let max_threads = max_threads.max(core_threads);
        let (sender, receiver) = bounded::<Job>(0);
        let shared = Arc::new(PoolShared {
            receiver,
            live: AtomicUsize::new(0),
            core_threads,
            max_threads,
            keep_alive,
        });
        let pool = Self { sender, shared };
        for _ in 0..core_threads {
            pool.spawn_worker(true);
        }
        pool
    }

    /// Pool sized from server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.core_threads, config.max_threads, config.keep_alive)
    }

    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    fn spawn_worker(&self, core: bool) {
        let shared = Arc::clone(&self.shared);
        shared.live.fetch_add(1, Ordering::AcqRel);
        std::thread::spawn(move || {
            loop {
                let job = if core {
                    match shared.receiver.recv() {
                        Ok(job) => job,
                        Err(_) => break,
                    }
                } else {
                    match shared.receiver.recv_timeout(shared.keep_alive) {
                        Ok(job) => job,
                        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                            break
                        }
                    }
                };
                job();
            }
            shared.live.fetch_sub(1, Ordering::AcqRel);
        });
    }

    /// Hands a job to a worker. Spawns a surplus worker when all are
    /// busy and the ceiling allows; otherwise blocks up to `keep_alive`
    /// for the handoff and fails with `TaskTimeout` on expiry.
    pub fn submit(&self, job: Job) -> Result<()> {
        let job = match self.sender.try_send(job) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(job)) => job,
            Err(TrySendError::Disconnected(_)) => {
                return Err(eyre::eyre!("worker pool is shut down"))
            }
        };

        // all workers busy: grow toward the ceiling, then hand off
        let live = self.shared.live.load(Ordering::Acquire);
        if live < self.shared.max_threads {
            self.spawn_worker(false);
        }
        match self.sender.send_timeout(job, self.shared.keep_alive) {
            Ok(()) => Ok(()),
            Err(_) => Err(DbError::TaskTimeout.into()),
        }
    }

    /// Executes a plan to completion and returns the root recordset.
    pub fn execute(&self, plan: &ExecutionPlan) -> Result<Arc<Recordset>> {
        self.execute_with(plan, &CancelFlag::new())
    }

    /// Executes a plan under an external cancellation flag.
    pub fn execute_with(&self, plan: &ExecutionPlan, cancel: &CancelFlag) -> Result<Arc<Recordset>> {
        let root = plan.root()?;
        let n = plan.len();
        debug!(tasks = n, cost = plan.total_cost(), "executing plan");

        let (done_tx, done_rx) = unbounded::<(TaskId, Result<Recordset>)>();
        let mut indegree: Vec<usize> = plan.nodes().iter().map(|node| node.parents.len()).collect();
        let mut results: Vec<Option<Arc<Recordset>>> = (0..n).map(|_| None).collect();
        let mut failed: Vec<bool> = vec![false; n];
        let mut completed = 0usize;

        // kick off sources
        for id in (0..n).map(TaskId) {
            if indegree[id.0] == 0 {
                self.dispatch(plan, id, &results, cancel, &done_tx)?;
            }
        }

        let mut root_error: Option<eyre::Report> = None;
        while completed < n {
            let (id, outcome) = done_rx
                .recv()
                .map_err(|_| eyre::eyre!("scheduler completion channel closed"))?;
            completed += 1;
            match outcome {
                Ok(recordset) => {
                    trace!(task = %id, rows = recordset.len(), "task complete");
                    results[id.0] = Some(Arc::new(recordset));
                }
                Err(e) => {
                    trace!(task = %id, error = %e, "task failed");
                    failed[id.0] = true;
                    if id == root {
                        root_error = Some(e);
                    }
                }
            }

            for &child in plan.children(id) {
                indegree[child.0] -= 1;
                if indegree[child.0] > 0 {
                    continue;
                }
                if let Some(&bad_parent) =
                    plan.parents(child).iter().find(|p| failed[p.0])
                {
                    // parent failure cascades without executing the child
                    done_tx
                        .send((
                            child,
                            Err(DbError::ParentFailed {
                                parent: bad_parent.0,
                            }
                            .into()),
                        ))
                        .ok();
                } else {
                    self.dispatch(plan, child, &results, cancel, &done_tx)?;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(DbError::TaskCancelled.into());
        }
        match results[root.0].take() {
            Some(recordset) => Ok(recordset),
            None => Err(root_error
                .unwrap_or_else(|| eyre::eyre!("root task produced no output"))),
        }
    }

    fn dispatch(
        &self,
        plan: &ExecutionPlan,
        id: TaskId,
        results: &[Option<Arc<Recordset>>],
        cancel: &CancelFlag,
        done_tx: &Sender<(TaskId, Result<Recordset>)>,
    ) -> Result<()> {
        let task = Arc::clone(plan.task(id));
        let inputs: Vec<Arc<Recordset>> = plan
            .parents(id)
            .iter()
            .map(|p| Arc::clone(results[p.0].as_ref().expect("parent completed")))
            .collect();
        let done_tx = done_tx.clone();
        let cancel = cancel.clone();
        self.submit(Box::new(move || {
            let outcome = if cancel.is_cancelled() {
                Err(DbError::TaskCancelled.into())
            } else {
                task.execute(&inputs)
            };
            done_tx.send((id, outcome)).ok();
        }))
        .map_err(|e| {
            warn!(task = %id, "submission failed");
            e
        })
    }
}

/// Cooperative cancellation flag shared between a plan's tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
