//! Asynchronous, last-request-wins layout recomputation.
//!
//! Every request takes the next generation number. The coordinate solve runs on the blocking
//! pool under a timeout; its result is published only if no newer request has been issued
//! in the meantime and nothing newer is already published. Superseded results are dropped.
//!
//! At most one solve occupies the blocking pool at a time. A new request raises the cancel
//! flag of the solve in flight, and a timed-out solve has its flag raised too, so the slot
//! frees as soon as the solver notices.

use crate::config::LayoutConfig;
use crate::layout::{
    CancelFlag, CoordinateSolver, SolveRequest, SolvedPositions, SolverError, run_solver,
};
use crate::model::{ExpansionState, Snapshot};
use crate::pipeline::{PreparedTopology, Topology, prepare_topology};
use crate::visibility::Filters;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CommittedTopology {
    pub generation: u64,
    pub topology: Topology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Committed { generation: u64 },
    Superseded { generation: u64, latest: u64 },
}

pub type TopologyReceiver = watch::Receiver<Option<Arc<CommittedTopology>>>;

struct Inner {
    solver: Arc<dyn CoordinateSolver>,
    config: LayoutConfig,
    latest: AtomicU64,
    committed: watch::Sender<Option<Arc<CommittedTopology>>>,
    solve_slot: Arc<Semaphore>,
    /// Generation and cancel flag of the newest request that has a solve to run.
    in_flight: Mutex<Option<(u64, CancelFlag)>>,
}

#[derive(Clone)]
pub struct LayoutScheduler {
    inner: Arc<Inner>,
}

/// Handle on one in-flight request.
#[derive(Debug)]
pub struct LayoutTicket {
    pub generation: u64,
    handle: JoinHandle<RequestOutcome>,
}

impl LayoutTicket {
    pub async fn wait(self) -> Result<RequestOutcome, JoinError> {
        self.handle.await
    }
}

impl LayoutScheduler {
    pub fn new(solver: Arc<dyn CoordinateSolver>, config: LayoutConfig) -> Self {
        let (committed, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                solver,
                config,
                latest: AtomicU64::new(0),
                committed,
                solve_slot: Arc::new(Semaphore::new(1)),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> TopologyReceiver {
        self.inner.committed.subscribe()
    }

    pub fn current(&self) -> Option<Arc<CommittedTopology>> {
        self.inner.committed.borrow().clone()
    }

    pub fn latest_generation(&self) -> u64 {
        self.inner.latest.load(Ordering::SeqCst)
    }

    /// Issues a new request. The pure stages run on the caller; the solve is spawned.
    /// Must be called from within a tokio runtime.
    pub fn request(
        &self,
        snapshot: &Snapshot,
        filters: &Filters,
        expansion: &ExpansionState,
    ) -> LayoutTicket {
        let generation = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let prepared = prepare_topology(snapshot, filters, expansion, &self.inner.config);
        if let Some(request) = prepared.plan.request() {
            self.inner.track(generation, request.cancel.clone());
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.solve_and_commit(generation, prepared).await });
        debug!(generation, "layout requested");
        LayoutTicket { generation, handle }
    }
}

impl Inner {
    /// Records `cancel` as the solve in flight and cancels whichever of it and the previous
    /// one is older.
    fn track(&self, generation: u64, cancel: CancelFlag) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let newer_tracked = in_flight
            .as_ref()
            .is_some_and(|(current, _)| *current > generation);
        if newer_tracked {
            cancel.cancel();
            return;
        }
        if let Some((_, previous)) = in_flight.replace((generation, cancel)) {
            previous.cancel();
        }
    }

    fn superseded(&self, generation: u64) -> Option<RequestOutcome> {
        let latest = self.latest.load(Ordering::SeqCst);
        (latest != generation).then_some(RequestOutcome::Superseded { generation, latest })
    }

    async fn solve_and_commit(&self, generation: u64, prepared: PreparedTopology) -> RequestOutcome {
        if let Some(outcome) = self.superseded(generation) {
            debug!(generation, "layout request superseded before solving");
            return outcome;
        }

        let PreparedTopology { plan, decoration } = prepared;
        let layout = match plan.request().cloned() {
            None => plan.finish_unsolved(),
            Some(request) => {
                let name = self.solver.name();
                let solved = self.solve(generation, request).await;
                if let Some(outcome) = self.superseded(generation) {
                    debug!(generation, "layout request superseded while solving");
                    return outcome;
                }
                plan.finish(name, solved)
            }
        };
        let topology = decoration.apply(layout);

        if let Some(outcome) = self.superseded(generation) {
            debug!(generation, "discarding superseded layout");
            return outcome;
        }
        let committed = self.committed.send_if_modified(|current| {
            let newer_committed = current
                .as_ref()
                .is_some_and(|existing| existing.generation >= generation);
            if newer_committed || self.latest.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = Some(Arc::new(CommittedTopology {
                generation,
                topology,
            }));
            true
        });
        if committed {
            debug!(generation, "layout committed");
            RequestOutcome::Committed { generation }
        } else {
            RequestOutcome::Superseded {
                generation,
                latest: self.latest.load(Ordering::SeqCst),
            }
        }
    }

    /// Waits for the solve slot, then solves on the blocking pool. Both waits share one
    /// `solver_timeout_ms` budget.
    async fn solve(
        &self,
        generation: u64,
        request: SolveRequest,
    ) -> Result<SolvedPositions, SolverError> {
        let timeout_ms = self.config.solver_timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let cancel = request.cancel.clone();

        let slot = Arc::clone(&self.solve_slot).acquire_owned();
        let permit = match tokio::time::timeout_at(deadline, slot).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(closed)) => return Err(SolverError::Aborted(closed.to_string())),
            Err(_) => {
                cancel.cancel();
                warn!(generation, timeout_ms, "solve slot still busy");
                return Err(SolverError::TimedOut(timeout_ms));
            }
        };
        if cancel.is_cancelled() {
            return Err(SolverError::Cancelled {
                solver: self.solver.name(),
            });
        }

        let solver = Arc::clone(&self.solver);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_solver(solver.as_ref(), &request)
        });
        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(SolverError::Aborted(err.to_string())),
            Err(_) => {
                cancel.cancel();
                warn!(generation, timeout_ms, "coordinate solve timed out");
                Err(SolverError::TimedOut(timeout_ms))
            }
        }
    }
}
