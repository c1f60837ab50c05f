//! Execution queue: one task at a time against the shared kernel session.
//!
//! Tasks run in FIFO admission order. A single worker drains the queue;
//! admission and cancellation are synchronous entry points that only touch
//! the shared state inside short critical sections.
//!
//! ```text
//!   enqueue ──▶ [ T1 | T2 | T3 ]  ──worker──▶ StreamingExecutor ──▶ presenter
//!                 ▲                    │
//!   cancel/clear ─┴── tombstones ◀─────┘ checked after every suspension
//! ```
//!
//! # Cancellation
//!
//! There is no interrupt for an in-flight kernel call. Cancelling a task
//! adds its id to a tombstone set; the worker checks membership after every
//! await and stops honouring results for a tombstoned id. Tombstones are
//! never removed, which makes `cancel` idempotent and safe for unknown ids.
//! Output rendered before the cancellation stays rendered.
//!
//! Tombstoned tasks are removed from the list eagerly by `cancel`/`clear`,
//! and lazily by the worker if one is still found at the head.
//!
//! # Admission
//!
//! A task is not claimable until its "executing"/"queued" render has
//! returned, so no result for it can be rendered ahead of that call. A
//! worker that reaches a head still being admitted waits on a `Notify`.
//!
//! # Locking
//!
//! State sits behind a `parking_lot::Mutex` that is never held across an
//! `.await`. The worker slot is claimed under the same lock admission
//! checks, so at most one worker (and so one executing task) exists.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};

use futures::StreamExt;
use inline_repl_types::{
    DocumentKey, ExecutionOutput, ExecutionTask, QueueStatusSnapshot, SourceRange, TaskId,
    TaskStatus,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::ReplContext;
use crate::config::ReplConfig;
use crate::error::{ExecutionError, QueueError};
use crate::executor::StreamingExecutor;
use crate::presenter::{ResultPresenter, StatusPresenter};
use crate::session::KernelManager;

/// Capacity of the task event channel.
const EVENT_CAPACITY: usize = 256;

/// Task lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    StatusChanged { id: TaskId, status: TaskStatus },
    /// An unclassified failure escaped the task. Cleanup already ran.
    Faulted { id: TaskId, error: String },
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<ExecutionTask>,
    tombstones: HashSet<TaskId>,
    /// A worker owns the processing loop.
    worker_active: bool,
    /// Task currently between "executing" and cleanup.
    executing: Option<TaskId>,
    /// Queued tasks whose admission render has not returned yet.
    admitting: HashSet<TaskId>,
}

impl QueueState {
    fn is_tombstoned(&self, id: TaskId) -> bool {
        self.tombstones.contains(&id)
    }

    fn knows(&self, id: TaskId) -> bool {
        self.is_tombstoned(id) || self.tasks.iter().any(|t| t.id == id)
    }

    fn active_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| !self.tombstones.contains(&t.id))
            .count()
    }

    fn has_live_task(&self) -> bool {
        self.active_count() > 0
    }

    /// Tombstone and remove every task from `document`.
    fn evict_document(&mut self, document: &DocumentKey) -> Vec<TaskId> {
        let mut evicted = Vec::new();
        let tombstones = &mut self.tombstones;
        self.tasks.retain(|task| {
            if &task.origin.document == document {
                tombstones.insert(task.id);
                evicted.push(task.id);
                false
            } else {
                true
            }
        });
        evicted
    }
}

/// Result of looking at the queue head.
enum Claim {
    /// The claimed task, or `None` when the queue drained.
    Next(Option<ExecutionTask>),
    /// The head is still being admitted.
    Admitting(TaskId),
}

/// How one task's execution ended.
enum Outcome {
    Finished,
    Cancelled,
    Failed(ExecutionError),
}

// ============================================================================
// ExecutionQueue
// ============================================================================

struct QueueInner {
    state: Mutex<QueueState>,
    /// Signalled whenever an admission render returns.
    admitted: Notify,
    executor: StreamingExecutor,
    presenter: Arc<dyn ResultPresenter>,
    status_presenter: Arc<dyn StatusPresenter>,
    kernels: Arc<KernelManager>,
    config: watch::Receiver<ReplConfig>,
    status: watch::Sender<QueueStatusSnapshot>,
    events: broadcast::Sender<TaskEvent>,
}

/// FIFO scheduler for code execution. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

impl ExecutionQueue {
    /// Build a queue from the context's kernel manager, config, and the
    /// profile's classifier.
    pub fn new(
        ctx: &ReplContext,
        presenter: Arc<dyn ResultPresenter>,
        status_presenter: Arc<dyn StatusPresenter>,
    ) -> Self {
        let executor = StreamingExecutor::new(Arc::clone(&ctx.kernels), ctx.profile.classifier());
        Self::with_executor(ctx, executor, presenter, status_presenter)
    }

    /// Build a queue around an existing executor.
    pub fn with_executor(
        ctx: &ReplContext,
        executor: StreamingExecutor,
        presenter: Arc<dyn ResultPresenter>,
        status_presenter: Arc<dyn StatusPresenter>,
    ) -> Self {
        let (status, _) = watch::channel(QueueStatusSnapshot {
            kernel_status: ctx.kernels.status(),
            ..Default::default()
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                admitted: Notify::new(),
                executor,
                presenter,
                status_presenter,
                kernels: Arc::clone(&ctx.kernels),
                config: ctx.config.subscribe(),
                status,
                events,
            }),
        }
    }

    // ── Admission ────────────────────────────────────────────────────────

    /// Admit a task.
    ///
    /// With clear-on-submit enabled, pending tasks from the same document
    /// are cancelled and its results cleared first. Starts a worker when
    /// none is active.
    pub async fn enqueue(&self, mut task: ExecutionTask) -> Result<(), QueueError> {
        task.status = TaskStatus::Queued;
        let id = task.id;
        let origin = task.origin.clone();

        let clear_on_submit = self.inner.config.borrow().clear_on_submit;
        if clear_on_submit {
            let evicted = {
                let mut state = self.inner.state.lock();
                if state.knows(id) {
                    return Err(QueueError::DuplicateTask(id));
                }
                state.evict_document(&origin.document)
            };
            if !evicted.is_empty() {
                info!(document = %origin.document, count = evicted.len(), "clearing document before submit");
                for evicted_id in evicted {
                    self.emit(TaskEvent::StatusChanged {
                        id: evicted_id,
                        status: TaskStatus::Cancelled,
                    });
                }
                self.publish_status();
                self.inner.presenter.clear_results(&origin.document).await;
            }
        }

        let start_worker = {
            let mut state = self.inner.state.lock();
            if state.knows(id) {
                return Err(QueueError::DuplicateTask(id));
            }
            state.tasks.push_back(task);
            state.admitting.insert(id);
            let start = !state.worker_active;
            state.worker_active = true;
            start
        };

        debug!(task = %id, origin = %origin, "task queued");
        self.emit(TaskEvent::StatusChanged {
            id,
            status: TaskStatus::Queued,
        });
        self.publish_status();

        if start_worker {
            self.inner.presenter.render_executing(&origin).await;
        } else {
            self.inner.presenter.render_queued(&origin).await;
        }

        self.inner.state.lock().admitting.remove(&id);
        self.inner.admitted.notify_waiters();
        if start_worker {
            self.spawn_worker();
        }
        Ok(())
    }

    // ── Cancellation ─────────────────────────────────────────────────────

    /// Cancel a task. Idempotent; unknown ids are tombstoned too.
    pub fn cancel(&self, id: TaskId) {
        let was_live = {
            let mut state = self.inner.state.lock();
            let removed = match state.tasks.iter().position(|t| t.id == id) {
                Some(pos) => state.tasks.remove(pos).is_some(),
                None => false,
            };
            let newly = state.tombstones.insert(id);
            newly && (removed || state.executing == Some(id))
        };

        if was_live {
            info!(task = %id, "task cancelled");
            self.emit(TaskEvent::StatusChanged {
                id,
                status: TaskStatus::Cancelled,
            });
        }
        self.publish_status();
    }

    /// Cancel every queued task, including the one executing.
    ///
    /// The in-flight kernel call keeps running; its results are dropped.
    pub fn clear(&self) {
        let cleared: Vec<TaskId> = {
            let mut state = self.inner.state.lock();
            let ids: Vec<TaskId> = state.tasks.drain(..).map(|t| t.id).collect();
            ids.into_iter()
                .filter(|id| state.tombstones.insert(*id))
                .collect()
        };

        if !cleared.is_empty() {
            info!(count = cleared.len(), "queue cleared");
        }
        for id in cleared {
            self.emit(TaskEvent::StatusChanged {
                id,
                status: TaskStatus::Cancelled,
            });
        }
        self.publish_status();
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Tasks (any status) whose origin range equals `range`.
    pub fn find_by_origin(&self, range: &SourceRange) -> Vec<ExecutionTask> {
        self.inner
            .state
            .lock()
            .tasks
            .iter()
            .filter(|t| t.origin.range == *range)
            .cloned()
            .collect()
    }

    pub fn is_cancelled(&self, id: TaskId) -> bool {
        self.inner.state.lock().is_tombstoned(id)
    }

    pub fn snapshot(&self) -> QueueStatusSnapshot {
        let state = self.inner.state.lock();
        QueueStatusSnapshot {
            is_executing: state.executing.is_some(),
            active_task_count: state.active_count(),
            kernel_status: self.inner.kernels.status(),
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<QueueStatusSnapshot> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve once nothing is executing and no live task is waiting.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe_status();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(QueueStatusSnapshot::is_idle).await;
    }

    /// Republish the status on every kernel status change.
    ///
    /// The observer holds only a weak reference and stops once the queue is
    /// dropped or the kernel manager's channel closes.
    pub fn watch_kernel_status(&self) -> JoinHandle<()> {
        let mut rx = self.inner.kernels.subscribe();
        let queue: Weak<QueueInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(inner) = queue.upgrade() else {
                    break;
                };
                ExecutionQueue { inner }.publish_status();
            }
        })
    }

    // ── Processing ───────────────────────────────────────────────────────

    /// Run a processing pass.
    ///
    /// Returns immediately when a worker is already active. An unclassified
    /// failure is returned to the caller after the failing task's cleanup;
    /// remaining tasks continue on a fresh worker.
    pub async fn process_queue(&self) -> Result<(), ExecutionError> {
        {
            let mut state = self.inner.state.lock();
            if state.worker_active {
                return Ok(());
            }
            state.worker_active = true;
        }
        self.run_worker().await
    }

    /// Spawn a supervised worker. The caller must hold the worker slot.
    fn spawn_worker(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            if let Err(err) = queue.run_worker().await {
                error!(error = %err, "unclassified execution failure");
            }
        });
    }

    /// Drain the queue. Runs with the worker slot held and releases it on
    /// every exit path.
    async fn run_worker(&self) -> Result<(), ExecutionError> {
        loop {
            let Some(task) = self.claim_next().await else {
                return Ok(());
            };

            let outcome = self.execute_task(&task).await;
            let continue_worker = self.finish_task(&task, &outcome);

            if let Outcome::Failed(err) = outcome {
                if continue_worker {
                    self.spawn_worker();
                }
                return Err(err);
            }
            if !continue_worker {
                return Ok(());
            }
        }
    }

    /// Claim the next live task, waiting out a head that is still being
    /// admitted.
    async fn claim_next(&self) -> Option<ExecutionTask> {
        loop {
            let admitted = self.inner.admitted.notified();
            tokio::pin!(admitted);
            // Register before looking, so a render returning in between is not missed.
            admitted.as_mut().enable();

            match self.claim_head() {
                Claim::Next(task) => return task,
                Claim::Admitting(id) => {
                    debug!(task = %id, "waiting for admission render");
                    admitted.await;
                }
            }
        }
    }

    /// Pop tombstoned heads and mark the next live task executing.
    /// Releases the worker slot when nothing is left.
    fn claim_head(&self) -> Claim {
        let (task, dropped) = {
            let mut state = self.inner.state.lock();
            let mut dropped = 0usize;
            loop {
                let Some(head) = state.tasks.front() else {
                    state.worker_active = false;
                    break (None, dropped);
                };
                let id = head.id;
                if state.is_tombstoned(id) {
                    state.tasks.pop_front();
                    dropped += 1;
                    continue;
                }
                if state.admitting.contains(&id) {
                    return Claim::Admitting(id);
                }
                state.executing = Some(id);
                let head = state.tasks.front_mut().map(|t| {
                    t.status = TaskStatus::Executing;
                    t.clone()
                });
                break (head, dropped);
            }
        };

        if dropped > 0 {
            debug!(count = dropped, "dropped cancelled tasks from queue head");
        }
        if let Some(task) = &task {
            info!(task = %task.id, origin = %task.origin, "task executing");
            self.emit(TaskEvent::StatusChanged {
                id: task.id,
                status: TaskStatus::Executing,
            });
        }
        self.publish_status();
        Claim::Next(task)
    }

    /// Stream one task's output to the presenter.
    ///
    /// Tombstone membership is re-checked after every suspension point.
    async fn execute_task(&self, task: &ExecutionTask) -> Outcome {
        let presenter = &self.inner.presenter;

        let mut stream = match self.inner.executor.execute(&task.code) {
            Ok(stream) => stream,
            Err(err) => return self.fail(task, err).await,
        };

        let mut outputs: Vec<ExecutionOutput> = Vec::new();
        while let Some(batch) = stream.next().await {
            if self.is_cancelled(task.id) {
                debug!(task = %task.id, "discarding output of cancelled task");
                return Outcome::Cancelled;
            }
            match batch {
                Ok(batch) => {
                    outputs.extend(batch);
                    presenter.render_result(&outputs, &task.origin, true).await;
                }
                Err(err) => {
                    drop(stream);
                    return self.fail(task, err).await;
                }
            }
        }
        drop(stream);

        if self.is_cancelled(task.id) {
            return Outcome::Cancelled;
        }
        if outputs.is_empty() {
            presenter.render_complete(&task.origin).await;
        } else {
            presenter.render_result(&outputs, &task.origin, false).await;
        }
        Outcome::Finished
    }

    /// Render recoverable failures; hand everything else back.
    async fn fail(&self, task: &ExecutionTask, err: ExecutionError) -> Outcome {
        if !err.is_recoverable() {
            return Outcome::Failed(err);
        }
        if self.is_cancelled(task.id) {
            return Outcome::Cancelled;
        }
        warn!(task = %task.id, error = %err, "execution failed");
        self.inner.presenter.render_error(&task.origin, &err).await;
        Outcome::Finished
    }

    /// Cleanup after a task, on every exit path. Returns whether the worker
    /// should keep going; if not, the worker slot has been released.
    fn finish_task(&self, task: &ExecutionTask, outcome: &Outcome) -> bool {
        let (status, keep_going) = {
            let mut state = self.inner.state.lock();
            state.executing = None;
            let cancelled = state.is_tombstoned(task.id);
            if !cancelled {
                if let Some(pos) = state.tasks.iter().position(|t| t.id == task.id) {
                    state.tasks.remove(pos);
                }
            }
            let keep_going = state.has_live_task();
            if !keep_going {
                state.worker_active = false;
            }
            let status = if cancelled {
                TaskStatus::Cancelled
            } else {
                TaskStatus::Completed
            };
            (status, keep_going)
        };

        match outcome {
            Outcome::Finished => info!(task = %task.id, "task completed"),
            Outcome::Cancelled => debug!(task = %task.id, "cancelled task finished"),
            Outcome::Failed(err) => warn!(task = %task.id, error = %err, "task faulted"),
        }
        // Cancellation was already announced by cancel/clear/evict.
        if status == TaskStatus::Completed {
            self.emit(TaskEvent::StatusChanged {
                id: task.id,
                status,
            });
        }
        if let Outcome::Failed(err) = outcome {
            self.emit(TaskEvent::Faulted {
                id: task.id,
                error: err.to_string(),
            });
        }
        self.publish_status();
        keep_going
    }

    // ── Publishing ───────────────────────────────────────────────────────

    fn publish_status(&self) {
        let snapshot = self.snapshot();
        self.inner.status_presenter.update_status(&snapshot);
        self.inner.status.send_replace(snapshot);
    }

    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

#[cfg(test)]
impl ExecutionQueue {
    /// Put a task in the list without admitting it or starting a worker.
    fn stage(&self, task: ExecutionTask, cancelled: bool) {
        let mut state = self.inner.state.lock();
        if cancelled {
            state.tombstones.insert(task.id);
        }
        state.tasks.push_back(task);
    }

    fn is_worker_active(&self) -> bool {
        self.inner.state.lock().worker_active
    }

    fn queued_len(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
