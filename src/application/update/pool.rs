//! Bounded pool of named OS threads draining a queue of update tasks.
//!
//! Each worker pops a task, runs it against its own storage session and
//! merges the task's local cache into the shared target. The calling thread
//! watches per-task deadlines: a task that overruns is abandoned, its late
//! result discarded, and a replacement worker keeps the queue draining.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::application::repos::ContentStore;
use crate::cache::lock::mutex_lock;
use crate::cache::{CacheConfig, ContentCache};

use super::error::{CacheUpdateError, ErrorCollector, UpdateFailure};
use super::task::UpdateTask;

const SOURCE: &str = "application::update::pool";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("failed to spawn worker `{name}`: {message}")]
    Spawn { name: String, message: String },
}

/// Outcome counts of one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks that passed their deadline; also counted in `failed`.
    pub abandoned: usize,
    pub workers_spawned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Pending,
    Running,
    Done,
    Abandoned,
}

struct PoolShared {
    tasks: Vec<Box<dyn UpdateTask>>,
    queue: Mutex<VecDeque<usize>>,
    slots: Vec<Mutex<SlotState>>,
    store: Arc<dyn ContentStore>,
    config: Arc<CacheConfig>,
    target: Arc<ContentCache>,
    errors: Arc<ErrorCollector>,
}

impl PoolShared {
    fn describe(&self, index: usize) -> (&str, &str) {
        let task = &self.tasks[index];
        (task.entity_kind().as_str(), task.identifier())
    }

    fn fail(&self, index: usize, operation: &'static str, cause: UpdateFailure) {
        let task = &self.tasks[index];
        self.errors.record(CacheUpdateError::new(
            task.entity_kind(),
            Some(task.identifier()),
            operation,
            cause,
        ));
    }
}

enum Event {
    Started {
        index: usize,
        worker: usize,
        at: Instant,
    },
    Finished {
        index: usize,
        succeeded: bool,
    },
    Exited {
        worker: usize,
    },
}

/// Reports the worker's exit even when it unwinds.
struct ExitNotice {
    worker: usize,
    events: Sender<Event>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Exited {
            worker: self.worker,
        });
    }
}

pub(crate) struct WorkerPool {
    label: &'static str,
    size: NonZeroUsize,
    deadline: Option<Duration>,
}

impl WorkerPool {
    /// `label` names the threads: `cache-{label}-{n}`.
    pub(crate) fn new(label: &'static str, size: NonZeroUsize, deadline: Option<Duration>) -> Self {
        Self {
            label,
            size,
            deadline,
        }
    }

    /// Runs every task and blocks until each one succeeded, failed, or was
    /// abandoned. Fails only when not a single worker could be started.
    pub(crate) fn run(
        &self,
        tasks: Vec<Box<dyn UpdateTask>>,
        store: Arc<dyn ContentStore>,
        config: Arc<CacheConfig>,
        target: Arc<ContentCache>,
        errors: Arc<ErrorCollector>,
    ) -> Result<PoolReport, PoolError> {
        let total = tasks.len();
        let mut report = PoolReport {
            tasks: total,
            ..PoolReport::default()
        };
        if total == 0 {
            return Ok(report);
        }

        let shared = Arc::new(PoolShared {
            slots: (0..total).map(|_| Mutex::new(SlotState::Pending)).collect(),
            queue: Mutex::new((0..total).collect()),
            tasks,
            store,
            config,
            target,
            errors,
        });
        let (events, inbox) = mpsc::channel();

        let mut handles: BTreeMap<usize, JoinHandle<()>> = BTreeMap::new();
        let mut live: BTreeSet<usize> = BTreeSet::new();
        let mut first_error = None;
        for _ in 0..self.size.get().min(total) {
            let worker = report.workers_spawned;
            match self.spawn_worker(&shared, worker, &events) {
                Ok(handle) => {
                    handles.insert(worker, handle);
                    live.insert(worker);
                    report.workers_spawned += 1;
                }
                Err(err) => {
                    warn!(pool = self.label, error = %err, "Cache worker could not be started");
                    first_error = Some(err);
                    break;
                }
            }
        }
        if let (true, Some(err)) = (live.is_empty(), first_error) {
            return Err(err);
        }

        let mut running: BTreeMap<usize, (usize, Instant)> = BTreeMap::new();
        let mut settled = 0;
        while settled < total {
            if live.is_empty() {
                self.fail_orphaned(&shared, &mut running, &mut report);
                break;
            }

            let event = match self.next_deadline(&running) {
                Some(deadline) => {
                    match inbox.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(event) => Some(event),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match inbox.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            match event {
                Some(Event::Started { index, worker, at }) => {
                    running.insert(index, (worker, at));
                }
                Some(Event::Finished { index, succeeded }) => {
                    running.remove(&index);
                    settled += 1;
                    if succeeded {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Some(Event::Exited { worker }) => {
                    live.remove(&worker);
                    if let Some(handle) = handles.remove(&worker) {
                        join_worker(self.label, worker, handle);
                    }
                }
                None => {
                    for worker in self.abandon_expired(&shared, &mut running, &mut report) {
                        settled += 1;
                        live.remove(&worker);
                        // Detached: the thread finishes its call and exits on its own.
                        handles.remove(&worker);
                        if pending_work(&shared) {
                            let replacement = report.workers_spawned;
                            match self.spawn_worker(&shared, replacement, &events) {
                                Ok(handle) => {
                                    handles.insert(replacement, handle);
                                    live.insert(replacement);
                                    report.workers_spawned += 1;
                                }
                                Err(err) => {
                                    warn!(pool = self.label, error = %err, "Replacement cache worker could not be started");
                                }
                            }
                        }
                    }
                }
            }
        }

        for (worker, handle) in handles {
            join_worker(self.label, worker, handle);
        }
        debug!(
            pool = self.label,
            tasks = report.tasks,
            succeeded = report.succeeded,
            failed = report.failed,
            abandoned = report.abandoned,
            workers = report.workers_spawned,
            "Cache worker pool drained"
        );
        Ok(report)
    }

    fn spawn_worker(
        &self,
        shared: &Arc<PoolShared>,
        worker: usize,
        events: &Sender<Event>,
    ) -> Result<JoinHandle<()>, PoolError> {
        let name = format!("cache-{}-{worker}", self.label);
        let shared = Arc::clone(shared);
        let events = events.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&shared, worker, events))
            .map_err(|err| PoolError::Spawn {
                name,
                message: err.to_string(),
            })
    }

    fn next_deadline(&self, running: &BTreeMap<usize, (usize, Instant)>) -> Option<Instant> {
        let deadline = self.deadline?;
        running
            .values()
            .map(|(_, started)| *started + deadline)
            .min()
    }

    /// Marks overdue tasks abandoned and returns the workers running them.
    fn abandon_expired(
        &self,
        shared: &PoolShared,
        running: &mut BTreeMap<usize, (usize, Instant)>,
        report: &mut PoolReport,
    ) -> Vec<usize> {
        let Some(deadline) = self.deadline else {
            return Vec::new();
        };
        let now = Instant::now();
        let expired: Vec<usize> = running
            .iter()
            .filter(|(_, (_, started))| now.duration_since(*started) >= deadline)
            .map(|(index, _)| *index)
            .collect();

        let mut workers = Vec::new();
        for index in expired {
            let Some((worker, _)) = running.remove(&index) else {
                continue;
            };
            let mut slot = mutex_lock(&shared.slots[index], SOURCE, "abandon");
            // Finished in the meantime; its event is still queued.
            if *slot != SlotState::Running {
                continue;
            }
            *slot = SlotState::Abandoned;
            drop(slot);

            let (kind, identifier) = shared.describe(index);
            warn!(
                pool = self.label,
                entity_kind = kind,
                identifier,
                deadline_ms = deadline.as_millis() as u64,
                "Abandoning cache update task past its deadline"
            );
            shared.fail(index, "execute", UpdateFailure::DeadlineExceeded(deadline));
            report.failed += 1;
            report.abandoned += 1;
            workers.push(worker);
        }
        workers
    }

    /// No worker is left: fails every task that is queued or was running on
    /// a worker that died.
    fn fail_orphaned(
        &self,
        shared: &PoolShared,
        running: &mut BTreeMap<usize, (usize, Instant)>,
        report: &mut PoolReport,
    ) {
        let mut orphaned: Vec<usize> = mutex_lock(&shared.queue, SOURCE, "drain")
            .drain(..)
            .collect();
        orphaned.extend(std::mem::take(running).into_keys());

        let mut settled = 0;
        for index in orphaned {
            let mut slot = mutex_lock(&shared.slots[index], SOURCE, "orphan");
            if matches!(*slot, SlotState::Done | SlotState::Abandoned) {
                continue;
            }
            *slot = SlotState::Abandoned;
            drop(slot);
            shared.fail(index, "schedule", UpdateFailure::NoWorker);
            report.failed += 1;
            settled += 1;
        }
        if settled > 0 {
            warn!(pool = self.label, tasks = settled, "Cache update tasks left without a worker");
        }
    }
}

fn pending_work(shared: &PoolShared) -> bool {
    !mutex_lock(&shared.queue, SOURCE, "peek").is_empty()
}

fn join_worker(label: &str, worker: usize, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!(pool = label, worker, "Cache worker terminated by a panic");
    }
}

fn worker_loop(shared: &PoolShared, worker: usize, events: Sender<Event>) {
    let _exit = ExitNotice {
        worker,
        events: events.clone(),
    };

    loop {
        let Some(index) = mutex_lock(&shared.queue, SOURCE, "pop").pop_front() else {
            break;
        };
        *mutex_lock(&shared.slots[index], SOURCE, "start") = SlotState::Running;
        if events
            .send(Event::Started {
                index,
                worker,
                at: Instant::now(),
            })
            .is_err()
        {
            break;
        }

        let task = &shared.tasks[index];
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            task.run(shared.store.as_ref(), &shared.config)
        }));

        let mut slot = mutex_lock(&shared.slots[index], SOURCE, "finish");
        if *slot == SlotState::Abandoned {
            let (kind, identifier) = shared.describe(index);
            debug!(entity_kind = kind, identifier, "Discarding result of abandoned task");
            break;
        }
        let succeeded = match result {
            Ok(Ok(local)) => {
                shared.target.merge_from(&local);
                true
            }
            Ok(Err(error)) => {
                shared.errors.record(error);
                false
            }
            Err(payload) => {
                shared.fail(index, "execute", UpdateFailure::Panicked(panic_message(&*payload)));
                false
            }
        };
        *slot = SlotState::Done;
        drop(slot);

        if events.send(Event::Finished { index, succeeded }).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::application::repos::{RepoError, StoreSession};
    use crate::cache::ReadableCache;
    use crate::domain::types::EntityKind;

    use super::*;

    struct NoStore;

    impl ContentStore for NoStore {
        fn open_session(&self) -> Result<Box<dyn StoreSession + '_>, RepoError> {
            Err(RepoError::Unavailable("no store in pool tests".into()))
        }
    }

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Sleep(Duration),
    }

    struct ScriptedTask {
        identifier: String,
        behavior: Behavior,
        runs: Arc<AtomicUsize>,
    }

    impl UpdateTask for ScriptedTask {
        fn entity_kind(&self) -> EntityKind {
            EntityKind::Procedure
        }

        fn identifier(&self) -> &str {
            &self.identifier
        }

        fn run(
            &self,
            _store: &dyn ContentStore,
            _config: &CacheConfig,
        ) -> Result<ContentCache, CacheUpdateError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed => {}
                Behavior::Fail => {
                    return Err(CacheUpdateError::new(
                        EntityKind::Procedure,
                        Some(&self.identifier),
                        "load_procedure",
                        RepoError::Timeout,
                    ));
                }
                Behavior::Panic => panic!("aggregation blew up for {}", self.identifier),
                Behavior::Sleep(duration) => thread::sleep(*duration),
            }
            let local = ContentCache::new();
            local.add_entity(EntityKind::Procedure, &self.identifier);
            Ok(local)
        }
    }

    fn scripted(
        runs: &Arc<AtomicUsize>,
        behaviors: Vec<(&str, Behavior)>,
    ) -> Vec<Box<dyn UpdateTask>> {
        behaviors
            .into_iter()
            .map(|(identifier, behavior)| {
                Box::new(ScriptedTask {
                    identifier: identifier.to_string(),
                    behavior,
                    runs: Arc::clone(runs),
                }) as Box<dyn UpdateTask>
            })
            .collect()
    }

    fn run_pool(
        size: usize,
        deadline: Option<Duration>,
        tasks: Vec<Box<dyn UpdateTask>>,
    ) -> (PoolReport, Arc<ContentCache>, Arc<ErrorCollector>) {
        let target = Arc::new(ContentCache::new());
        let errors = Arc::new(ErrorCollector::new());
        let pool = WorkerPool::new(
            "procedure",
            NonZeroUsize::new(size).expect("non-zero"),
            deadline,
        );
        let report = pool
            .run(
                tasks,
                Arc::new(NoStore),
                Arc::new(CacheConfig::default()),
                Arc::clone(&target),
                Arc::clone(&errors),
            )
            .expect("pool run");
        (report, target, errors)
    }

    #[test]
    fn empty_batch_spawns_nothing() {
        let (report, target, errors) = run_pool(4, None, Vec::new());
        assert_eq!(report, PoolReport::default());
        assert!(target.image().is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn failures_and_panics_stay_isolated() {
        let runs = Arc::new(AtomicUsize::new(0));
        let tasks = scripted(
            &runs,
            vec![
                ("p1", Behavior::Succeed),
                ("p2", Behavior::Fail),
                ("p3", Behavior::Panic),
                ("p4", Behavior::Succeed),
            ],
        );
        let (report, target, errors) = run_pool(2, None, tasks);

        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);
        assert!(report.workers_spawned <= 2);
        assert_eq!(
            target.identifiers(EntityKind::Procedure),
            BTreeSet::from(["p1".to_string(), "p4".to_string()])
        );

        let recorded = errors.snapshot();
        assert_eq!(recorded.len(), 2);
        let panicked = recorded
            .iter()
            .find(|error| error.identifier.as_deref() == Some("p3"))
            .expect("panic recorded");
        assert!(
            matches!(&panicked.cause, UpdateFailure::Panicked(message) if message.contains("p3"))
        );
    }

    #[test]
    fn overdue_task_is_abandoned_and_queue_keeps_draining() {
        let runs = Arc::new(AtomicUsize::new(0));
        let tasks = scripted(
            &runs,
            vec![
                ("slow", Behavior::Sleep(Duration::from_secs(2))),
                ("p2", Behavior::Succeed),
                ("p3", Behavior::Succeed),
            ],
        );
        let (report, target, errors) = run_pool(1, Some(Duration::from_millis(100)), tasks);

        assert_eq!(report.abandoned, 1);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.workers_spawned, 2);
        let ids = target.identifiers(EntityKind::Procedure);
        assert!(ids.contains("p2") && ids.contains("p3"));
        assert!(!ids.contains("slow"));

        let recorded = errors.snapshot();
        assert_eq!(recorded.len(), 1);
        assert!(matches!(recorded[0].cause, UpdateFailure::DeadlineExceeded(_)));

        // The abandoned result never lands, even after the sleeper wakes up.
        thread::sleep(Duration::from_millis(2_200));
        assert!(!target.contains(EntityKind::Procedure, "slow"));
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*borrowed), "static");
        assert_eq!(panic_message(&*owned), "owned");
    }
}
