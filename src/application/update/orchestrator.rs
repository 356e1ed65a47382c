//! Sequences a full rebuild: sequential phases, parallel phases, then the
//! referential consistency pass.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::application::repos::{ContentStore, RepoError, StoreSession};
use crate::cache::{CacheConfig, ContentCache, enforce_referential_completeness};
use crate::domain::types::EntityKind;

use super::UpdateContext;
use super::error::{CacheUpdateError, ErrorCollector, UpdateFailure};
use super::pool::WorkerPool;
use super::single::{SingleEntityUpdate, default_sequence};
use super::task::{OfferingTask, ProcedureTask, UpdateTask};

const METRIC_PHASE_MS: &str = "sos_cache_phase_ms";
const METRIC_REBUILD_MS: &str = "sos_cache_rebuild_ms";
const METRIC_REBUILD_TOTAL: &str = "sos_cache_rebuild_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Complete,
    /// Ran to the end with recorded failures.
    Degraded,
    /// Could not enumerate its instances at all.
    Failed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Complete => "complete",
            PhaseStatus::Degraded => "degraded",
            PhaseStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub name: &'static str,
    pub duration: Duration,
    pub status: PhaseStatus,
    /// Instances written (sequential) or tasks scheduled (parallel).
    pub tasks: usize,
    pub failures: usize,
}

/// Result of one rebuild; the cache is complete once this is returned.
#[derive(Debug)]
pub struct RebuildOutcome {
    /// Correlates the log lines of one rebuild.
    pub rebuild_id: Uuid,
    pub cache: Arc<ContentCache>,
    pub errors: Vec<CacheUpdateError>,
    pub phases: Vec<PhaseReport>,
    pub duration: Duration,
}

impl RebuildOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|phase| phase.name == name)
    }
}

/// Kinds aggregated per instance on the worker pool.
#[derive(Debug, Clone, Copy)]
enum ParallelKind {
    Offerings,
    Procedures,
}

impl ParallelKind {
    fn entity_kind(self) -> EntityKind {
        match self {
            ParallelKind::Offerings => EntityKind::Offering,
            ParallelKind::Procedures => EntityKind::Procedure,
        }
    }

    fn phase(self) -> &'static str {
        match self {
            ParallelKind::Offerings => "offerings",
            ParallelKind::Procedures => "procedures",
        }
    }

    fn thread_label(self) -> &'static str {
        match self {
            ParallelKind::Offerings => "offering",
            ParallelKind::Procedures => "procedure",
        }
    }

    fn enumerate(self, session: &mut dyn StoreSession) -> Result<Vec<String>, RepoError> {
        match self {
            ParallelKind::Offerings => session.offering_identifiers(),
            ParallelKind::Procedures => session.procedure_identifiers(),
        }
    }

    fn task(self, identifier: String) -> Box<dyn UpdateTask> {
        match self {
            ParallelKind::Offerings => Box::new(OfferingTask::new(identifier)),
            ParallelKind::Procedures => Box::new(ProcedureTask::new(identifier)),
        }
    }
}

/// Builds a fresh [`ContentCache`] from the store.
///
/// Individual failures never abort a rebuild: every phase runs, every task
/// is drained, and failures end up in [`RebuildOutcome::errors`]. Whether a
/// degraded cache gets published is decided by the caller.
pub struct CacheUpdateOrchestrator {
    store: Arc<dyn ContentStore>,
    config: Arc<CacheConfig>,
    sequential: Vec<Box<dyn SingleEntityUpdate>>,
}

impl CacheUpdateOrchestrator {
    pub fn new(store: Arc<dyn ContentStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            sequential: default_sequence(),
        }
    }

    /// Replaces the sequential phases; they run in the given order.
    pub fn with_sequential(mut self, sequential: Vec<Box<dyn SingleEntityUpdate>>) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn rebuild(&self, thread_count: NonZeroUsize) -> RebuildOutcome {
        let rebuild_id = Uuid::new_v4();
        let span = info_span!("cache_rebuild", %rebuild_id);
        let _entered = span.enter();
        let started = Instant::now();
        let cache = Arc::new(ContentCache::new());
        let errors = Arc::new(ErrorCollector::new());
        cache.set_default_srid(self.config.default_srid);
        info!(threads = thread_count.get(), "Rebuilding content cache");

        let mut phases = Vec::with_capacity(self.sequential.len() + 3);
        for update in &self.sequential {
            phases.push(self.run_sequential(update.as_ref(), &cache, &errors));
        }
        for kind in [ParallelKind::Offerings, ParallelKind::Procedures] {
            phases.push(self.run_parallel(kind, thread_count, &cache, &errors));
        }
        phases.push(self.run_consistency(&cache, &errors));

        let duration = started.elapsed();
        let errors = errors.snapshot();
        let outcome = if errors.is_empty() { "complete" } else { "degraded" };
        histogram!(METRIC_REBUILD_MS).record(duration.as_secs_f64() * 1000.0);
        counter!(METRIC_REBUILD_TOTAL, "outcome" => outcome).increment(1);
        info!(
            outcome,
            failures = errors.len(),
            duration_ms = duration.as_millis() as u64,
            "Content cache rebuild finished"
        );

        RebuildOutcome {
            rebuild_id,
            cache,
            errors,
            phases,
            duration,
        }
    }

    fn run_sequential(
        &self,
        update: &dyn SingleEntityUpdate,
        cache: &ContentCache,
        errors: &ErrorCollector,
    ) -> PhaseReport {
        let started = Instant::now();
        let before = errors.len();
        debug!(phase = update.name(), "Starting cache update phase");
        let summary = update.execute(&UpdateContext {
            store: self.store.as_ref(),
            cache,
            errors,
            config: &self.config,
        });
        finish_phase(
            update.name(),
            started,
            summary.instances,
            errors.len() - before,
            !summary.enumerated,
        )
    }

    fn run_parallel(
        &self,
        kind: ParallelKind,
        thread_count: NonZeroUsize,
        cache: &Arc<ContentCache>,
        errors: &Arc<ErrorCollector>,
    ) -> PhaseReport {
        let started = Instant::now();
        let before = errors.len();
        debug!(phase = kind.phase(), "Starting cache update phase");

        let identifiers = self
            .store
            .open_session()
            .and_then(|mut session| kind.enumerate(session.as_mut()));
        let identifiers = match identifiers {
            Ok(identifiers) => identifiers,
            Err(err) => {
                errors.record(CacheUpdateError::for_kind(kind.entity_kind(), "enumerate", err));
                return finish_phase(kind.phase(), started, 0, errors.len() - before, true);
            }
        };

        let tasks: Vec<Box<dyn UpdateTask>> = identifiers.into_iter().map(|id| kind.task(id)).collect();
        let scheduled = tasks.len();
        let pool = WorkerPool::new(kind.thread_label(), thread_count, self.config.task_deadline());
        let result = pool.run(
            tasks,
            Arc::clone(&self.store),
            Arc::clone(&self.config),
            Arc::clone(cache),
            Arc::clone(errors),
        );
        let failed = match result {
            Ok(report) => {
                debug!(
                    phase = kind.phase(),
                    succeeded = report.succeeded,
                    failed = report.failed,
                    abandoned = report.abandoned,
                    "Parallel phase drained"
                );
                false
            }
            Err(err) => {
                errors.record(CacheUpdateError::for_kind(
                    kind.entity_kind(),
                    "spawn_workers",
                    UpdateFailure::Pool(err.to_string()),
                ));
                true
            }
        };
        finish_phase(kind.phase(), started, scheduled, errors.len() - before, failed)
    }

    /// Prunes dangling relationship values and reports each missing
    /// identifier once, unless its own update already failed.
    fn run_consistency(&self, cache: &ContentCache, errors: &ErrorCollector) -> PhaseReport {
        let started = Instant::now();
        let before = errors.len();
        let report = enforce_referential_completeness(cache);

        let failed_kinds = errors.failed_kinds();
        let mut failed_ids = BTreeMap::new();
        let mut suppressed = 0;
        for dangling in &report.dangling {
            let failed = failed_kinds.contains(&dangling.kind)
                || failed_ids
                    .entry(dangling.kind)
                    .or_insert_with(|| errors.failed_identifiers(dangling.kind))
                    .contains(&dangling.identifier);
            if failed {
                suppressed += 1;
                continue;
            }
            let relations = dangling
                .relations
                .iter()
                .map(|relation| relation.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            errors.record(CacheUpdateError::new(
                dangling.kind,
                Some(&dangling.identifier),
                "check_references",
                UpdateFailure::Dangling { relations },
            ));
        }
        if !report.is_clean() {
            warn!(
                pruned = report.pruned,
                dangling = report.dangling.len(),
                suppressed,
                "Pruned dangling cache references"
            );
        }
        finish_phase(
            "consistency",
            started,
            report.dangling.len(),
            errors.len() - before,
            false,
        )
    }
}

fn finish_phase(
    name: &'static str,
    started: Instant,
    tasks: usize,
    failures: usize,
    failed: bool,
) -> PhaseReport {
    let duration = started.elapsed();
    let status = if failed {
        PhaseStatus::Failed
    } else if failures > 0 {
        PhaseStatus::Degraded
    } else {
        PhaseStatus::Complete
    };
    histogram!(METRIC_PHASE_MS, "phase" => name).record(duration.as_secs_f64() * 1000.0);
    info!(
        phase = name,
        status = status.as_str(),
        tasks,
        failures,
        duration_ms = duration.as_millis() as u64,
        "Cache update phase finished"
    );
    PhaseReport {
        name,
        duration,
        status,
        tasks,
        failures,
    }
}
