//! Fetch → check → (mark ∥ emit) → join marks → commit cursor.
//!
//! A marker is recorded independently of whether its actions were delivered:
//! "marked but not emitted" is the accepted failure mode, "emitted but not
//! marked" is what the join guards against.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::task::JoinSet;

use crate::{
    dispatch::{derive_actions, ReplyPolicy},
    domain::UpdateId,
    errors::Error,
    messaging::{
        port::{ActionEmitter, UpdateSource},
        types::{ActionKind, FetchWindow, OutboundAction, Update},
    },
    store::DedupStore,
    utils::iso_timestamp_utc,
    Result,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineConfig {
    pub window: FetchWindow,
    pub reply: ReplyPolicy,
    /// Wait for outbound calls before closing the cycle. When false they are detached.
    pub await_emits: bool,
}

#[derive(Debug)]
pub struct EmitFailure {
    pub update_id: UpdateId,
    pub action: ActionKind,
    pub error: Error,
}

/// Outcome of one cycle. Every update of the batch ends up in exactly one of
/// `skipped`, `marked`, `mark_failures`.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub started_at: String,
    pub fetched: usize,
    pub skipped: Vec<UpdateId>,
    pub marked: Vec<UpdateId>,
    pub mark_failures: Vec<(UpdateId, Error)>,
    pub emitted: usize,
    pub emit_failures: Vec<EmitFailure>,
    pub emits_detached: usize,
}

impl CycleReport {
    /// First failure of the cycle; marks take precedence over emits.
    pub fn first_error(&self) -> Option<&Error> {
        self.mark_failures
            .first()
            .map(|(_, e)| e)
            .or_else(|| self.emit_failures.first().map(|f| &f.error))
    }

    pub fn is_clean(&self) -> bool {
        self.mark_failures.is_empty() && self.emit_failures.is_empty()
    }
}

pub struct DedupPipeline {
    source: Arc<dyn UpdateSource>,
    emitter: Arc<dyn ActionEmitter>,
    store: Arc<dyn DedupStore>,
    cfg: PipelineConfig,
}

type EmitOutcome = Vec<(ActionKind, Result<()>)>;

impl DedupPipeline {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        emitter: Arc<dyn ActionEmitter>,
        store: Arc<dyn DedupStore>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            source,
            emitter,
            store,
            cfg,
        }
    }

    /// One full cycle.
    ///
    /// Errors only when the batch cannot be fetched or the store cannot be read;
    /// per-update failures are collected in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport {
            started_at: iso_timestamp_utc(),
            ..CycleReport::default()
        };

        let batch = self.source.fetch(&self.cfg.window).await?;
        report.fetched = batch.len();
        if batch.is_empty() {
            tracing::debug!("empty batch");
            return Ok(report);
        }

        let mut fresh = Vec::with_capacity(batch.len());
        let mut in_cycle = HashSet::with_capacity(batch.len());
        for update in batch {
            if in_cycle.insert(update.id) {
                fresh.push(update);
            } else {
                tracing::debug!(update_id = %update.id, "duplicate id within batch");
                report.skipped.push(update.id);
            }
        }

        let seen = self.check(&fresh).await?;
        let mut unseen = Vec::with_capacity(fresh.len());
        for (update, already) in fresh.into_iter().zip(seen) {
            if already {
                tracing::debug!(
                    update_id = %update.id,
                    kind = update.kind.name(),
                    "already processed"
                );
                report.skipped.push(update.id);
            } else {
                unseen.push(update);
            }
        }

        let mut marks: JoinSet<(UpdateId, Result<()>)> = JoinSet::new();
        let mut mark_tasks = HashMap::with_capacity(unseen.len());
        let mut emits: JoinSet<(UpdateId, EmitOutcome)> = JoinSet::new();
        let mut emit_tasks = HashMap::with_capacity(unseen.len());

        for update in unseen {
            let id = update.id;
            let actions = derive_actions(&update, &self.cfg.reply);
            tracing::info!(
                update_id = %id,
                kind = update.kind.name(),
                actions = actions.len(),
                "processing update"
            );

            let store = self.store.clone();
            let snapshot = update.snapshot();
            let handle = marks.spawn_blocking(move || (id, store.record(id, &snapshot)));
            mark_tasks.insert(handle.id(), id);

            if !actions.is_empty() {
                let emitter = self.emitter.clone();
                let kinds: Vec<ActionKind> = actions.iter().map(OutboundAction::kind).collect();
                let handle =
                    emits.spawn(async move { (id, emit_all(emitter.as_ref(), actions).await) });
                emit_tasks.insert(handle.id(), (id, kinds));
            }
        }

        while let Some(joined) = marks.join_next().await {
            match joined {
                Ok((id, Ok(()))) => report.marked.push(id),
                Ok((id, Err(e))) => {
                    tracing::warn!(update_id = %id, error = %e, "failed to record marker");
                    report.mark_failures.push((id, e));
                }
                Err(e) => {
                    let Some(id) = mark_tasks.get(&e.id()).copied() else {
                        tracing::error!(error = %e, "marker task lost");
                        continue;
                    };
                    tracing::warn!(update_id = %id, error = %e, "marker task failed");
                    report.mark_failures.push((id, e.into()));
                }
            }
        }

        let done: Vec<UpdateId> = report
            .skipped
            .iter()
            .chain(&report.marked)
            .copied()
            .collect();
        let retry: Vec<UpdateId> = report.mark_failures.iter().map(|(id, _)| *id).collect();
        self.source.commit(&done, &retry).await;

        if self.cfg.await_emits {
            while let Some(joined) = emits.join_next().await {
                match joined {
                    Ok((id, outcomes)) => report.tally(id, outcomes),
                    Err(e) => {
                        let Some((id, kinds)) = emit_tasks.remove(&e.id()) else {
                            tracing::error!(error = %e, "emit task lost");
                            continue;
                        };
                        // No outcome came back, so every action of the update counts as failed.
                        let outcomes = kinds
                            .into_iter()
                            .map(|kind| (kind, Err(Error::Task(e.to_string()))))
                            .collect();
                        report.tally(id, outcomes);
                    }
                }
            }
        } else {
            report.emits_detached = emits.len();
            emits.detach_all();
        }

        tracing::info!(
            fetched = report.fetched,
            skipped = report.skipped.len(),
            marked = report.marked.len(),
            mark_failures = report.mark_failures.len(),
            emitted = report.emitted,
            emit_failures = report.emit_failures.len(),
            "cycle complete"
        );

        Ok(report)
    }

    /// Every marker currently in the store.
    pub async fn markers(&self) -> Result<Vec<(String, String)>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.entries()).await?
    }

    async fn check(&self, updates: &[Update]) -> Result<Vec<bool>> {
        let store = self.store.clone();
        let ids: Vec<UpdateId> = updates.iter().map(|u| u.id).collect();
        tokio::task::spawn_blocking(move || {
            ids.into_iter()
                .map(|id| store.has(id))
                .collect::<Result<Vec<bool>>>()
        })
        .await?
    }
}

impl CycleReport {
    fn tally(&mut self, update_id: UpdateId, outcomes: EmitOutcome) {
        for (action, res) in outcomes {
            match res {
                Ok(()) => self.emitted += 1,
                Err(error) => {
                    tracing::warn!(update_id = %update_id, ?action, error = %error, "emit failed");
                    self.emit_failures.push(EmitFailure {
                        update_id,
                        action,
                        error,
                    });
                }
            }
        }
    }
}

/// Actions of one update run in order; a failure does not stop the rest.
async fn emit_all(emitter: &dyn ActionEmitter, actions: Vec<OutboundAction>) -> EmitOutcome {
    let mut out = Vec::with_capacity(actions.len());
    for action in actions {
        let res = emitter.emit(&action).await;
        out.push((action.kind(), res));
    }
    out
}
