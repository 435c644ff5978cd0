//! Student metric refresh, one at a time or for the whole roster.
//!
//! A bulk run is a background task that walks a frozen copy of the roster in
//! order, issuing exactly one request at a time. Each step that succeeds is
//! committed to the store immediately; a step that fails is logged and
//! skipped. The run always ends in `Completed` and holds the roster's write
//! lane until it returns to `Idle`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::RosterApi;
use crate::error::{RosterError, RosterResult};
use crate::models::{
    RefreshPhase, RefreshProgress, StudentId, StudentRecord, CANCELLED_SENTINEL,
    COMPLETED_SENTINEL,
};
use crate::roster::{RosterStore, WriteLane};

/// Refreshes a single student outside of a bulk run. Errors go straight back
/// to the caller and leave the roster untouched.
pub async fn refresh_single(
    api: &dyn RosterApi,
    token: &str,
    store: &RosterStore,
    id: &StudentId,
) -> RosterResult<StudentRecord> {
    let lane = store.try_lane()?;
    let updated = api.refresh_student(token, id).await?;
    if &updated.id != id {
        return Err(RosterError::fetch(
            "refresh student",
            format!("server returned record {} for student {id}", updated.id),
        ));
    }
    store.replace_one(&lane, updated.clone());
    Ok(updated)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub refreshed: Vec<StudentId>,
    pub failed: Vec<(StudentId, String)>,
    pub cancelled: bool,
}

impl RefreshSummary {
    pub fn attempted(&self) -> usize {
        self.refreshed.len() + self.failed.len()
    }
}

/// Handle to a running bulk refresh.
pub struct BulkRefresh {
    pub run_id: Uuid,
    progress: mpsc::UnboundedReceiver<RefreshProgress>,
    cancel: CancellationToken,
    task: JoinHandle<RefreshSummary>,
}

impl BulkRefresh {
    /// Starts a run over the current roster. Fails with `Busy` if another
    /// writer holds the roster and with a validation error if it is empty.
    pub fn start(
        api: Arc<dyn RosterApi>,
        token: String,
        store: RosterStore,
        settle_delay: Duration,
    ) -> RosterResult<Self> {
        let lane = store.try_lane()?;
        let targets = store.snapshot();
        if targets.is_empty() {
            return Err(RosterError::validation("roster", "there are no students to refresh"));
        }

        let run_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let span = info_span!("bulk_refresh", %run_id, total = targets.len());

        let run = Run {
            api,
            token,
            store,
            lane,
            targets,
            progress: tx,
            cancel: cancel.clone(),
            settle_delay,
            run_id,
        };
        let task = tokio::spawn(run.execute().instrument(span));

        Ok(Self {
            run_id,
            progress: rx,
            cancel,
            task,
        })
    }

    /// Next progress snapshot; `None` once the run has returned to idle.
    pub async fn next(&mut self) -> Option<RefreshProgress> {
        self.progress.recv().await
    }

    /// Cancelling the token stops the run before its next student. The
    /// request in flight, if any, is allowed to finish and its result is kept.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> RosterResult<RefreshSummary> {
        self.task
            .await
            .map_err(|err| RosterError::fetch("bulk refresh", format!("task ended abnormally: {err}")))
    }
}

struct Run {
    api: Arc<dyn RosterApi>,
    token: String,
    store: RosterStore,
    lane: WriteLane,
    targets: Vec<StudentRecord>,
    progress: mpsc::UnboundedSender<RefreshProgress>,
    cancel: CancellationToken,
    settle_delay: Duration,
    run_id: Uuid,
}

impl Run {
    fn publish(&self, current_index: usize, name: &str, phase: RefreshPhase) {
        // A closed receiver only means nobody is watching.
        let _ = self.progress.send(RefreshProgress {
            current_index,
            total: self.targets.len(),
            current_student_name: name.to_string(),
            phase,
        });
    }

    async fn execute(self) -> RefreshSummary {
        let total = self.targets.len();
        let mut summary = RefreshSummary {
            run_id: self.run_id,
            total,
            refreshed: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        };
        info!("bulk refresh started");

        for (index, student) in self.targets.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.publish(index, &student.name, RefreshPhase::Running);

            match self.step(student).await {
                Ok(()) => summary.refreshed.push(student.id.clone()),
                Err(err) => {
                    warn!(id = %student.id, name = %student.name, error = %err, "skipping student");
                    summary.failed.push((student.id.clone(), err.to_string()));
                }
            }
        }

        let sentinel = if summary.cancelled {
            CANCELLED_SENTINEL
        } else {
            COMPLETED_SENTINEL
        };
        self.publish(summary.attempted(), sentinel, RefreshPhase::Completed);
        info!(
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            "bulk refresh finished"
        );

        tokio::time::sleep(self.settle_delay).await;
        let _ = self.progress.send(RefreshProgress::idle());
        summary
    }

    async fn step(&self, student: &StudentRecord) -> RosterResult<()> {
        let updated = self.api.refresh_student(&self.token, &student.id).await?;
        if updated.id != student.id {
            return Err(RosterError::fetch(
                "refresh student",
                format!("server returned record {}", updated.id),
            ));
        }
        self.store.replace_one(&self.lane, updated);
        Ok(())
    }
}
