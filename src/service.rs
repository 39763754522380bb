//! Service layer API for a module's approval list view
use super::engine::{ApprovalEngine, RecordActions};
use super::entity::EntityKind;
use super::error::{Action, StoreError, TransitionError, WorkflowError};
use super::record::ApprovalRecord;
use super::role::Actor;
use super::stage::ApprovalStage;
use super::store::RecordStore;
use super::visibility::Bucket;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One module's list view for one signed-in user.
///
/// Holds a snapshot of the module's records. The snapshot is never patched
/// locally: every successful mutation is followed by a full reload, and a
/// failed one leaves the snapshot exactly as it was.
///
/// When the backend confirms a change but the reload fails, the confirmed
/// result is still returned and the snapshot is marked stale. The next
/// mutation reloads before checking anything against it.
pub struct ApprovalQueue<'s, S: RecordStore> {
    store: &'s S,
    engine: ApprovalEngine,
    entity: EntityKind,
    actor: Actor,
    snapshot: Vec<ApprovalRecord>,
    stale: bool,
}

/// A record annotated with what the viewing user may do with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordView<'a> {
    pub record: &'a ApprovalRecord,
    pub actions: RecordActions,
}

impl<'s, S: RecordStore> ApprovalQueue<'s, S> {
    /// Open the list view and fetch the first snapshot. Button gating uses
    /// the same engine the backend validates with.
    pub fn open(store: &'s S, entity: EntityKind, actor: Actor) -> Result<Self, WorkflowError> {
        let mut queue = Self {
            store,
            engine: store.engine(entity),
            entity,
            actor,
            snapshot: Vec::new(),
            stale: false,
        };
        queue.reload()?;

        Ok(queue)
    }

    pub fn reload(&mut self) -> Result<(), WorkflowError> {
        self.snapshot = self.store.list(self.entity)?;
        self.stale = false;
        Ok(())
    }

    /// Whether the snapshot may lag behind a change this queue made.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn ensure_fresh(&mut self) -> Result<(), WorkflowError> {
        if self.stale {
            self.reload()?;
        }
        Ok(())
    }

    /// Reload after a confirmed change. A failure here does not undo the
    /// change, so it only marks the snapshot stale.
    fn refresh_after(&mut self, id: &str, action: &'static str) {
        if let Err(err) = self.reload() {
            self.stale = true;
            warn!(
                event_name = "approval.queue.reload_failed",
                entity = %self.entity,
                record_id = id,
                action,
                error = %err,
                "change was applied but the list could not be reloaded"
            );
        }
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn engine(&self) -> &ApprovalEngine {
        &self.engine
    }

    pub fn records(&self) -> &[ApprovalRecord] {
        &self.snapshot
    }

    pub fn find(&self, id: &str) -> Option<&ApprovalRecord> {
        self.snapshot.iter().find(|record| record.id == id)
    }

    fn find_or_err(&self, id: &str) -> Result<&ApprovalRecord, WorkflowError> {
        self.find(id)
            .ok_or_else(|| WorkflowError::UnknownRecord(id.to_string()))
    }

    pub fn bucket(&self, bucket: Bucket) -> Vec<&ApprovalRecord> {
        self.engine
            .filter_by_bucket(&self.snapshot, &self.actor.role, bucket)
    }

    /// The bucket's records with their button gating resolved.
    pub fn views(&self, bucket: Bucket) -> Vec<RecordView<'_>> {
        self.bucket(bucket)
            .into_iter()
            .map(|record| RecordView {
                record,
                actions: self.engine.actions(record.stage, &self.actor.role),
            })
            .collect()
    }

    pub fn actions(&self, id: &str) -> Option<RecordActions> {
        self.find(id)
            .map(|record| self.engine.actions(record.stage, &self.actor.role))
    }

    /// Open the detail view of a record, if the user may see it.
    pub fn view(&self, id: &str) -> Option<&ApprovalRecord> {
        self.find(id)
            .filter(|record| self.engine.can_view(record.stage, &self.actor.role))
    }

    /// Submit a new record at stage `NONE`.
    pub fn submit(
        &mut self,
        payload: BTreeMap<String, String>,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let record = self.store.submit(self.entity, &self.actor, payload)?;
        self.refresh_after(&record.id, "submit");

        Ok(record)
    }

    /// Request an approval. Refused locally when the role may not approve;
    /// otherwise the backend decides and the list is reloaded.
    pub fn approve(&mut self, id: &str) -> Result<ApprovalStage, WorkflowError> {
        self.ensure_fresh()?;
        let record = self.find_or_err(id)?;
        let role = &self.actor.role;

        if let Err(err) = self.engine.approve(record.stage, role) {
            warn!(
                event_name = "approval.queue.illegal_transition",
                entity = %self.entity,
                record_id = id,
                stage = %record.stage,
                role = %role,
                action = %Action::Approve,
                "approval refused before contacting the backend"
            );
            return Err(err.into());
        }

        let fingerprint = record.fingerprint()?;
        let updated = self
            .store
            .approve(self.entity, id, &self.actor, Some(&fingerprint))
            .inspect_err(|err| self.log_backend_failure(id, Action::Approve, err))?;

        info!(
            event_name = "approval.queue.approved",
            entity = %self.entity,
            record_id = id,
            stage = %updated.stage,
            "approval accepted"
        );
        self.refresh_after(id, "approve");

        Ok(updated.stage)
    }

    /// Request a rejection. A blank reason or a role without authority stops
    /// the request before it reaches the backend.
    pub fn reject(&mut self, id: &str, reason: &str) -> Result<ApprovalStage, WorkflowError> {
        self.ensure_fresh()?;
        let record = self.find_or_err(id)?;
        let role = &self.actor.role;

        if let Err(err) = self.engine.reject(record.stage, role, reason) {
            match err {
                TransitionError::MissingReason => warn!(
                    event_name = "approval.queue.missing_reason",
                    entity = %self.entity,
                    record_id = id,
                    "rejection needs a reason"
                ),
                TransitionError::IllegalTransition { .. } => warn!(
                    event_name = "approval.queue.illegal_transition",
                    entity = %self.entity,
                    record_id = id,
                    stage = %record.stage,
                    role = %role,
                    action = %Action::Reject,
                    "rejection refused before contacting the backend"
                ),
            }
            return Err(err.into());
        }

        let fingerprint = record.fingerprint()?;
        let updated = self
            .store
            .reject(self.entity, id, &self.actor, reason, Some(&fingerprint))
            .inspect_err(|err| self.log_backend_failure(id, Action::Reject, err))?;

        info!(
            event_name = "approval.queue.rejected",
            entity = %self.entity,
            record_id = id,
            stage = %updated.stage,
            "rejection accepted"
        );
        self.refresh_after(id, "reject");

        Ok(updated.stage)
    }

    /// Delete a record. Only roles that may edit get this far.
    pub fn delete(&mut self, id: &str) -> Result<(), WorkflowError> {
        self.ensure_fresh()?;
        self.find_or_err(id)?;

        if !self.engine.can_edit(&self.actor.role) {
            return Err(WorkflowError::NotPermitted(self.actor.role.clone()));
        }

        self.store.delete(self.entity, id, &self.actor)?;
        self.refresh_after(id, "delete");

        Ok(())
    }

    fn log_backend_failure(&self, id: &str, action: Action, err: &StoreError) {
        warn!(
            event_name = "approval.queue.backend_rejected",
            entity = %self.entity,
            record_id = id,
            action = %action,
            error = %err,
            "backend refused the request, list left unchanged"
        );
    }
}
