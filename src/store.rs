//! Persistence backend for approvable records
//!
//! [`RecordStore`] is the seam to whatever owns the authoritative stage.
//! [`SledStore`] is the embedded implementation: one sled tree per entity
//! kind, records encoded as CBOR and keyed by id.
use super::config::StoreConfig;
use super::engine::ApprovalEngine;
use super::entity::EntityKind;
use super::error::StoreError;
use super::policy::PolicySet;
use super::record::ApprovalRecord;
use super::role::Actor;
use super::utils;
use sled::{IVec, Tree};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub trait RecordStore {
    /// The engine this backend validates transitions on `entity` with.
    /// Callers gate their own buttons with the same engine.
    fn engine(&self, entity: EntityKind) -> ApprovalEngine;

    /// Every record of one entity kind, oldest first.
    fn list(&self, entity: EntityKind) -> Result<Vec<ApprovalRecord>, StoreError>;

    fn get(&self, entity: EntityKind, id: &str) -> Result<ApprovalRecord, StoreError>;

    /// Create a record at stage `NONE`.
    fn submit(
        &self,
        entity: EntityKind,
        actor: &Actor,
        payload: BTreeMap<String, String>,
    ) -> Result<ApprovalRecord, StoreError>;

    /// Apply an approval. `expected` is the fingerprint the caller last saw;
    /// a mismatch means the caller acted on a stale copy.
    fn approve(
        &self,
        entity: EntityKind,
        id: &str,
        actor: &Actor,
        expected: Option<&str>,
    ) -> Result<ApprovalRecord, StoreError>;

    fn reject(
        &self,
        entity: EntityKind,
        id: &str,
        actor: &Actor,
        reason: &str,
        expected: Option<&str>,
    ) -> Result<ApprovalRecord, StoreError>;

    fn delete(&self, entity: EntityKind, id: &str, actor: &Actor) -> Result<(), StoreError>;
}

pub struct SledStore {
    instance: Arc<sled::Db>,
    policies: PolicySet,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>, policies: PolicySet) -> Self {
        Self { instance, policies }
    }

    /// Open the database named by `config`, or a temporary one when no path
    /// is configured.
    pub fn open(config: &StoreConfig, policies: PolicySet) -> Result<Self, StoreError> {
        let db = match &config.path {
            Some(path) => sled::open(path)?,
            None => sled::Config::new().temporary(true).open()?,
        };
        Ok(Self::new(Arc::new(db), policies))
    }

    fn tree(&self, entity: EntityKind) -> Result<Tree, StoreError> {
        Ok(self.instance.open_tree(entity.as_str())?)
    }

    fn load(&self, tree: &Tree, id: &str) -> Result<(IVec, ApprovalRecord), StoreError> {
        let bytes = tree
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let record: ApprovalRecord = minicbor::decode(&bytes)?;

        Ok((bytes, record))
    }

    /// Load, check the caller's fingerprint, mutate, and write back with
    /// compare-and-swap so a concurrent writer cannot be overwritten.
    fn update<F>(
        &self,
        entity: EntityKind,
        id: &str,
        expected: Option<&str>,
        mutate: F,
    ) -> Result<ApprovalRecord, StoreError>
    where
        F: FnOnce(&ApprovalEngine, &mut ApprovalRecord) -> Result<(), StoreError>,
    {
        let tree = self.tree(entity)?;
        let (current, mut record) = self.load(&tree, id)?;

        if let Some(expected) = expected {
            if sha256::digest(&current[..]) != expected {
                warn!(
                    event_name = "approval.store.stale_request",
                    entity = %entity,
                    record_id = id,
                    "request was based on an outdated copy of the record"
                );
                return Err(StoreError::Conflict(id.to_string()));
            }
        }

        mutate(&self.engine(entity), &mut record)?;

        let (_, cbor) = record.encode_with_hash()?;
        match tree.compare_and_swap(id.as_bytes(), Some(current), Some(cbor))? {
            Ok(()) => Ok(record),
            Err(_) => Err(StoreError::Conflict(id.to_string())),
        }
    }
}

impl RecordStore for SledStore {
    fn engine(&self, entity: EntityKind) -> ApprovalEngine {
        ApprovalEngine::new(self.policies.policy_for(entity))
    }

    fn list(&self, entity: EntityKind) -> Result<Vec<ApprovalRecord>, StoreError> {
        let tree = self.tree(entity)?;
        let mut records = Vec::with_capacity(tree.len());

        for entry in tree.iter() {
            let (_, bytes) = entry?;
            records.push(minicbor::decode::<ApprovalRecord>(&bytes)?);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        debug!(
            event_name = "approval.store.listed",
            entity = %entity,
            count = records.len(),
            "listed records"
        );
        Ok(records)
    }

    fn get(&self, entity: EntityKind, id: &str) -> Result<ApprovalRecord, StoreError> {
        let tree = self.tree(entity)?;
        self.load(&tree, id).map(|(_, record)| record)
    }

    fn submit(
        &self,
        entity: EntityKind,
        actor: &Actor,
        payload: BTreeMap<String, String>,
    ) -> Result<ApprovalRecord, StoreError> {
        let id = utils::new_record_id(entity)?;
        let record = ApprovalRecord::new(id, entity, actor.name.clone(), payload);
        let (_, cbor) = record.encode_with_hash()?;

        let tree = self.tree(entity)?;
        if tree
            .compare_and_swap(record.id.as_bytes(), None::<&[u8]>, Some(cbor))?
            .is_err()
        {
            return Err(StoreError::Conflict(record.id));
        }

        info!(
            event_name = "approval.store.submitted",
            entity = %entity,
            record_id = %record.id,
            created_by = %actor.name,
            user_id = %actor.user_id,
            "record submitted"
        );
        Ok(record)
    }

    fn approve(
        &self,
        entity: EntityKind,
        id: &str,
        actor: &Actor,
        expected: Option<&str>,
    ) -> Result<ApprovalRecord, StoreError> {
        let record = self.update(entity, id, expected, |engine, record| {
            let stage = engine.approve(record.stage, &actor.role)?;
            if let Some(level) = stage.approved_level() {
                record.record_approval(level, actor.name.clone());
            }
            Ok(())
        })?;

        info!(
            event_name = "approval.store.approved",
            entity = %entity,
            record_id = id,
            stage = %record.stage,
            approver = %actor.name,
            user_id = %actor.user_id,
            "record approved"
        );
        Ok(record)
    }

    fn reject(
        &self,
        entity: EntityKind,
        id: &str,
        actor: &Actor,
        reason: &str,
        expected: Option<&str>,
    ) -> Result<ApprovalRecord, StoreError> {
        let record = self.update(entity, id, expected, |engine, record| {
            let stage = engine.reject(record.stage, &actor.role, reason)?;
            if let Some(level) = stage.rejected_level() {
                record.record_rejection(level, actor.name.clone(), reason.trim().to_string());
            }
            Ok(())
        })?;

        info!(
            event_name = "approval.store.rejected",
            entity = %entity,
            record_id = id,
            stage = %record.stage,
            rejected_by = %actor.name,
            user_id = %actor.user_id,
            "record rejected"
        );
        Ok(record)
    }

    fn delete(&self, entity: EntityKind, id: &str, actor: &Actor) -> Result<(), StoreError> {
        if !self.engine(entity).can_edit(&actor.role) {
            return Err(StoreError::DeleteNotPermitted(actor.role.clone()));
        }

        let tree = self.tree(entity)?;
        if tree.remove(id.as_bytes())?.is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        info!(
            event_name = "approval.store.deleted",
            entity = %entity,
            record_id = id,
            deleted_by = %actor.name,
            user_id = %actor.user_id,
            "record deleted"
        );
        Ok(())
    }
}
