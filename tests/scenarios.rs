use anyhow::Context;
use sled::open;
use stage_approval::{
    Actor, ApprovalEngine, ApprovalQueue, ApprovalRecord, ApprovalStage, Bucket, EntityKind,
    Level, PolicySet, RecordStore, SledStore, StoreError, TransitionError, WorkflowError,
    config::AppConfig,
};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

const ENTITY: EntityKind = EntityKind::WireCuttingReport;

// Sled uses file-based locking, so every test gets its own database in a
// temp dir. The dir handle must outlive the store.
fn temp_store(policies: PolicySet) -> anyhow::Result<(TempDir, SledStore)> {
    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join("approval.db"))?;
    Ok((temp_dir, SledStore::new(Arc::new(db), policies)))
}

fn level(n: u8) -> Level {
    Level::new(n).unwrap()
}

fn actor(name: &str, role: &str) -> Actor {
    Actor::from_session(&format!("id_{name}"), name, role)
}

fn payload() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("batchNo".to_string(), "B-2231".to_string()),
        ("mouldNo".to_string(), "14".to_string()),
        ("ballTestMm".to_string(), "6".to_string()),
    ])
}

fn open_queue<'s, S: RecordStore>(
    store: &'s S,
    name: &str,
    role: &str,
) -> anyhow::Result<ApprovalQueue<'s, S>> {
    ApprovalQueue::open(store, ENTITY, actor(name, role))
        .with_context(|| format!("failed to open queue for {name}"))
}

/// Wraps the sled store and counts backend traffic. Mutations or list
/// fetches can be made to fail to stand in for a network or authorization
/// error.
struct FlakyStore {
    inner: SledStore,
    fail_mutations: Cell<bool>,
    fail_lists: Cell<bool>,
    lists: Cell<usize>,
    mutations: Cell<usize>,
}

impl FlakyStore {
    fn new(inner: SledStore) -> Self {
        Self {
            inner,
            fail_mutations: Cell::new(false),
            fail_lists: Cell::new(false),
            lists: Cell::new(0),
            mutations: Cell::new(0),
        }
    }
    fn mutation(&self) -> Result<(), StoreError> {
        self.mutations.set(self.mutations.get() + 1);
        if self.fail_mutations.get() {
            return Err(StoreError::Internal(anyhow::anyhow!("connection reset")));
        }
        Ok(())
    }
}

impl RecordStore for FlakyStore {
    fn engine(&self, entity: EntityKind) -> ApprovalEngine {
        self.inner.engine(entity)
    }
    fn list(&self, entity: EntityKind) -> Result<Vec<ApprovalRecord>, StoreError> {
        self.lists.set(self.lists.get() + 1);
        if self.fail_lists.get() {
            return Err(StoreError::Internal(anyhow::anyhow!("gateway timeout")));
        }
        self.inner.list(entity)
    }
    fn get(&self, entity: EntityKind, id: &str) -> Result<ApprovalRecord, StoreError> {
        self.inner.get(entity, id)
    }
    fn submit(
        &self,
        entity: EntityKind,
        actor: &Actor,
        payload: BTreeMap<String, String>,
    ) -> Result<ApprovalRecord, StoreError> {
        self.inner.submit(entity, actor, payload)
    }
    fn approve(
        &self,
        entity: EntityKind,
        id: &str,
        actor: &Actor,
        expected: Option<&str>,
    ) -> Result<ApprovalRecord, StoreError> {
        self.mutation()?;
        self.inner.approve(entity, id, actor, expected)
    }
    fn reject(
        &self,
        entity: EntityKind,
        id: &str,
        actor: &Actor,
        reason: &str,
        expected: Option<&str>,
    ) -> Result<ApprovalRecord, StoreError> {
        self.mutation()?;
        self.inner.reject(entity, id, actor, reason, expected)
    }
    fn delete(&self, entity: EntityKind, id: &str, actor: &Actor) -> Result<(), StoreError> {
        self.mutation()?;
        self.inner.delete(entity, id, actor)
    }
}

#[test]
fn submit_and_approve_through_every_level() -> anyhow::Result<()> {
    let (_dir, store) = temp_store(PolicySet::default())?;

    let mut operator = open_queue(&store, "ravi", "ROLE_USER")?;
    let record = operator
        .submit(payload())
        .context("Record Failed on Submit: ")?;
    assert_eq!(record.stage, ApprovalStage::None);
    assert_eq!(operator.records().len(), 1);

    let mut l1 = open_queue(&store, "asha", "ROLE_L1")?;
    assert_eq!(l1.bucket(Bucket::Pending).len(), 1);
    assert_eq!(l1.approve(&record.id)?, ApprovalStage::Approved(level(1)));
    assert!(l1.bucket(Bucket::Pending).is_empty());
    assert_eq!(l1.bucket(Bucket::Approved).len(), 1);

    let mut l2 = open_queue(&store, "vikram", "l2")?;
    assert_eq!(l2.approve(&record.id)?, ApprovalStage::Approved(level(2)));

    let mut l3 = open_queue(&store, "meera", "ROLE_L3")?;
    assert_eq!(l3.approve(&record.id)?, ApprovalStage::Approved(level(3)));

    let stored = store.get(ENTITY, &record.id)?;
    assert_eq!(stored.stage, ApprovalStage::Approved(level(3)));
    assert_eq!(stored.approved_by(level(1)), Some("asha"));
    assert_eq!(stored.approved_by(level(2)), Some("vikram"));
    assert_eq!(stored.approved_by(level(3)), Some("meera"));
    assert_eq!(stored.payload, payload());

    // fully approved is terminal, but the final level can still open it
    let actions = l3.actions(&record.id).unwrap();
    assert!(actions.can_view);
    assert!(!actions.can_approve);
    assert!(!actions.can_reject);

    Ok(())
}

#[test]
fn final_level_rejection_is_terminal() -> anyhow::Result<()> {
    let (_dir, store) = temp_store(PolicySet::default())?;

    let mut operator = open_queue(&store, "ravi", "ROLE_USER")?;
    let record = operator.submit(payload())?;
    open_queue(&store, "asha", "ROLE_L1")?.approve(&record.id)?;
    open_queue(&store, "vikram", "ROLE_L2")?.approve(&record.id)?;

    let mut l3 = open_queue(&store, "meera", "ROLE_L3")?;
    let stage = l3.reject(&record.id, "quality issue")?;
    assert_eq!(stage, ApprovalStage::Rejected(level(3)));

    let stored = store.get(ENTITY, &record.id)?;
    let rejection = stored.rejection.as_ref().context("rejection not stored")?;
    assert_eq!(rejection.level, level(3));
    assert_eq!(rejection.reason, "quality issue");
    assert_eq!(rejection.rejected_by, "meera");

    // L2 sees its own rejections and those made one level above
    let l2 = open_queue(&store, "vikram", "ROLE_L2")?;
    assert_eq!(l2.bucket(Bucket::Rejected).len(), 1);

    for role in ["ROLE_ADMIN", "ROLE_L1", "ROLE_L2", "ROLE_L3", "ROLE_USER"] {
        let queue = open_queue(&store, "anyone", role)?;
        assert!(!queue.actions(&record.id).unwrap().can_reject);
    }

    Ok(())
}

#[test]
fn refused_actions_never_reach_the_backend() -> anyhow::Result<()> {
    let (_dir, inner) = temp_store(PolicySet::default())?;
    let store = FlakyStore::new(inner);

    let record = open_queue(&store, "ravi", "ROLE_USER")?.submit(payload())?;

    // L2 cannot act before L1 has signed off
    let mut l2 = open_queue(&store, "vikram", "ROLE_L2")?;
    let err = l2.approve(&record.id).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Transition(TransitionError::IllegalTransition { .. })
    ));

    // L1 may reject, but not without a reason
    let mut l1 = open_queue(&store, "asha", "ROLE_L1")?;
    let err = l1.reject(&record.id, "   ").unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Transition(TransitionError::MissingReason)
    ));
    assert_eq!(err.user_message(), "Please enter a reason for the rejection.");

    assert_eq!(store.mutations.get(), 0);
    assert_eq!(
        store.get(ENTITY, &record.id)?.stage,
        ApprovalStage::None,
        "nothing should have been written"
    );

    Ok(())
}

#[test]
fn fully_approved_record_cannot_be_rejected() -> anyhow::Result<()> {
    let (_dir, inner) = temp_store(PolicySet::default())?;
    let store = FlakyStore::new(inner);

    let record = open_queue(&store, "ravi", "ROLE_USER")?.submit(payload())?;
    for (name, role) in [("asha", "ROLE_L1"), ("vikram", "ROLE_L2"), ("meera", "ROLE_L3")] {
        open_queue(&store, name, role)?.approve(&record.id)?;
    }
    let before = store.mutations.get();

    let mut l3 = open_queue(&store, "meera", "ROLE_L3")?;
    let err = l3.reject(&record.id, "late defect").unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Transition(TransitionError::IllegalTransition { .. })
    ));
    assert_eq!(store.mutations.get(), before);

    Ok(())
}

#[test]
fn backend_failure_leaves_the_list_untouched() -> anyhow::Result<()> {
    let (_dir, inner) = temp_store(PolicySet::default())?;
    let store = FlakyStore::new(inner);

    let record = open_queue(&store, "ravi", "ROLE_USER")?.submit(payload())?;

    let mut l1 = open_queue(&store, "asha", "ROLE_L1")?;
    let snapshot = l1.records().to_vec();
    let lists = store.lists.get();

    store.fail_mutations.set(true);
    let err = l1.approve(&record.id).unwrap_err();

    assert!(matches!(err, WorkflowError::Backend(_)));
    assert_eq!(err.user_message(), "The request failed. Please try again.");
    assert_eq!(l1.records(), snapshot.as_slice());
    assert_eq!(store.lists.get(), lists, "list must not be reloaded");

    // once the backend recovers the same action goes through
    store.fail_mutations.set(false);
    assert_eq!(l1.approve(&record.id)?, ApprovalStage::Approved(level(1)));
    assert_eq!(store.lists.get(), lists + 1);

    Ok(())
}

#[test]
fn confirmed_change_survives_a_failed_reload() -> anyhow::Result<()> {
    let (_dir, inner) = temp_store(PolicySet::default())?;
    let store = FlakyStore::new(inner);

    let record = open_queue(&store, "ravi", "ROLE_USER")?.submit(payload())?;
    let mut l1 = open_queue(&store, "asha", "ROLE_L1")?;

    // the approval lands, only the list fetch afterwards fails
    store.fail_lists.set(true);
    assert_eq!(l1.approve(&record.id)?, ApprovalStage::Approved(level(1)));
    assert!(l1.is_stale());
    assert_eq!(l1.find(&record.id).unwrap().stage, ApprovalStage::None);
    assert_eq!(store.get(ENTITY, &record.id)?.stage, ApprovalStage::Approved(level(1)));

    // while the list stays unreachable no further change is attempted
    let mutations = store.mutations.get();
    let err = l1.reject(&record.id, "wrong mould").unwrap_err();
    assert!(matches!(err, WorkflowError::Backend(_)));
    assert_eq!(store.mutations.get(), mutations);

    // once it recovers the snapshot is refreshed before the local check,
    // so a repeat approval is refused locally rather than by a conflict
    store.fail_lists.set(false);
    let err = l1.approve(&record.id).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Transition(TransitionError::IllegalTransition { .. })
    ));
    assert!(!l1.is_stale());
    assert_eq!(l1.find(&record.id).unwrap().stage, ApprovalStage::Approved(level(1)));
    assert_eq!(store.mutations.get(), mutations);

    Ok(())
}

#[test]
fn stale_snapshot_is_rejected_by_the_backend() -> anyhow::Result<()> {
    let (_dir, store) = temp_store(PolicySet::default())?;

    let record = open_queue(&store, "ravi", "ROLE_USER")?.submit(payload())?;

    // two L1 users load the same list
    let mut first = open_queue(&store, "asha", "ROLE_L1")?;
    let mut second = open_queue(&store, "kiran", "ROLE_L1")?;

    first.approve(&record.id)?;

    // the second user still sees NONE, passes the local check, and loses
    let err = second.approve(&record.id).unwrap_err();
    assert!(matches!(err, WorkflowError::Backend(StoreError::Conflict(_))));
    assert_eq!(second.find(&record.id).unwrap().stage, ApprovalStage::None);

    second.reload()?;
    assert_eq!(
        second.find(&record.id).unwrap().stage,
        ApprovalStage::Approved(level(1))
    );
    assert_eq!(
        store.get(ENTITY, &record.id)?.approved_by(level(1)),
        Some("asha")
    );

    Ok(())
}

#[test]
fn backend_revalidates_transitions() -> anyhow::Result<()> {
    let (_dir, store) = temp_store(PolicySet::default())?;
    let record = store.submit(ENTITY, &actor("ravi", "ROLE_USER"), payload())?;

    let err = store
        .approve(ENTITY, &record.id, &actor("vikram", "ROLE_L2"), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::Forbidden(_)));

    let err = store
        .reject(ENTITY, &record.id, &actor("asha", "ROLE_L1"), "", None)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Forbidden(TransitionError::MissingReason)
    ));

    let err = store
        .approve(ENTITY, "wirecut_1missing", &actor("asha", "ROLE_L1"), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    Ok(())
}

#[test]
fn delete_is_limited_to_admin_and_first_level() -> anyhow::Result<()> {
    let (_dir, store) = temp_store(PolicySet::default())?;

    let mut operator = open_queue(&store, "ravi", "ROLE_USER")?;
    let first = operator.submit(payload())?;
    let second = operator.submit(payload())?;

    let mut l2 = open_queue(&store, "vikram", "ROLE_L2")?;
    let err = l2.delete(&first.id).unwrap_err();
    assert!(matches!(err, WorkflowError::NotPermitted(_)));

    let mut l1 = open_queue(&store, "asha", "ROLE_L1")?;
    l1.delete(&first.id)?;
    assert!(l1.find(&first.id).is_none());

    let mut admin = open_queue(&store, "root", "ROLE_ADMIN")?;
    admin.delete(&second.id)?;
    assert!(admin.records().is_empty());

    let err = admin.delete(&second.id).unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownRecord(_)));

    Ok(())
}

#[test]
fn pending_bucket_follows_the_chain() -> anyhow::Result<()> {
    let (_dir, store) = temp_store(PolicySet::default())?;

    let mut operator = open_queue(&store, "ravi", "ROLE_USER")?;
    let a = operator.submit(payload())?;
    let b = operator.submit(payload())?;
    let c = operator.submit(payload())?;

    let mut l1 = open_queue(&store, "asha", "ROLE_L1")?;
    l1.approve(&a.id)?;
    l1.approve(&b.id)?;
    l1.reject(&c.id, "mould cracked")?;

    let l2 = open_queue(&store, "vikram", "ROLE_L2")?;
    let pending: Vec<&str> = l2
        .bucket(Bucket::Pending)
        .into_iter()
        .map(|record| record.id.as_str())
        .collect();
    assert_eq!(pending.len(), 2);
    assert!(pending.contains(&a.id.as_str()));
    assert!(pending.contains(&b.id.as_str()));
    let at_l1 = ApprovalStage::Approved(level(1));
    assert!(l2.bucket(Bucket::Pending).iter().all(|r| r.stage == at_l1));

    // the rejection by L1 shows up for L1 but not for L2
    let l1_rejected = l1.bucket(Bucket::Rejected);
    assert_eq!(l1_rejected.len(), 1);
    assert_eq!(l1_rejected[0].id, c.id);
    assert!(l2.bucket(Bucket::Rejected).is_empty());

    let views = l2.views(Bucket::Pending);
    assert!(views.iter().all(|view| view.actions.can_approve && view.actions.can_view));
    assert!(views.iter().all(|view| !view.actions.can_edit));

    assert_eq!(l2.bucket(Bucket::InProgress).len(), 2);
    assert_eq!(l2.bucket(Bucket::All).len(), 3);

    Ok(())
}

#[test]
fn entity_policy_from_config() -> anyhow::Result<()> {
    let config = AppConfig::from_toml_str(
        r#"
        [entities.cube_test]
        reject_scope = "any_approver"
        reserve_final_rejection = true
        "#,
    )?;
    let (_dir, store) = temp_store(config.policies()?)?;

    let cube = EntityKind::CubeTest;
    let record = store.submit(cube, &actor("ravi", "ROLE_USER"), payload())?;
    store.approve(cube, &record.id, &actor("asha", "ROLE_L1"), None)?;
    store.approve(cube, &record.id, &actor("vikram", "ROLE_L2"), None)?;

    // waiting on the final level: only L3 may reject
    let mut l1 = ApprovalQueue::open(&store, cube, actor("asha", "ROLE_L1"))?;
    assert_eq!(l1.engine(), &store.engine(cube));
    assert!(l1.reject(&record.id, "slump too low").is_err());

    // earlier in the chain the queue gates buttons with the same any-approver
    // policy the backend enforces
    let early = store.submit(cube, &actor("ravi", "ROLE_USER"), payload())?;
    store.approve(cube, &early.id, &actor("asha", "ROLE_L1"), None)?;
    l1.reload()?;
    assert!(l1.actions(&early.id).unwrap().can_reject);
    assert_eq!(
        l1.reject(&early.id, "honeycombing")?,
        ApprovalStage::Rejected(level(1))
    );

    let mut l3 = ApprovalQueue::open(&store, cube, actor("meera", "ROLE_L3"))?;
    assert_eq!(
        l3.reject(&record.id, "slump too low")?,
        ApprovalStage::Rejected(level(3))
    );

    // other modules keep the sequential default
    let km = EntityKind::KmBatch;
    let batch = store.submit(km, &actor("ravi", "ROLE_USER"), payload())?;
    store.approve(km, &batch.id, &actor("asha", "ROLE_L1"), None)?;
    let err = store
        .reject(km, &batch.id, &actor("asha", "ROLE_L1"), "wrong count", None)
        .unwrap_err();
    assert!(matches!(err, StoreError::Forbidden(_)));

    // records are kept apart per module
    assert_eq!(store.list(cube)?.len(), 2);
    assert_eq!(store.list(km)?.len(), 1);
    assert!(store.list(ENTITY)?.is_empty());

    Ok(())
}
