//! The approval workflow engine shared by every module's list view.
//!
//! Decisions are split across two impl blocks: [`crate::transition`] answers
//! "may this role move the record, and where to", [`crate::visibility`]
//! answers "should this role see the record". Both are pure functions of the
//! stage, the role and the policy; the role is always passed in explicitly.
use super::policy::WorkflowPolicy;
use super::role::Role;
use super::stage::{ApprovalStage, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApprovalEngine {
    policy: WorkflowPolicy,
}

/// Button gating for a single record, as seen by a single role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordActions {
    pub can_view: bool,
    pub can_approve: bool,
    pub can_reject: bool,
    pub can_edit: bool,
}

impl ApprovalEngine {
    pub fn new(policy: WorkflowPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub fn levels(&self) -> u8 {
        self.policy.levels()
    }

    /// The level of an approver role, provided it exists in this hierarchy.
    pub(crate) fn level_within_depth(&self, role: &Role) -> Option<Level> {
        role.level().filter(|level| level.get() <= self.policy.levels())
    }

    pub fn final_level(&self) -> Option<Level> {
        Level::new(self.policy.levels())
    }

    pub fn actions(&self, stage: ApprovalStage, role: &Role) -> RecordActions {
        RecordActions {
            can_view: self.can_view(stage, role),
            can_approve: self.can_approve(stage, role),
            can_reject: self.can_reject(stage, role),
            can_edit: self.can_edit(role),
        }
    }
}
