//! Stage transition authority
use super::engine::ApprovalEngine;
use super::error::{Action, TransitionError};
use super::policy::RejectScope;
use super::role::Role;
use super::stage::{ApprovalStage, Level};

impl ApprovalEngine {
    /// The level on whose behalf `role` would approve a record at `stage`.
    pub fn approving_level(&self, stage: ApprovalStage, role: &Role) -> Option<Level> {
        let next = stage.next_level(self.levels())?;

        match role {
            Role::Admin if self.policy().admin_override => Some(next),
            _ => self.level_within_depth(role).filter(|level| *level == next),
        }
    }

    /// The level on whose behalf `role` would reject a record at `stage`.
    /// This is the level written into the resulting `*_REJECTED` stage.
    pub fn rejecting_level(&self, stage: ApprovalStage, role: &Role) -> Option<Level> {
        let next = stage.next_level(self.levels())?;

        if role.is_admin() {
            return self.policy().admin_override.then_some(next);
        }

        let level = self.level_within_depth(role)?;
        let allowed = match self.policy().reject_scope {
            RejectScope::Sequential => level == next,
            RejectScope::AnyApprover => {
                let final_pending = self.final_level() == Some(next);
                if self.policy().reserve_final_rejection && final_pending {
                    level == next
                } else {
                    true
                }
            }
        };

        allowed.then_some(level)
    }

    pub fn can_approve(&self, stage: ApprovalStage, role: &Role) -> bool {
        self.approving_level(stage, role).is_some()
    }

    /// Compute the stage an approval by `role` produces.
    pub fn approve(
        &self,
        stage: ApprovalStage,
        role: &Role,
    ) -> Result<ApprovalStage, TransitionError> {
        self.approving_level(stage, role)
            .map(ApprovalStage::Approved)
            .ok_or_else(|| TransitionError::IllegalTransition {
                action: Action::Approve,
                stage,
                role: role.clone(),
            })
    }

    pub fn can_reject(&self, stage: ApprovalStage, role: &Role) -> bool {
        self.rejecting_level(stage, role).is_some()
    }

    /// Compute the stage a rejection by `role` produces. A blank reason is
    /// refused even when the role is allowed to reject.
    pub fn reject(
        &self,
        stage: ApprovalStage,
        role: &Role,
        reason: &str,
    ) -> Result<ApprovalStage, TransitionError> {
        let level =
            self.rejecting_level(stage, role)
                .ok_or_else(|| TransitionError::IllegalTransition {
                    action: Action::Reject,
                    stage,
                    role: role.clone(),
                })?;

        if reason.trim().is_empty() {
            return Err(TransitionError::MissingReason);
        }

        Ok(ApprovalStage::Rejected(level))
    }

    /// Edit and delete are open to ROLE_ADMIN and ROLE_L1 only.
    pub fn can_edit(&self, role: &Role) -> bool {
        match role {
            Role::Admin => true,
            Role::Approver(level) => *level == Level::FIRST,
            _ => false,
        }
    }
}
