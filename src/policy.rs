//! Per-entity workflow policy
//!
//! Modules differ in how many levels they run and in who may reject. Those
//! differences live here as data so a single engine serves every module.
use super::entity::EntityKind;
use super::error::InvalidDepth;
use super::stage::{DEFAULT_LEVELS, MAX_LEVELS};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Which roles may reject a record that is still in progress.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RejectScope {
    /// Only the role that could approve may reject.
    #[default]
    Sequential,
    /// Any approver level may reject while the record is not terminal.
    AnyApprover,
}

/// A workflow policy. The depth is always within `1..=MAX_LEVELS`; the only
/// way to change it is [`WorkflowPolicy::with_levels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowPolicy {
    levels: u8,
    pub reject_scope: RejectScope,
    /// With [`RejectScope::AnyApprover`]: once the record waits on the final
    /// level, only the final level may reject it.
    pub reserve_final_rejection: bool,
    /// Lets ROLE_ADMIN act on behalf of whichever level is pending.
    pub admin_override: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS,
            reject_scope: RejectScope::Sequential,
            reserve_final_rejection: false,
            admin_override: false,
        }
    }
}

impl WorkflowPolicy {
    pub fn with_levels(mut self, levels: u8) -> Result<Self, InvalidDepth> {
        if levels == 0 || levels > MAX_LEVELS {
            return Err(InvalidDepth(levels));
        }
        self.levels = levels;
        Ok(self)
    }
    pub fn levels(&self) -> u8 {
        self.levels
    }
    pub fn with_reject_scope(mut self, scope: RejectScope) -> Self {
        self.reject_scope = scope;
        self
    }
    pub fn reserve_final_rejection(mut self, reserve: bool) -> Self {
        self.reserve_final_rejection = reserve;
        self
    }
    pub fn with_admin_override(mut self, enabled: bool) -> Self {
        self.admin_override = enabled;
        self
    }
}

/// Partial policy read from an `[entities.<kind>]` config table.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverride {
    pub levels: Option<u8>,
    pub reject_scope: Option<RejectScope>,
    pub reserve_final_rejection: Option<bool>,
    pub admin_override: Option<bool>,
}

impl PolicyOverride {
    pub fn apply(&self, base: WorkflowPolicy) -> Result<WorkflowPolicy, InvalidDepth> {
        let merged = WorkflowPolicy {
            reject_scope: self.reject_scope.unwrap_or(base.reject_scope),
            reserve_final_rejection: self
                .reserve_final_rejection
                .unwrap_or(base.reserve_final_rejection),
            admin_override: self.admin_override.unwrap_or(base.admin_override),
            ..base
        };

        match self.levels {
            Some(levels) => merged.with_levels(levels),
            None => Ok(merged),
        }
    }
}

/// The policy each entity kind runs under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    default: WorkflowPolicy,
    overrides: BTreeMap<EntityKind, WorkflowPolicy>,
}

impl PolicySet {
    pub fn new(default: WorkflowPolicy) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }
    pub fn with_entity(mut self, kind: EntityKind, policy: WorkflowPolicy) -> Self {
        self.overrides.insert(kind, policy);
        self
    }
    pub fn policy_for(&self, kind: EntityKind) -> WorkflowPolicy {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, WorkflowPolicy)> + '_ {
        EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, self.policy_for(kind)))
    }
}
