//! Visibility filter: which records land in which queue for which role
use super::engine::ApprovalEngine;
use super::error::ParseBucketError;
use super::record::Approvable;
use super::role::Role;
use super::stage::ApprovalStage;
use std::fmt;
use std::str::FromStr;

/// The tabs of a module's list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    All,
    Pending,
    Approved,
    Rejected,
    /// Everything not yet terminal, regardless of who acts next.
    InProgress,
}

impl ApprovalEngine {
    /// Whether a record at `stage` belongs in `bucket` for `role`.
    /// Unrecognised role/bucket combinations place nothing in the bucket.
    pub fn in_bucket(&self, stage: ApprovalStage, role: &Role, bucket: Bucket) -> bool {
        let levels = self.levels();

        match (bucket, role) {
            (Bucket::All, _) => true,

            (Bucket::Pending, Role::Admin) => {
                self.policy().admin_override && !stage.is_terminal(levels)
            }
            (Bucket::Pending, _) => self
                .level_within_depth(role)
                .is_some_and(|level| stage == level.predecessor()),

            (Bucket::Approved, Role::Admin) => stage.is_fully_approved(levels),
            (Bucket::Approved, _) => self
                .level_within_depth(role)
                .is_some_and(|level| stage == ApprovalStage::Approved(level)),

            (Bucket::Rejected, Role::Admin) => stage.is_rejected(),
            // cumulative: a level sees its own rejections and those of the
            // level directly above it
            (Bucket::Rejected, _) => match (self.level_within_depth(role), stage) {
                (Some(own), ApprovalStage::Rejected(by)) => {
                    by == own || (by == own.next() && by.get() <= levels)
                }
                _ => false,
            },

            (Bucket::InProgress, Role::Admin | Role::User) => !stage.is_terminal(levels),
            (Bucket::InProgress, _) => {
                self.level_within_depth(role).is_some() && !stage.is_terminal(levels)
            }
        }
    }

    /// The subset of `records` shown to `role` under `bucket`, in input order.
    pub fn filter_by_bucket<'a, R: Approvable>(
        &self,
        records: &'a [R],
        role: &Role,
        bucket: Bucket,
    ) -> Vec<&'a R> {
        records
            .iter()
            .filter(|record| self.in_bucket(record.stage(), role, bucket))
            .collect()
    }

    /// Detail-view gate. Narrower than the bucket union on purpose: a level
    /// may open what it can act on, and the final level may also open what
    /// it fully approved.
    pub fn can_view(&self, stage: ApprovalStage, role: &Role) -> bool {
        if role.is_admin() {
            return true;
        }

        match self.level_within_depth(role) {
            Some(level) => {
                stage == level.predecessor()
                    || (Some(level) == self.final_level()
                        && stage == ApprovalStage::Approved(level))
            }
            None => false,
        }
    }
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::All,
        Bucket::Pending,
        Bucket::Approved,
        Bucket::Rejected,
        Bucket::InProgress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::All => "ALL",
            Bucket::Pending => "PENDING",
            Bucket::Approved => "APPROVED",
            Bucket::Rejected => "REJECTED",
            Bucket::InProgress => "IN_PROGRESS",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = ParseBucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase();
        Bucket::ALL
            .into_iter()
            .find(|bucket| bucket.as_str() == key)
            .ok_or_else(|| ParseBucketError(s.to_string()))
    }
}
