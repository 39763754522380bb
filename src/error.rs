use super::role::Role;
use super::stage::{ApprovalStage, MAX_LEVELS};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` is not a recognised approval stage")]
pub struct ParseStageError(pub String);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` is not a recognised list bucket")]
pub struct ParseBucketError(pub String);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` is not a recognised entity kind")]
pub struct ParseEntityError(pub String);

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("levels must be between 1 and {max}, got {0}", max = MAX_LEVELS)]
pub struct InvalidDepth(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Approve => f.write_str("approve"),
            Action::Reject => f.write_str("reject"),
        }
    }
}

/// Precondition failures raised by the stage transition authority.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{role} may not {action} a record at stage {stage}")]
    IllegalTransition {
        action: Action,
        stage: ApprovalStage,
        role: Role,
    },
    #[error("A rejection reason is required")]
    MissingReason,
}

/// Failures reported by the persistence backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Record {0} was not found")]
    NotFound(String),
    #[error("Backend refused the transition: {0}")]
    Forbidden(#[from] TransitionError),
    #[error("Record {0} changed since it was read")]
    Conflict(String),
    #[error("{0} may not delete records")]
    DeleteNotPermitted(Role),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to decode stored record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Errors surfaced to the user action that triggered them.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Record {0} is not in the current list")]
    UnknownRecord(String),
    #[error("{0} may not edit or delete records")]
    NotPermitted(Role),
    #[error("Backend rejected the request: {0}")]
    Backend(#[from] StoreError),
}

impl WorkflowError {
    /// Message shown in the generic failure notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            WorkflowError::Transition(TransitionError::MissingReason) => {
                "Please enter a reason for the rejection."
            }
            WorkflowError::Transition(TransitionError::IllegalTransition { .. })
            | WorkflowError::NotPermitted(_) => "You are not allowed to perform this action.",
            WorkflowError::UnknownRecord(_) => "The record is no longer available.",
            WorkflowError::Backend(_) => "The request failed. Please try again.",
        }
    }
}
