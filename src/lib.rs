//! Sequential multi-level approval workflow.
//!
//! Records move `NONE → L1 → L2 → L3`, or sideways into `L<k>_REJECTED`.
//! [`engine::ApprovalEngine`] decides who may move a record and who sees it;
//! [`service::ApprovalQueue`] drives a module's list view against a
//! [`store::RecordStore`] backend.

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod policy;
pub mod record;
pub mod role;
pub mod service;
pub mod stage;
pub mod store;
pub mod telemetry;
pub mod transition;
pub mod utils;
pub mod visibility;

pub use engine::{ApprovalEngine, RecordActions};
pub use entity::EntityKind;
pub use error::{StoreError, TransitionError, WorkflowError};
pub use policy::{PolicySet, RejectScope, WorkflowPolicy};
pub use record::{Approvable, ApprovalRecord};
pub use role::{Actor, Role};
pub use service::ApprovalQueue;
pub use stage::{ApprovalStage, Level};
pub use store::{RecordStore, SledStore};
pub use visibility::Bucket;
