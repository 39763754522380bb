//! Approvable records as held in a module's list view
use super::entity::EntityKind;
use super::error::StoreError;
use super::stage::{ApprovalStage, Level};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Anything carrying an approval stage can be filtered into buckets.
pub trait Approvable {
    fn stage(&self) -> ApprovalStage;
}

impl Approvable for ApprovalStage {
    fn stage(&self) -> ApprovalStage {
        *self
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

/// Who signed off a level, and when.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApproverStamp {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub at: TimeStamp,
}

/// The most recent rejection and the reason given for it.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    #[n(0)]
    pub level: Level,
    #[n(1)]
    pub reason: String,
    #[n(2)]
    pub rejected_by: String,
    #[n(3)]
    pub at: TimeStamp,
}

// Key is the record id; the value is this struct encoded into CBOR
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRecord {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7 with an entity prefix
    #[n(1)]
    pub entity: EntityKind,
    #[n(2)]
    pub stage: ApprovalStage,
    #[n(3)]
    approvers: Vec<Option<ApproverStamp>>, // one slot per level, index 0 is L1
    #[n(4)]
    pub rejection: Option<Rejection>,
    #[n(5)]
    pub created_by: String,
    #[n(6)]
    pub created_at: TimeStamp,
    #[n(7)]
    pub payload: BTreeMap<String, String>, // entity specific fields, opaque to the engine
}

impl Approvable for ApprovalRecord {
    fn stage(&self) -> ApprovalStage {
        self.stage
    }
}

impl ApprovalRecord {
    /// A freshly submitted record at stage `NONE`.
    pub fn new(
        id: String,
        entity: EntityKind,
        created_by: String,
        payload: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id,
            entity,
            stage: ApprovalStage::None,
            approvers: Vec::new(),
            rejection: None,
            created_by,
            created_at: TimeStamp::new(),
            payload,
        }
    }

    pub fn approver(&self, level: Level) -> Option<&ApproverStamp> {
        self.approvers.get(level.index()).and_then(Option::as_ref)
    }

    /// Name of whoever signed off `level`, e.g. `approvedByL2`.
    pub fn approved_by(&self, level: Level) -> Option<&str> {
        self.approver(level).map(|stamp| stamp.name.as_str())
    }

    pub fn approvers(&self) -> impl Iterator<Item = (Level, &ApproverStamp)> {
        self.approvers.iter().enumerate().filter_map(|(i, slot)| {
            let level = u8::try_from(i + 1).ok().and_then(Level::new)?;
            slot.as_ref().map(|stamp| (level, stamp))
        })
    }

    /// Move to the approved stage for `level` and stamp the approver.
    pub fn record_approval(&mut self, level: Level, name: String) {
        let index = level.index();
        if self.approvers.len() <= index {
            self.approvers.resize(index + 1, None);
        }
        self.approvers[index] = Some(ApproverStamp {
            name,
            at: TimeStamp::new(),
        });
        self.stage = ApprovalStage::Approved(level);
    }

    /// Move to the rejected stage for `level`, keeping the reason.
    pub fn record_rejection(&mut self, level: Level, rejected_by: String, reason: String) {
        self.rejection = Some(Rejection {
            level,
            reason,
            rejected_by,
            at: TimeStamp::new(),
        });
        self.stage = ApprovalStage::Rejected(level);
    }

    /// Serialise into CBOR and hash it. The hash is the record's fingerprint.
    pub fn encode_with_hash(&self) -> Result<(String, Vec<u8>), StoreError> {
        let cbor = minicbor::to_vec(self).map_err(|e| StoreError::Encode(e.to_string()))?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }

    pub fn fingerprint(&self) -> Result<String, StoreError> {
        self.encode_with_hash().map(|(hash, _)| hash)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
