use super::error::ParseEntityError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Business entities that go through the approval chain.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[n(0)]
    CustomerBatch,
    #[n(1)]
    KmBatch,
    #[n(2)]
    CastingReport,
    #[n(3)]
    CubeTest,
    #[n(4)]
    ProductionEntry,
    #[n(5)]
    WireCuttingReport,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::CustomerBatch,
        EntityKind::KmBatch,
        EntityKind::CastingReport,
        EntityKind::CubeTest,
        EntityKind::ProductionEntry,
        EntityKind::WireCuttingReport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::CustomerBatch => "customer_batch",
            EntityKind::KmBatch => "km_batch",
            EntityKind::CastingReport => "casting_report",
            EntityKind::CubeTest => "cube_test",
            EntityKind::ProductionEntry => "production_entry",
            EntityKind::WireCuttingReport => "wire_cutting_report",
        }
    }

    /// Human readable part of the bech32 record ids issued for this kind.
    pub fn id_prefix(self) -> &'static str {
        match self {
            EntityKind::CustomerBatch => "custbatch_",
            EntityKind::KmBatch => "kmbatch_",
            EntityKind::CastingReport => "casting_",
            EntityKind::CubeTest => "cubetest_",
            EntityKind::ProductionEntry => "prodentry_",
            EntityKind::WireCuttingReport => "wirecut_",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseEntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| ParseEntityError(s.to_string()))
    }
}
