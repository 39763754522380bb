//! Utility functions for record identifiers

use super::entity::EntityKind;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32 under the given prefix
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// A fresh record id, prefixed so the owning module is visible in the id.
pub fn new_record_id(entity: EntityKind) -> anyhow::Result<String> {
    new_uuid_to_bech32(entity.id_prefix())
}
