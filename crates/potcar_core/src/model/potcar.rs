//! POTCAR record model.
//!
//! # Responsibility
//! - Define content hashes, identifying attributes and the two record tiers.
//! - Derive shadow records from full records without linking them.
//!
//! # Invariants
//! - `PotcarHash` is the lowercase hex SHA-256 of the raw payload bytes.
//! - A `RecordKind::Full` record always has a `content_id`; a
//!   `RecordKind::Shadow` record never has one.
//! - Shadow/full association is recomputed from attributes, never stored.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one stored record row.
pub type RecordId = Uuid;

/// Stable identifier of one payload entity in the content store.
pub type ContentId = Uuid;

/// Content digest used as the uniqueness key of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PotcarHash(String);

impl PotcarHash {
    /// Hashes raw payload bytes.
    pub fn of(payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wraps an already computed hex digest, e.g. one read back from storage.
    ///
    /// Returns `None` unless the value is 64 lowercase hex characters.
    pub fn from_hex(value: &str) -> Option<Self> {
        let valid = value.len() == 64
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PotcarHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identifying metadata of one POTCAR payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PotcarAttributes {
    /// Digest of the raw payload; the uniqueness key.
    pub hash: PotcarHash,
    /// Full `TITEL` value, e.g. `PAW_PBE In_d 06Sep2000`.
    pub title: String,
    /// Exchange-correlation class, e.g. `PBE` or `LDA`.
    pub functional: String,
    /// Chemical element, e.g. `In`.
    pub element: String,
    /// Potential symbol, e.g. `In_d`.
    pub symbol: String,
}

/// Discriminates the two record tiers stored in one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Owns a payload in the content store.
    Full,
    /// Metadata only; safe to export without the payload.
    Shadow,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Shadow => "shadow",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "full" => Some(Self::Full),
            "shadow" => Some(Self::Shadow),
            _ => None,
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the record index: either a full record or its shadow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotcarRecord {
    pub uuid: RecordId,
    pub kind: RecordKind,
    #[serde(flatten)]
    pub attributes: PotcarAttributes,
    /// Payload entity owned by a full record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
}

impl PotcarRecord {
    /// Creates a full record owning the given payload entity.
    pub fn new_full(attributes: PotcarAttributes, content_id: ContentId) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: RecordKind::Full,
            attributes,
            content_id: Some(content_id),
        }
    }

    /// Derives a fresh shadow record by copying the attributes of `full`.
    ///
    /// The result has its own id and no reference back to `full`.
    pub fn shadow_of(full: &PotcarRecord) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: RecordKind::Shadow,
            attributes: full.attributes.clone(),
            content_id: None,
        }
    }

    pub fn hash(&self) -> &PotcarHash {
        &self.attributes.hash
    }

    pub fn title(&self) -> &str {
        &self.attributes.title
    }

    pub fn functional(&self) -> &str {
        &self.attributes.functional
    }

    pub fn element(&self) -> &str {
        &self.attributes.element
    }

    pub fn symbol(&self) -> &str {
        &self.attributes.symbol
    }

    pub fn is_full(&self) -> bool {
        self.kind == RecordKind::Full
    }

    pub fn is_shadow(&self) -> bool {
        self.kind == RecordKind::Shadow
    }

    /// Checks the kind/content pairing invariant.
    pub fn validate(&self) -> Result<(), String> {
        match (self.kind, self.content_id) {
            (RecordKind::Full, None) => Err(format!("full record {} has no payload", self.uuid)),
            (RecordKind::Shadow, Some(content_id)) => Err(format!(
                "shadow record {} must not reference payload {content_id}",
                self.uuid
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PotcarAttributes, PotcarHash, PotcarRecord, RecordKind};
    use uuid::Uuid;

    fn attributes() -> PotcarAttributes {
        PotcarAttributes {
            hash: PotcarHash::of(b"payload"),
            title: "PAW_PBE As 22Sep2009".to_string(),
            functional: "PBE".to_string(),
            element: "As".to_string(),
            symbol: "As".to_string(),
        }
    }

    #[test]
    fn hash_is_lowercase_sha256_hex() {
        let hash = PotcarHash::of(b"");
        assert_eq!(
            hash.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(PotcarHash::from_hex(hash.as_str()), Some(hash));
        assert_eq!(PotcarHash::from_hex("ABC"), None);
    }

    #[test]
    fn shadow_copies_attributes_without_payload() {
        let full = PotcarRecord::new_full(attributes(), Uuid::new_v4());
        let shadow = PotcarRecord::shadow_of(&full);

        assert_eq!(shadow.kind, RecordKind::Shadow);
        assert_eq!(shadow.attributes, full.attributes);
        assert_ne!(shadow.uuid, full.uuid);
        assert!(shadow.content_id.is_none());
        assert!(shadow.validate().is_ok());
    }

    #[test]
    fn validate_rejects_full_record_without_payload() {
        let mut full = PotcarRecord::new_full(attributes(), Uuid::new_v4());
        full.content_id = None;
        assert!(full.validate().is_err());
    }
}
