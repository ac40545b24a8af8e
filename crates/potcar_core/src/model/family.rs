//! Family (named group of full records) model.

use serde::{Deserialize, Serialize};

/// A named, user-curated collection of full records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotcarFamily {
    /// Unique family name.
    pub name: String,
    pub description: String,
    /// Number of full records currently in the family.
    pub member_count: u64,
}

/// Family target of an ingest or upload.
///
/// `description` is required only when the family does not exist yet; for an
/// existing family `Some` replaces the stored description and `None` keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilySpec {
    pub name: String,
    pub description: Option<String>,
}

impl FamilySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
