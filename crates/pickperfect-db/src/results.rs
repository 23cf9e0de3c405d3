use pickperfect_core::DocumentId;
use serde::{Deserialize, Serialize};

/// Outcome of inserting a single document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
    pub acknowledged: bool,
    pub inserted_id: DocumentId,
}

/// Outcome of updating a single document
///
/// Upserts are never performed, `upserted_*` fields exist so the response
/// keeps the shape clients already parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub modified_count: u64,
    pub upserted_id: Option<DocumentId>,
    pub upserted_count: u64,
    pub matched_count: u64,
}

impl UpdateResult {
    pub(crate) fn unmatched() -> Self {
        Self {
            acknowledged: true,
            modified_count: 0,
            upserted_id: None,
            upserted_count: 0,
            matched_count: 0,
        }
    }

    pub(crate) fn matched(modified: bool) -> Self {
        Self {
            modified_count: u64::from(modified),
            matched_count: 1,
            ..Self::unmatched()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

impl DeleteResult {
    pub(crate) fn deleted(count: u64) -> Self {
        Self {
            acknowledged: true,
            deleted_count: count,
        }
    }
}
