//! Variant records asking workers to re-sync a stored entity into the search index.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionDataSyncArgs {
    #[serde(rename = "SessionID")]
    pub session_id: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorGroupDataSyncArgs {
    #[serde(rename = "ErrorGroupID")]
    pub error_group_id: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorObjectDataSyncArgs {
    #[serde(rename = "ErrorObjectID")]
    pub error_object_id: i64,
}
