//! Typed records from the sync engine databases
//!
//! Column names on the wire (JSON) follow the database, with the renames the
//! exported tables have always used (`Name`, `Media`, `DeleteTimeStamp`...).

use serde::Serialize;

use super::normalize::PermissionSet;

/// Which hash the account's digests use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AccountProfile {
    /// Consumer account: SHA1 digests
    Personal,
    /// Work or school account: quickXor digests
    Business,
}

impl AccountProfile {
    pub fn from_account(account: &str) -> Self {
        if account == "Personal" {
            AccountProfile::Personal
        } else {
            AccountProfile::Business
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRecord {
    #[serde(rename = "scopeID")]
    pub scope_id: String,
    #[serde(rename = "siteID")]
    pub site_id: String,
    #[serde(rename = "webID")]
    pub web_id: String,
    #[serde(rename = "listID")]
    pub list_id: String,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    #[serde(rename = "webURL")]
    pub web_url: String,
    pub remote_path: String,
    pub spo_permissions: PermissionSet,
    pub library_type: Option<i64>,
}

/// Media properties of a file; absent values collapse to zero
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaBlock {
    pub date_taken: String,
    pub width: i64,
    pub height: i64,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "parentResourceID")]
    pub parent_resource_id: Option<String>,
    #[serde(rename = "resourceID")]
    pub resource_id: Option<String>,
    pub e_tag: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    pub file_status: Option<i64>,
    pub spo_permissions: PermissionSet,
    #[serde(rename = "volumeID")]
    pub volume_id: Option<i64>,
    pub item_index: Option<i64>,
    pub last_change: String,
    pub size: String,
    pub local_hash_digest: String,
    pub shared_item: Option<i64>,
    #[serde(rename = "Media")]
    pub media: MediaBlock,
    #[serde(rename = "Path")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    #[serde(rename = "parentScopeID")]
    pub parent_scope_id: Option<String>,
    #[serde(rename = "parentResourceID")]
    pub parent_resource_id: Option<String>,
    #[serde(rename = "resourceID")]
    pub resource_id: Option<String>,
    pub e_tag: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    pub folder_status: Option<i64>,
    pub spo_permissions: PermissionSet,
    #[serde(rename = "volumeID")]
    pub volume_id: Option<i64>,
    pub item_index: Option<i64>,
    #[serde(rename = "Path")]
    pub path: Option<String>,
}

/// Deleted item in the common 13-column shape shared by both deletion sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletedRecord {
    #[serde(rename = "parentResourceId")]
    pub parent_resource_id: String,
    #[serde(rename = "resourceId")]
    pub resource_id: String,
    #[serde(rename = "eTag")]
    pub e_tag: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "inRecycleBin")]
    pub in_recycle_bin: String,
    #[serde(rename = "volumeId")]
    pub volume_id: String,
    #[serde(rename = "fileId")]
    pub file_id: Option<i64>,
    #[serde(rename = "DeleteTimeStamp")]
    pub delete_time_stamp: String,
    #[serde(rename = "deletingProcess")]
    pub deleting_process: String,
    pub size: String,
    pub hash: String,
}

/// One row of the unified record stream, tagged by `Type`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Type")]
pub enum SyncRecord {
    Scope(ScopeRecord),
    File(FileRecord),
    Folder(FolderRecord),
    Deleted(DeletedRecord),
}

impl SyncRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncRecord::Scope(_) => "Scope",
            SyncRecord::File(_) => "File",
            SyncRecord::Folder(_) => "Folder",
            SyncRecord::Deleted(_) => "Deleted",
        }
    }

    pub fn resource_id(&self) -> Option<&str> {
        match self {
            SyncRecord::Scope(scope) => Some(scope.scope_id.as_str()),
            SyncRecord::File(file) => file.resource_id.as_deref(),
            SyncRecord::Folder(folder) => folder.resource_id.as_deref(),
            SyncRecord::Deleted(deleted) => {
                Some(deleted.resource_id.as_str()).filter(|id| !id.is_empty())
            }
        }
    }
}
