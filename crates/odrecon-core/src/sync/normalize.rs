//! Per-row field normalisation
//!
//! All transforms are pure and total: absent input maps to a fixed empty
//! rendering, never to an error.

use base64::Engine;
use byteorder::{BigEndian, ReadBytesExt};
use chrono::DateTime;
use serde::Serialize;
use std::io::Cursor;

use super::records::{
    AccountProfile, FileRecord, FolderRecord, MediaBlock, ScopeRecord,
};

/// SharePoint permission bits, in rendering order
pub const PERMISSION_NAMES: [(u32, &str); 27] = [
    // Lists and documents
    (0x1, "ViewListItems"),
    (0x2, "AddListItems"),
    (0x4, "EditListItems"),
    (0x8, "DeleteListItems"),
    (0x10, "ApproveItems"),
    (0x20, "OpenItems"),
    (0x40, "ViewVersions"),
    (0x80, "DeleteVersions"),
    (0x100, "OverrideListBehaviors"),
    (0x200, "ManagePersonalViews"),
    (0x400, "ManageLists"),
    (0x800, "ViewApplicationPages"),
    // Web level
    (0x1000, "Open"),
    (0x2000, "ViewPages"),
    (0x4000, "AddAndCustomizePages"),
    (0x8000, "ApplyThemAndBorder"),
    (0x10000, "ApplyStyleSheets"),
    (0x20000, "ViewAnalyticsData"),
    (0x40000, "UseSSCSiteCreation"),
    (0x80000, "CreateSubsite"),
    (0x100000, "CreateGroups"),
    (0x200000, "ManagePermissions"),
    (0x400000, "BrowseDirectories"),
    (0x800000, "BrowseUserInfo"),
    (0x1000000, "AddDelPersonalWebParts"),
    (0x2000000, "UpdatePersonalWebParts"),
    (0x4000000, "ManageWeb"),
];

/// Rendering of a null timestamp
pub const EPOCH_ZERO: &str = "1970-01-01 00:00:00";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Named capabilities decoded from a permission mask
///
/// A zero mask decodes to an empty set. No "EmptyMask" entry is ever
/// produced: the historical test for it masked with zero and could not fire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(Vec<&'static str>);

impl PermissionSet {
    pub fn from_mask(mask: u32) -> Self {
        PermissionSet(
            PERMISSION_NAMES
                .iter()
                .filter(|(bit, _)| mask & bit != 0)
                .map(|&(_, name)| name)
                .collect(),
        )
    }

    /// Decode a stored column; null and out-of-range values count as zero
    pub fn from_column(mask: Option<i64>) -> Self {
        Self::from_mask(mask.and_then(|m| u32::try_from(m).ok()).unwrap_or(0))
    }

    pub fn names(&self) -> &[&'static str] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `SHA1(<hex>)` for personal accounts, `quickXor(<base64>)` otherwise
pub fn format_hash(digest: Option<&[u8]>, profile: AccountProfile) -> String {
    let Some(digest) = digest else {
        return String::new();
    };

    match profile {
        AccountProfile::Personal => format!("SHA1({})", hex::encode(digest)),
        AccountProfile::Business => format!(
            "quickXor({})",
            base64::engine::general_purpose::STANDARD.encode(digest)
        ),
    }
}

/// Epoch seconds to `YYYY-MM-DD HH:MM:SS` (UTC)
pub fn format_timestamp(epoch_seconds: Option<i64>) -> String {
    epoch_seconds
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| EPOCH_ZERO.to_string())
}

/// Byte count to `"<n,nnn> KB"`
///
/// Always `bytes / 1024 + 1` with flooring division, so exact multiples of
/// 1024 still round up and `-1` renders `0 KB`. Exported reports have always
/// carried this rounding.
pub fn format_size(bytes: Option<i64>) -> String {
    match bytes {
        Some(bytes) => {
            if bytes < 0 {
                tracing::debug!("Negative size {} rendered as recorded", bytes);
            }
            let kb = bytes.div_euclid(1024) + 1;
            format!("{} KB", group_thousands(kb))
        }
        None => String::new(),
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// 32-bit volume serial as `XXXX-XXXX`
pub fn format_volume_id(volume_id: Option<i64>) -> String {
    match volume_id {
        Some(id) => {
            let serial = u32::try_from(id).unwrap_or_else(|_| {
                tracing::debug!("Volume id {} is not a 32-bit serial; keeping the low 32 bits", id);
                id as u32
            });
            let digits = format!("{:08X}", serial);
            format!("{}-{}", &digits[..4], &digits[4..])
        }
        None => String::new(),
    }
}

/// Resource identifiers stored as blobs: 32 ASCII bytes plus an optional
/// big-endian counter, rendered `<id>+<n>` when the counter is non-zero
pub fn format_resource_id(raw: &[u8]) -> String {
    let split = raw.len().min(32);
    let (id, suffix) = raw.split_at(split);
    let id = String::from_utf8_lossy(id);

    let mut padded = [0u8; 8];
    let tail = &suffix[suffix.len().saturating_sub(8)..];
    padded[8 - tail.len()..].copy_from_slice(tail);
    let counter = Cursor::new(padded).read_u64::<BigEndian>().unwrap_or(0);

    if counter != 0 {
        format!("{}+{}", id, counter)
    } else {
        id.into_owned()
    }
}

/// Parse a JSON text column when it holds valid JSON
///
/// Null or blank becomes `""`; anything unparseable stays the raw string.
pub fn parse_json_column(text: Option<&str>) -> serde_json::Value {
    match text {
        Some(text) if !text.trim().is_empty() => serde_json::from_str(text)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string())),
        _ => serde_json::Value::String(String::new()),
    }
}

/// Scope row as read from `od_ScopeInfo_Records`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawScopeRow {
    pub scope_id: Option<String>,
    pub site_id: Option<String>,
    pub web_id: Option<String>,
    pub list_id: Option<String>,
    pub tenant_id: Option<String>,
    pub web_url: Option<String>,
    pub remote_path: Option<String>,
    pub spo_permissions: Option<i64>,
    pub library_type: Option<i64>,
}

impl RawScopeRow {
    pub fn normalize(&self) -> ScopeRecord {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        ScopeRecord {
            scope_id: text(&self.scope_id),
            site_id: text(&self.site_id),
            web_id: text(&self.web_id),
            list_id: text(&self.list_id),
            tenant_id: text(&self.tenant_id),
            web_url: text(&self.web_url),
            remote_path: text(&self.remote_path),
            spo_permissions: PermissionSet::from_column(self.spo_permissions),
            library_type: self.library_type,
        }
    }
}

/// File row as read from `od_ClientFile_Records`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFileRow {
    pub parent_resource_id: Option<String>,
    pub resource_id: Option<String>,
    pub e_tag: Option<String>,
    pub file_name: Option<String>,
    pub file_status: Option<i64>,
    pub spo_permissions: Option<i64>,
    pub volume_id: Option<i64>,
    pub item_index: Option<i64>,
    pub last_change: Option<i64>,
    pub size: Option<i64>,
    pub local_hash_digest: Option<Vec<u8>>,
    pub shared_item: Option<i64>,
    pub media_date_taken: Option<i64>,
    pub media_width: Option<i64>,
    pub media_height: Option<i64>,
    pub media_duration: Option<i64>,
}

impl RawFileRow {
    pub fn normalize(&self, profile: AccountProfile) -> FileRecord {
        FileRecord {
            parent_resource_id: self.parent_resource_id.clone(),
            resource_id: self.resource_id.clone(),
            e_tag: self.e_tag.clone(),
            name: self.file_name.clone(),
            file_status: self.file_status,
            spo_permissions: PermissionSet::from_column(self.spo_permissions),
            volume_id: self.volume_id,
            item_index: self.item_index,
            last_change: format_timestamp(self.last_change),
            size: format_size(self.size),
            local_hash_digest: format_hash(self.local_hash_digest.as_deref(), profile),
            shared_item: self.shared_item,
            media: MediaBlock {
                date_taken: format_timestamp(self.media_date_taken),
                width: self.media_width.unwrap_or(0),
                height: self.media_height.unwrap_or(0),
                duration: self.media_duration.unwrap_or(0),
            },
            path: None,
        }
    }
}

/// Folder row as read from `od_ClientFolder_Records`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFolderRow {
    pub parent_scope_id: Option<String>,
    pub parent_resource_id: Option<String>,
    pub resource_id: Option<String>,
    pub e_tag: Option<String>,
    pub folder_name: Option<String>,
    pub folder_status: Option<i64>,
    pub spo_permissions: Option<i64>,
    pub volume_id: Option<i64>,
    pub item_index: Option<i64>,
}

impl RawFolderRow {
    pub fn normalize(&self) -> FolderRecord {
        FolderRecord {
            parent_scope_id: self.parent_scope_id.clone(),
            parent_resource_id: self.parent_resource_id.clone(),
            resource_id: self.resource_id.clone(),
            e_tag: self.e_tag.clone(),
            name: self.folder_name.clone(),
            folder_status: self.folder_status,
            spo_permissions: PermissionSet::from_column(self.spo_permissions),
            volume_id: self.volume_id,
            item_index: self.item_index,
            path: None,
        }
    }
}
