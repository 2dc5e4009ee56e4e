//! Deleted-item merging
//!
//! `SafeDelete.db` tracks deletions in two tables with different columns.
//! Both are reshaped into [`DeletedRecord`] and concatenated, recycle-bin
//! rows first.

use super::normalize::{format_timestamp, format_volume_id};
use super::records::DeletedRecord;

/// Row from `items_moved_to_recycle_bin`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecycleBinRow {
    pub parent_resource_id: Option<String>,
    pub resource_id: Option<String>,
    pub item_name: Option<String>,
    pub volume_id: Option<i64>,
    pub file_id: Option<i64>,
    pub notification_time: Option<i64>,
}

/// Row from `filter_delete_info`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterDeleteRow {
    pub path: Option<String>,
    pub volume_id: Option<i64>,
    pub file_id: Option<i64>,
    pub notification_time: Option<i64>,
    pub process: Option<String>,
}

impl RecycleBinRow {
    pub fn into_record(self) -> DeletedRecord {
        DeletedRecord {
            parent_resource_id: self.parent_resource_id.unwrap_or_default(),
            resource_id: self.resource_id.unwrap_or_default(),
            name: self.item_name.unwrap_or_default(),
            volume_id: format_volume_id(self.volume_id),
            file_id: self.file_id,
            delete_time_stamp: format_timestamp(self.notification_time),
            ..Default::default()
        }
    }
}

impl FilterDeleteRow {
    pub fn into_record(self) -> DeletedRecord {
        let (path, name) = split_full_path(self.path.as_deref().unwrap_or_default());
        DeletedRecord {
            path,
            name,
            volume_id: format_volume_id(self.volume_id),
            file_id: self.file_id,
            delete_time_stamp: format_timestamp(self.notification_time),
            deleting_process: self.process.unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Split a stored full path on its last backslash into `(directory, name)`
///
/// Without a separator the whole value serves as both.
pub fn split_full_path(full: &str) -> (String, String) {
    match full.rsplit_once('\\') {
        Some((dir, name)) => (dir.to_string(), name.to_string()),
        None => (full.to_string(), full.to_string()),
    }
}

/// Concatenate both deletion sources into one stream
pub fn merge_deletions(
    recycle_bin: Vec<RecycleBinRow>,
    filter_deletes: Vec<FilterDeleteRow>,
) -> Vec<DeletedRecord> {
    recycle_bin
        .into_iter()
        .map(RecycleBinRow::into_record)
        .chain(filter_deletes.into_iter().map(FilterDeleteRow::into_record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncRecord;

    #[test]
    fn test_disjoint_rows_merge_in_source_order() {
        let merged = merge_deletions(
            vec![RecycleBinRow {
                parent_resource_id: Some("P1".into()),
                resource_id: Some("R1".into()),
                item_name: Some("old.docx".into()),
                volume_id: Some(0x0012ABCD),
                file_id: Some(77),
                notification_time: Some(1_650_000_000),
            }],
            vec![FilterDeleteRow {
                path: Some(r"C:\Users\x\OneDrive\notes.txt".into()),
                volume_id: Some(0xDEADBEEF),
                file_id: Some(9),
                notification_time: None,
                process: Some("explorer.exe".into()),
            }],
        );

        assert_eq!(merged.len(), 2);

        let bin = &merged[0];
        assert_eq!(bin.name, "old.docx");
        assert_eq!(bin.volume_id, "0012-ABCD");
        assert_eq!(bin.delete_time_stamp, "2022-04-15 05:20:00");
        assert_eq!(bin.path, "");
        assert_eq!(bin.deleting_process, "");

        let filter = &merged[1];
        assert_eq!(filter.path, r"C:\Users\x\OneDrive");
        assert_eq!(filter.name, "notes.txt");
        assert_eq!(filter.resource_id, "");
        assert_eq!(filter.deleting_process, "explorer.exe");
        assert_eq!(filter.delete_time_stamp, "1970-01-01 00:00:00");

        for record in merged {
            let value = serde_json::to_value(SyncRecord::Deleted(record)).unwrap();
            assert_eq!(value["Type"], "Deleted");
            // Type plus the 12 shared columns
            assert_eq!(value.as_object().unwrap().len(), 13);
        }
    }

    #[test]
    fn test_path_without_separator() {
        assert_eq!(
            split_full_path("lonely.txt"),
            ("lonely.txt".to_string(), "lonely.txt".to_string())
        );
    }

    #[test]
    fn test_empty_sources() {
        assert!(merge_deletions(Vec::new(), Vec::new()).is_empty());
    }
}
