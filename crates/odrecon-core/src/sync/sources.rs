//! SQLite sources and the queries run against them
//!
//! Connections are opened read-only, used for one parse and dropped before
//! returning, whatever the outcome.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use serde::Serialize;
use std::path::Path;

use super::deleted::{FilterDeleteRow, RecycleBinRow};
use super::normalize::{format_resource_id, parse_json_column, RawFileRow, RawFolderRow, RawScopeRow};
use crate::error::SourceKind;
use crate::ReconError;

pub const SYNC_ENGINE_DB: &str = "SyncEngineDatabase.db";
pub const SAFE_DELETE_DB: &str = "SafeDelete.db";

const SCOPE_QUERY: &str = "SELECT scopeID, siteID, webID, listID, tenantID, webURL, remotePath, \
     spoPermissions, libraryType FROM od_ScopeInfo_Records";

const FILE_QUERY: &str = "SELECT parentResourceID, resourceID, eTag, fileName, fileStatus, \
     spoPermissions, volumeID, itemIndex, lastChange, size, localHashDigest, sharedItem, \
     mediaDateTaken, mediaWidth, mediaHeight, mediaDuration FROM od_ClientFile_Records";

const FOLDER_QUERY: &str = "SELECT parentScopeID, parentResourceID, resourceID, eTag, folderName, \
     folderStatus, spoPermissions, volumeID, itemIndex FROM od_ClientFolder_Records";

const GRAPH_METADATA_QUERY: &str = "SELECT fileName, od_GraphMetadata_Records.* \
     FROM od_GraphMetadata_Records INNER JOIN od_ClientFile_Records \
     ON od_ClientFile_Records.resourceID = od_GraphMetadata_Records.resourceID";

const RECYCLE_BIN_QUERY: &str = "SELECT parentResourceId, resourceId, itemName, volumeId, fileId, \
     notificationTime FROM items_moved_to_recycle_bin";

const FILTER_DELETE_QUERY: &str =
    "SELECT path, volumeId, fileId, notificationTime, process FROM filter_delete_info";

/// Columns of `od_GraphMetadata_Records` holding JSON text
pub const GRAPH_JSON_COLUMNS: [&str; 2] = ["graphMetadataJSON", "filePolicies"];

/// Raw rows from the sync-state database
#[derive(Debug, Clone, Default)]
pub struct SyncEngineTables {
    pub scopes: Vec<RawScopeRow>,
    pub files: Vec<RawFileRow>,
    pub folders: Vec<RawFolderRow>,
}

/// Raw rows from the deletion-tracking database
#[derive(Debug, Clone, Default)]
pub struct SafeDeleteTables {
    pub recycle_bin: Vec<RecycleBinRow>,
    pub filter_deletes: Vec<FilterDeleteRow>,
}

/// A file's Graph API metadata row, with JSON columns parsed where possible
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphMetadataRecord {
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Open `path` read-only, run `read`, and close the connection
pub fn load_source<T, F>(kind: SourceKind, path: &Path, read: F) -> Result<T, ReconError>
where
    F: FnOnce(&Connection) -> rusqlite::Result<T>,
{
    if !path.is_file() {
        return Err(ReconError::unavailable(kind, format!("{} does not exist", path.display())));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| ReconError::unavailable(kind, e))?;

    let result = read(&conn).map_err(|e| ReconError::unavailable(kind, e));

    if let Err(e) = conn.close() {
        tracing::debug!("Closing {} reported: {:?}", kind, e.1);
    }

    result
}

pub fn read_sync_engine(conn: &Connection) -> rusqlite::Result<SyncEngineTables> {
    let scopes = query_rows(conn, SCOPE_QUERY, |row| {
        Ok(RawScopeRow {
            scope_id: identifier(row, "scopeID")?,
            site_id: identifier(row, "siteID")?,
            web_id: identifier(row, "webID")?,
            list_id: identifier(row, "listID")?,
            tenant_id: identifier(row, "tenantID")?,
            web_url: text(row, "webURL")?,
            remote_path: text(row, "remotePath")?,
            spo_permissions: integer(row, "spoPermissions")?,
            library_type: integer(row, "libraryType")?,
        })
    })?;

    let files = query_rows(conn, FILE_QUERY, |row| {
        Ok(RawFileRow {
            parent_resource_id: identifier(row, "parentResourceID")?,
            resource_id: identifier(row, "resourceID")?,
            e_tag: text(row, "eTag")?,
            file_name: text(row, "fileName")?,
            file_status: integer(row, "fileStatus")?,
            spo_permissions: integer(row, "spoPermissions")?,
            volume_id: integer(row, "volumeID")?,
            item_index: integer(row, "itemIndex")?,
            last_change: integer(row, "lastChange")?,
            size: integer(row, "size")?,
            local_hash_digest: blob(row, "localHashDigest")?,
            shared_item: integer(row, "sharedItem")?,
            media_date_taken: integer(row, "mediaDateTaken")?,
            media_width: integer(row, "mediaWidth")?,
            media_height: integer(row, "mediaHeight")?,
            media_duration: integer(row, "mediaDuration")?,
        })
    })?;

    let folders = query_rows(conn, FOLDER_QUERY, |row| {
        Ok(RawFolderRow {
            parent_scope_id: identifier(row, "parentScopeID")?,
            parent_resource_id: identifier(row, "parentResourceID")?,
            resource_id: identifier(row, "resourceID")?,
            e_tag: text(row, "eTag")?,
            folder_name: text(row, "folderName")?,
            folder_status: integer(row, "folderStatus")?,
            spo_permissions: integer(row, "spoPermissions")?,
            volume_id: integer(row, "volumeID")?,
            item_index: integer(row, "itemIndex")?,
        })
    })?;

    tracing::debug!(
        "Read {} scopes, {} files, {} folders",
        scopes.len(),
        files.len(),
        folders.len()
    );

    Ok(SyncEngineTables {
        scopes,
        files,
        folders,
    })
}

pub fn read_graph_metadata(conn: &Connection) -> rusqlite::Result<Vec<GraphMetadataRecord>> {
    let mut stmt = conn.prepare(GRAPH_METADATA_QUERY)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let rows = stmt
        .query_map([], |row| {
            let file_name = text(row, 0)?;
            let mut fields = serde_json::Map::new();

            for (idx, column) in columns.iter().enumerate().skip(1) {
                let value = if GRAPH_JSON_COLUMNS.contains(&column.as_str()) {
                    parse_json_column(text(row, idx)?.as_deref())
                } else {
                    json_value(row.get_ref(idx)?)
                };
                fields.insert(column.clone(), value);
            }

            Ok(GraphMetadataRecord { file_name, fields })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn read_safe_delete(conn: &Connection) -> rusqlite::Result<SafeDeleteTables> {
    let recycle_bin = query_rows(conn, RECYCLE_BIN_QUERY, |row| {
        Ok(RecycleBinRow {
            parent_resource_id: identifier(row, "parentResourceId")?,
            resource_id: identifier(row, "resourceId")?,
            item_name: text(row, "itemName")?,
            volume_id: integer(row, "volumeId")?,
            file_id: integer(row, "fileId")?,
            notification_time: integer(row, "notificationTime")?,
        })
    })?;

    let filter_deletes = query_rows(conn, FILTER_DELETE_QUERY, |row| {
        Ok(FilterDeleteRow {
            path: text(row, "path")?,
            volume_id: integer(row, "volumeId")?,
            file_id: integer(row, "fileId")?,
            notification_time: integer(row, "notificationTime")?,
            process: text(row, "process")?,
        })
    })?;

    Ok(SafeDeleteTables {
        recycle_bin,
        filter_deletes,
    })
}

fn query_rows<T, F>(conn: &Connection, sql: &str, map: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// Column readers tolerate SQLite's loose typing: a column declared INTEGER
// may hold text and identifiers may be stored as blobs.

fn text<I: rusqlite::RowIndex + Copy>(row: &Row<'_>, idx: I) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}

fn identifier<I: rusqlite::RowIndex + Copy>(row: &Row<'_>, idx: I) -> rusqlite::Result<Option<String>> {
    match row.get_ref(idx)? {
        ValueRef::Blob(raw) => Ok(Some(format_resource_id(raw))),
        _ => text(row, idx),
    }
}

fn integer<I: rusqlite::RowIndex + Copy>(row: &Row<'_>, idx: I) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) => Some(f as i64),
        ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(|s| s.trim().parse().ok()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}

fn blob<I: rusqlite::RowIndex + Copy>(row: &Row<'_>, idx: I) -> rusqlite::Result<Option<Vec<u8>>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Blob(b) | ValueRef::Text(b) => Some(b.to_vec()),
        ValueRef::Null | ValueRef::Integer(_) | ValueRef::Real(_) => None,
    })
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}
