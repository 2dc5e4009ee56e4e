//! Fixed-offset field extraction
//!
//! Relative to a tag at offset `s`, a directory-entry record stores:
//! - the parent (folder) identifier at `s - 40`, 32 ASCII bytes
//! - the object identifier at `s - 79`, 32 ASCII bytes
//! - the display name as UTF-16LE somewhere after the object identifier

use encoding_rs::UTF_16LE;
use regex::bytes::Regex;
use std::cell::OnceCell;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::scanner::{RawRecordLocation, RecordScanner};
use super::tree::{DirectoryEntry, EntryKind};
use crate::ReconError;

pub const PARENT_ID_BACK: usize = 40;
pub const OBJECT_ID_BACK: usize = 79;
pub const ID_LEN: usize = 32;

/// Minimum number of UTF-16 code units in a name run
pub const MIN_NAME_UNITS: usize = 4;

// Printable ASCII plus tab, each followed by a zero high byte
static NAME_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?-u)(?:[\x20-\x7E\t]\x00){{{},}}", MIN_NAME_UNITS))
        .expect("name pattern is valid")
});

/// The two identifiers every record carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIds {
    pub folder_id: String,
    pub object_id: String,
}

/// Reads typed fields around scanner hits
pub struct FieldExtractor<'a> {
    buf: &'a [u8],
    /// Every name run in the buffer as `(start, end)`, found on first use
    name_runs: OnceCell<Vec<(usize, usize)>>,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            name_runs: OnceCell::new(),
        }
    }

    fn name_runs(&self) -> &[(usize, usize)] {
        self.name_runs.get_or_init(|| {
            NAME_RUN
                .find_iter(self.buf)
                .map(|run| (run.start(), run.end()))
                .collect()
        })
    }

    /// Read a 32-byte ASCII identifier `back` bytes before the tag
    fn read_identifier(&self, tag_offset: usize, back: usize) -> Result<String, ReconError> {
        let start = tag_offset
            .checked_sub(back)
            .ok_or_else(|| ReconError::malformed(tag_offset, format!("identifier at -{} underflows buffer", back)))?;
        let raw = self
            .buf
            .get(start..start + ID_LEN)
            .ok_or_else(|| ReconError::malformed(tag_offset, "identifier runs past buffer end"))?;

        if !raw.is_ascii() {
            return Err(ReconError::malformed(
                tag_offset,
                format!("identifier at -{} is not ASCII", back),
            ));
        }

        // ASCII is always valid UTF-8
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    pub fn folder_id(&self, loc: &RawRecordLocation) -> Result<String, ReconError> {
        self.read_identifier(loc.offset, PARENT_ID_BACK)
    }

    pub fn identifiers(&self, loc: &RawRecordLocation) -> Result<RecordIds, ReconError> {
        Ok(RecordIds {
            folder_id: self.folder_id(loc)?,
            object_id: self.read_identifier(loc.offset, OBJECT_ID_BACK)?,
        })
    }

    /// Decode the first UTF-16LE printable run following the object identifier
    ///
    /// The buffer is searched once and each lookup is a binary search over
    /// the runs found, so nameless records never rescan the artifact tail.
    pub fn name(&self, loc: &RawRecordLocation) -> Result<String, ReconError> {
        let start = loc
            .offset
            .checked_sub(OBJECT_ID_BACK)
            .map(|object_start| object_start + ID_LEN)
            .ok_or_else(|| ReconError::malformed(loc.offset, "name search underflows buffer"))?;

        let runs = self.name_runs();
        let first = runs.partition_point(|&(_, end)| end <= start);
        let found = runs[first..].iter().find_map(|&(run_start, end)| {
            // A run already open at `start` is picked up at its next code unit boundary
            let from = if run_start >= start {
                run_start
            } else {
                start + (start - run_start) % 2
            };
            (end.saturating_sub(from) >= 2 * MIN_NAME_UNITS).then_some(from..end)
        });
        let run = found.ok_or(ReconError::MissingName { offset: loc.offset })?;

        let (name, _, _) = UTF_16LE.decode(&self.buf[run]);
        Ok(name.into_owned())
    }

    /// Pass 1: every distinct parent identifier, in first-seen order
    pub fn collect_folder_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for loc in RecordScanner::new(self.buf) {
            match self.folder_id(&loc) {
                Ok(id) => {
                    if seen.insert(id.clone()) {
                        ordered.push(id);
                    }
                }
                Err(e) => tracing::warn!("Pass 1: {}", e),
            }
        }

        ordered
    }

    /// Pass 2: a full entry for one hit, classified against the pass-1 folder set
    ///
    /// A missing name is substituted with an empty one; the identifiers are
    /// what place the entry in the tree.
    pub fn extract(
        &self,
        loc: &RawRecordLocation,
        folders: &HashSet<String>,
    ) -> Result<DirectoryEntry, ReconError> {
        let ids = self.identifiers(loc)?;

        let name = match self.name(loc) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("{}; using empty name", e);
                String::new()
            }
        };

        let kind = if folders.contains(&ids.object_id) {
            EntryKind::Folder
        } else {
            EntryKind::File
        };

        Ok(DirectoryEntry::new(ids.folder_id, ids.object_id, kind, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn loc(offset: usize) -> RawRecordLocation {
        RawRecordLocation {
            offset,
            tag: Uuid::nil(),
        }
    }

    /// object id (32) | 7 filler | parent id (32) | 8 filler | tag offset
    fn record(object: &str, parent: &str, tail: &[u8]) -> (Vec<u8>, usize) {
        let mut buf = Vec::new();
        buf.extend_from_slice(object.as_bytes());
        buf.extend_from_slice(&[0u8; 7]);
        buf.extend_from_slice(parent.as_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        let tag_offset = buf.len();
        buf.extend_from_slice(tail);
        (buf, tag_offset)
    }

    const OBJ: &str = "0123456789abcdef0123456789abcdef";
    const PAR: &str = "fedcba9876543210fedcba9876543210";

    #[test]
    fn test_identifiers_at_fixed_offsets() {
        let (buf, at) = record(OBJ, PAR, b"");
        assert_eq!(at, OBJECT_ID_BACK);

        let ids = FieldExtractor::new(&buf).identifiers(&loc(at)).unwrap();
        assert_eq!(ids.object_id, OBJ);
        assert_eq!(ids.folder_id, PAR);
    }

    #[test]
    fn test_underflow_is_malformed() {
        let buf = vec![b'a'; 60];
        let err = FieldExtractor::new(&buf).identifiers(&loc(50)).unwrap_err();
        assert!(matches!(err, ReconError::MalformedRecord { offset: 50, .. }));
    }

    #[test]
    fn test_non_ascii_identifier_is_malformed() {
        let mut object = OBJ.as_bytes().to_vec();
        object[3] = 0xC3;
        let (mut buf, at) = record(OBJ, PAR, b"");
        buf[..ID_LEN].copy_from_slice(&object);

        let err = FieldExtractor::new(&buf).identifiers(&loc(at)).unwrap_err();
        assert!(matches!(err, ReconError::MalformedRecord { .. }));
    }

    #[test]
    fn test_name_is_first_utf16_run() {
        let mut tail = b"{tag}".to_vec();
        tail.extend_from_slice(&utf16("ab")); // too short to count
        tail.push(0xff);
        tail.extend_from_slice(&utf16("Report 2021.docx"));
        tail.extend_from_slice(&[0xff, 0xff]);
        tail.extend_from_slice(&utf16("later"));
        let (buf, at) = record(OBJ, PAR, &tail);

        let name = FieldExtractor::new(&buf).name(&loc(at)).unwrap();
        assert_eq!(name, "Report 2021.docx");
    }

    #[test]
    fn test_missing_name() {
        let (buf, at) = record(OBJ, PAR, &[0xff; 16]);
        let err = FieldExtractor::new(&buf).name(&loc(at)).unwrap_err();
        assert!(matches!(err, ReconError::MissingName { offset } if offset == at));
    }

    #[test]
    fn test_indexed_name_lookup_matches_direct_search() {
        let mut tail = b"{tag}".to_vec();
        tail.extend_from_slice(&utf16("ab"));
        tail.push(b'x');
        tail.extend_from_slice(&utf16("odd aligned"));
        tail.extend_from_slice(&[0xff, 0x00, 0x00]);
        tail.extend_from_slice(&utf16("abcd"));
        tail.push(0xff);
        tail.extend_from_slice(&utf16("trailing name.txt"));
        let (buf, _) = record(OBJ, PAR, &tail);
        let extractor = FieldExtractor::new(&buf);

        for offset in OBJECT_ID_BACK..buf.len() + 4 {
            let start = offset - OBJECT_ID_BACK + ID_LEN;
            let expected = NAME_RUN
                .find(buf.get(start..).unwrap_or_default())
                .map(|run| UTF_16LE.decode(run.as_bytes()).0.into_owned());
            let got = extractor.name(&loc(offset)).ok();
            assert_eq!(got, expected, "tag offset {}", offset);
        }
    }

    #[test]
    fn test_extract_substitutes_empty_name_and_classifies() {
        let (buf, at) = record(OBJ, PAR, &[0xff; 4]);
        let extractor = FieldExtractor::new(&buf);

        let folders: HashSet<String> = [OBJ.to_string()].into_iter().collect();
        let entry = extractor.extract(&loc(at), &folders).unwrap();
        assert_eq!(entry.name, "");
        assert_eq!(entry.kind, EntryKind::Folder);

        let entry = extractor.extract(&loc(at), &HashSet::new()).unwrap();
        assert_eq!(entry.kind, EntryKind::File);
    }
}
