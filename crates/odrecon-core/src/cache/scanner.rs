//! Record boundary scanning
//!
//! Directory-entry records in the cache artifact are tagged with a braced,
//! hyphenated GUID (`{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}`, 38 bytes). The
//! scanner reports the offset of every tag, in ascending order.

use regex::bytes::{Matches, Regex};
use std::sync::LazyLock;
use uuid::Uuid;

/// Length of a braced GUID tag in bytes
pub const TAG_LEN: usize = 38;

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i-u)\{[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}\}",
    )
    .expect("tag pattern is valid")
});

/// Location of one matched tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecordLocation {
    /// Byte offset of the opening brace
    pub offset: usize,
    /// The tag itself
    pub tag: Uuid,
}

/// Lazy, forward-only iterator over tag locations in a buffer
pub struct RecordScanner<'a> {
    matches: Matches<'static, 'a>,
}

impl<'a> RecordScanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            matches: TAG_PATTERN.find_iter(buf),
        }
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = RawRecordLocation;

    fn next(&mut self) -> Option<Self::Item> {
        for m in self.matches.by_ref() {
            // The pattern only admits ASCII hex, so both conversions hold
            let tag = std::str::from_utf8(m.as_bytes())
                .ok()
                .and_then(|text| Uuid::parse_str(text).ok());

            match tag {
                Some(tag) => {
                    return Some(RawRecordLocation {
                        offset: m.start(),
                        tag,
                    })
                }
                None => tracing::debug!("Skipping unparseable tag at {:#x}", m.start()),
            }
        }
        None
    }
}
