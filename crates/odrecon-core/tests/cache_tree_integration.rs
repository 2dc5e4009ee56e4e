//! End-to-end reconstruction of synthetic cache artifacts

use odrecon_core::{reconstruct_cache, EntryKind, OrphanPolicy, ReconConfig, ReconError};
use std::io::Write;
use tempfile::NamedTempFile;

fn id(n: u32) -> String {
    format!("{:032x}", n)
}

/// Lay out one directory-entry record the way the client writes it
fn push_record(buf: &mut Vec<u8>, parent: &str, object: &str, name: &str, tag: u32) {
    buf.extend_from_slice(object.as_bytes());
    buf.extend_from_slice(&[0xEE; 7]);
    buf.extend_from_slice(parent.as_bytes());
    buf.extend_from_slice(&[0xEE; 8]);
    buf.extend_from_slice(format!("{{{:08x}-0000-4000-8000-{:012X}}}", tag, tag).as_bytes());
    buf.extend(name.encode_utf16().flat_map(|u| u.to_le_bytes()));
    buf.extend_from_slice(&[0xFF; 6]);
}

fn write_artifact(buf: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(buf).unwrap();
    file.flush().unwrap();
    file
}

fn sample_artifact() -> Vec<u8> {
    let (root, docs, reports) = (id(1), id(2), id(3));
    let mut buf = Vec::new();
    push_record(&mut buf, &root, &docs, "Documents", 1);
    push_record(&mut buf, &reports, &id(10), "deep.txt", 2);
    push_record(&mut buf, &docs, &reports, "Reports", 3);
    push_record(&mut buf, &root, &id(11), "top.txt", 4);
    buf
}

#[test]
fn test_out_of_order_records_build_full_tree() {
    let artifact = write_artifact(&sample_artifact());
    let assembled = reconstruct_cache(artifact.path(), &ReconConfig::default()).unwrap();

    assert!(assembled.orphans.is_empty());
    assert_eq!(assembled.tree.root().object_id, id(1));

    let walked: Vec<(usize, String, EntryKind)> = assembled
        .tree
        .walk()
        .map(|(depth, e)| (depth, e.name.clone(), e.kind))
        .collect();

    assert_eq!(
        walked,
        vec![
            (0, "Root".to_string(), EntryKind::Folder),
            (1, "Documents".to_string(), EntryKind::Folder),
            (2, "Reports".to_string(), EntryKind::Folder),
            (3, "deep.txt".to_string(), EntryKind::File),
            (1, "top.txt".to_string(), EntryKind::File),
        ]
    );
}

#[test]
fn test_malformed_leading_record_is_skipped() {
    // A tag too close to the start for its identifiers to fit
    let mut buf = b"xx{00000000-0000-4000-8000-000000000000}".to_vec();
    buf.extend(sample_artifact());

    let artifact = write_artifact(&buf);
    let assembled = reconstruct_cache(artifact.path(), &ReconConfig::default()).unwrap();
    assert_eq!(assembled.tree.len(), 5);
    assert_eq!(assembled.tree.root().object_id, id(1));
}

#[test]
fn test_empty_artifact_gives_empty_root() {
    let artifact = write_artifact(&[]);
    let assembled = reconstruct_cache(artifact.path(), &ReconConfig::default()).unwrap();
    assert!(assembled.tree.is_empty());
    assert_eq!(assembled.tree.root().name, "Root");
}

#[test]
fn test_orphans_under_strict_policy() {
    let mut buf = sample_artifact();
    push_record(&mut buf, &id(99), &id(12), "stray.bin", 5);
    let artifact = write_artifact(&buf);

    let report = reconstruct_cache(artifact.path(), &ReconConfig::default()).unwrap();
    assert_eq!(report.orphans.len(), 1);
    assert_eq!(report.orphans[0].name, "stray.bin");

    let strict = ReconConfig {
        orphan_policy: OrphanPolicy::Strict,
        ..Default::default()
    };
    let err = reconstruct_cache(artifact.path(), &strict).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReconError>(),
        Some(ReconError::OrphanRecords { count: 1, .. })
    ));
}

#[test]
fn test_oversized_artifact_is_refused() {
    let artifact = write_artifact(&sample_artifact());
    let tight = ReconConfig {
        max_artifact_bytes: 16,
        ..Default::default()
    };
    let err = reconstruct_cache(artifact.path(), &tight).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReconError>(),
        Some(ReconError::ArtifactTooLarge { limit: 16, .. })
    ));
}

#[test]
fn test_details_for_folder() {
    let artifact = write_artifact(&sample_artifact());
    let assembled = reconstruct_cache(artifact.path(), &ReconConfig::default()).unwrap();
    let docs = assembled.tree.find(&id(2)).unwrap();
    assert_eq!(
        docs.details(),
        format!(
            "Name: Documents\nType: Folder\nFolder_UUID: {}\nObject_UUID: {}\n\n# Children: 1",
            id(1),
            id(2)
        )
    );
}

#[test]
fn test_many_nameless_records_extract_in_linear_time() {
    const RECORDS: u32 = 20_000;

    let root = id(1);
    let mut buf = Vec::new();
    for n in 0..RECORDS {
        push_record(&mut buf, &root, &id(n + 2), "", n);
    }
    let artifact = write_artifact(&buf);

    let started = std::time::Instant::now();
    let assembled = reconstruct_cache(artifact.path(), &ReconConfig::default()).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(assembled.tree.len(), RECORDS as usize + 1);
    assert!(assembled.tree.walk().skip(1).all(|(_, e)| e.name.is_empty()));
    // A per-record rescan of the remaining buffer takes minutes at this size
    assert!(elapsed < std::time::Duration::from_secs(30), "took {:?}", elapsed);
}
