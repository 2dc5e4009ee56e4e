//! Tree assembly from unordered directory-entry records
//!
//! Nodes live in an arena and are indexed by object identifier, so finding a
//! parent is a hash lookup instead of a tree search. Entries whose parent has
//! not been seen yet wait in a pending queue keyed by that parent and are
//! attached as soon as it arrives.

use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};

use crate::config::OrphanPolicy;
use crate::ReconError;

pub const ROOT_NAME: &str = "Root";

/// Index of a node inside a [`CacheTree`]
pub type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Folder,
    File,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Folder => write!(f, "Folder"),
            EntryKind::File => write!(f, "File"),
        }
    }
}

/// One directory-entry record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Identifier of the parent folder
    pub folder_id: String,
    pub object_id: String,
    pub kind: EntryKind,
    pub name: String,
    children: Vec<NodeId>,
}

impl DirectoryEntry {
    pub fn new(folder_id: String, object_id: String, kind: EntryKind, name: String) -> Self {
        Self {
            folder_id,
            object_id,
            kind,
            name,
            children: Vec::new(),
        }
    }

    /// Detail text shown for a selected node
    pub fn details(&self) -> String {
        let mut line = format!(
            "Name: {}\nType: {}\nFolder_UUID: {}\nObject_UUID: {}",
            self.name, self.kind, self.folder_id, self.object_id
        );
        if self.kind == EntryKind::Folder {
            line.push_str(&format!("\n\n# Children: {}", self.children.len()));
        }
        line
    }
}

/// Rooted tree of directory entries
#[derive(Debug, Clone)]
pub struct CacheTree {
    nodes: Vec<DirectoryEntry>,
    index: HashMap<String, NodeId>,
}

impl CacheTree {
    pub const ROOT: NodeId = 0;

    pub fn root(&self) -> &DirectoryEntry {
        &self.nodes[Self::ROOT]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn find(&self, object_id: &str) -> Option<&DirectoryEntry> {
        self.index.get(object_id).map(|&id| &self.nodes[id])
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &DirectoryEntry> + '_ {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&child| &self.nodes[child])
    }

    /// Pre-order traversal yielding `(depth, entry)`, root at depth 0
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: vec![(Self::ROOT, 0)],
        }
    }

    /// Whether the root identifier is known to a companion source
    pub fn root_confirmed_by<'a, I>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let root = self.root().object_id.as_str();
        ids.into_iter().any(|id| id == root)
    }

    /// Write the tree as nested JSON objects
    /// (`Folder_UUID`, `Object_UUID`, `Type`, `Name`, `Children`)
    ///
    /// Nesting is driven by an explicit stack, so arbitrarily deep parent
    /// chains cannot exhaust the call stack.
    pub fn write_json<W: Write>(&self, writer: W, pretty: bool) -> io::Result<()> {
        let mut out = JsonOut { writer, pretty };
        let mut stack = vec![JsonStep::Open {
            id: Self::ROOT,
            depth: 0,
            first: true,
        }];

        while let Some(step) = stack.pop() {
            match step {
                JsonStep::Open { id, depth, first } => {
                    let node = &self.nodes[id];
                    // An object at depth d opens at indent 2d; its fields sit at 2d + 1
                    let level = 2 * depth;
                    if !first {
                        out.raw(",")?;
                    }
                    if depth > 0 {
                        out.newline(level)?;
                    }
                    out.raw("{")?;
                    out.field(level + 1, "Folder_UUID", &node.folder_id, true)?;
                    out.field(level + 1, "Object_UUID", &node.object_id, false)?;
                    out.field(level + 1, "Type", &node.kind.to_string(), false)?;
                    out.field(level + 1, "Name", &node.name, false)?;
                    out.raw(",")?;
                    out.newline(level + 1)?;
                    out.key("Children")?;

                    if node.children.is_empty() {
                        out.raw("[]")?;
                        out.newline(level)?;
                        out.raw("}")?;
                        continue;
                    }

                    out.raw("[")?;
                    stack.push(JsonStep::Close { depth });
                    stack.extend(node.children.iter().enumerate().rev().map(|(i, &child)| {
                        JsonStep::Open {
                            id: child,
                            depth: depth + 1,
                            first: i == 0,
                        }
                    }));
                }
                JsonStep::Close { depth } => {
                    out.newline(2 * depth + 1)?;
                    out.raw("]")?;
                    out.newline(2 * depth)?;
                    out.raw("}")?;
                }
            }
        }

        out.writer.flush()
    }

    /// [`CacheTree::write_json`] into a `String`
    pub fn to_json(&self, pretty: bool) -> io::Result<String> {
        let mut buf = Vec::new();
        self.write_json(&mut buf, pretty)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

enum JsonStep {
    Open { id: NodeId, depth: usize, first: bool },
    Close { depth: usize },
}

/// Sink for [`CacheTree::write_json`]; indent levels are two spaces each
struct JsonOut<W> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonOut<W> {
    fn raw(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes())
    }

    fn newline(&mut self, level: usize) -> io::Result<()> {
        if !self.pretty {
            return Ok(());
        }
        self.writer.write_all(b"\n")?;
        for _ in 0..level {
            self.writer.write_all(b"  ")?;
        }
        Ok(())
    }

    fn key(&mut self, key: &str) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, key)?;
        self.raw(if self.pretty { ": " } else { ":" })
    }

    fn field(&mut self, level: usize, key: &str, value: &str, first: bool) -> io::Result<()> {
        if !first {
            self.raw(",")?;
        }
        self.newline(level)?;
        self.key(key)?;
        serde_json::to_writer(&mut self.writer, value)?;
        Ok(())
    }
}

pub struct Walk<'a> {
    tree: &'a CacheTree,
    stack: Vec<(NodeId, usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a DirectoryEntry);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, depth) = self.stack.pop()?;
        let tree = self.tree;
        let node = &tree.nodes[id];
        // Reverse so the first child is visited first
        self.stack
            .extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        Some((depth, node))
    }
}

/// Statistics from tree assembly
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssemblyStats {
    pub inserted: usize,
    /// Attached only after their parent arrived
    pub deferred: usize,
    pub duplicates: usize,
    pub orphans: usize,
}

/// Output of a finished assembly
#[derive(Debug, Clone)]
pub struct AssembledTree {
    pub tree: CacheTree,
    /// Entries whose parent never appeared, in discovery order
    pub orphans: Vec<DirectoryEntry>,
    pub stats: AssemblyStats,
}

/// Incremental tree builder
pub struct TreeAssembler {
    tree: CacheTree,
    /// parent object id -> entries waiting for it, in discovery order
    pending: HashMap<String, Vec<(u64, DirectoryEntry)>>,
    sequence: u64,
    stats: AssemblyStats,
}

impl TreeAssembler {
    /// Start a tree whose synthetic root carries `root_id`
    pub fn new(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let root = DirectoryEntry::new(
            String::new(),
            root_id.clone(),
            EntryKind::Folder,
            ROOT_NAME.to_string(),
        );

        let mut index = HashMap::new();
        index.insert(root_id, CacheTree::ROOT);

        Self {
            tree: CacheTree {
                nodes: vec![root],
                index,
            },
            pending: HashMap::new(),
            sequence: 0,
            stats: AssemblyStats::default(),
        }
    }

    pub fn insert(&mut self, entry: DirectoryEntry) {
        if self.tree.index.contains_key(&entry.object_id) {
            tracing::debug!("Duplicate object id {}; keeping first", entry.object_id);
            self.stats.duplicates += 1;
            return;
        }

        match self.tree.index.get(&entry.folder_id).copied() {
            Some(parent) => {
                self.attach(parent, entry);
                self.stats.inserted += 1;
            }
            None => {
                self.sequence += 1;
                self.pending
                    .entry(entry.folder_id.clone())
                    .or_default()
                    .push((self.sequence, entry));
            }
        }
    }

    /// Attach `entry` under `parent`, then drain everything that was waiting for it
    fn attach(&mut self, parent: NodeId, entry: DirectoryEntry) {
        let mut work = vec![(parent, entry)];

        while let Some((parent, entry)) = work.pop() {
            if self.tree.index.contains_key(&entry.object_id) {
                self.stats.duplicates += 1;
                continue;
            }

            let id = self.tree.nodes.len();
            let object_id = entry.object_id.clone();
            self.tree.index.insert(object_id.clone(), id);
            self.tree.nodes.push(entry);
            self.tree.nodes[parent].children.push(id);

            if let Some(waiting) = self.pending.remove(&object_id) {
                self.stats.deferred += waiting.len();
                // Stack order: push in reverse so earlier discoveries attach first
                work.extend(waiting.into_iter().rev().map(|(_, child)| (id, child)));
            }
        }
    }

    /// Close the assembly, applying `policy` to whatever is still pending
    pub fn finish(mut self, policy: OrphanPolicy) -> Result<AssembledTree, ReconError> {
        let mut orphans: Vec<(u64, DirectoryEntry)> =
            self.pending.drain().flat_map(|(_, waiting)| waiting).collect();
        orphans.sort_by_key(|(seq, _)| *seq);
        let orphans: Vec<DirectoryEntry> = orphans.into_iter().map(|(_, entry)| entry).collect();

        self.stats.orphans = orphans.len();

        if let Some(first) = orphans.first() {
            match policy {
                OrphanPolicy::Strict => {
                    return Err(ReconError::OrphanRecords {
                        count: orphans.len(),
                        first: first.object_id.clone(),
                    })
                }
                OrphanPolicy::Report => {
                    for orphan in &orphans {
                        tracing::warn!(
                            "Orphan record {} ({}): parent {} never found",
                            orphan.object_id,
                            orphan.name,
                            orphan.folder_id
                        );
                    }
                }
            }
        }

        Ok(AssembledTree {
            tree: self.tree,
            orphans,
            stats: self.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(parent: &str, object: &str, kind: EntryKind, name: &str) -> DirectoryEntry {
        DirectoryEntry::new(parent.into(), object.into(), kind, name.into())
    }

    fn names(tree: &CacheTree, id: NodeId) -> Vec<String> {
        tree.children(id).map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_entry_under_root_appears_once() {
        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("R", "a", EntryKind::File, "a.txt"));
        let built = assembler.finish(OrphanPolicy::Strict).unwrap();

        assert_eq!(names(&built.tree, CacheTree::ROOT), vec!["a.txt"]);
        assert_eq!(built.tree.root().name, ROOT_NAME);
        assert_eq!(built.tree.root().kind, EntryKind::Folder);
    }

    #[test]
    fn test_child_before_parent_is_attached() {
        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("B", "c", EntryKind::File, "deep.txt"));
        assembler.insert(entry("A", "B", EntryKind::Folder, "inner"));
        assembler.insert(entry("R", "A", EntryKind::Folder, "outer"));
        let built = assembler.finish(OrphanPolicy::Strict).unwrap();

        assert_eq!(built.stats.deferred, 2);
        let walked: Vec<(usize, &str)> = built
            .tree
            .walk()
            .map(|(depth, e)| (depth, e.name.as_str()))
            .collect();
        assert_eq!(
            walked,
            vec![(0, "Root"), (1, "outer"), (2, "inner"), (3, "deep.txt")]
        );
    }

    #[test]
    fn test_children_keep_discovery_order() {
        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("F", "1", EntryKind::File, "first"));
        assembler.insert(entry("F", "2", EntryKind::File, "second"));
        assembler.insert(entry("R", "F", EntryKind::Folder, "folder"));
        assembler.insert(entry("F", "3", EntryKind::File, "third"));
        let built = assembler.finish(OrphanPolicy::Report).unwrap();

        let folder = built.tree.index["F"];
        assert_eq!(names(&built.tree, folder), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_orphans_reported_or_rejected() {
        let build = |policy| {
            let mut assembler = TreeAssembler::new("R");
            assembler.insert(entry("R", "a", EntryKind::File, "ok"));
            assembler.insert(entry("missing", "b", EntryKind::File, "lost"));
            assembler.finish(policy)
        };

        let built = build(OrphanPolicy::Report).unwrap();
        assert_eq!(built.orphans.len(), 1);
        assert_eq!(built.orphans[0].name, "lost");
        assert_eq!(built.tree.len(), 2);

        let err = build(OrphanPolicy::Strict).unwrap_err();
        assert!(matches!(err, ReconError::OrphanRecords { count: 1, ref first } if first == "b"));
    }

    #[test]
    fn test_cycle_without_anchor_stays_orphaned() {
        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("y", "x", EntryKind::Folder, "x"));
        assembler.insert(entry("x", "y", EntryKind::Folder, "y"));
        let built = assembler.finish(OrphanPolicy::Report).unwrap();
        assert!(built.tree.is_empty());
        assert_eq!(built.orphans.len(), 2);
    }

    #[test]
    fn test_duplicate_object_ids_are_skipped() {
        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("R", "a", EntryKind::File, "one"));
        assembler.insert(entry("R", "a", EntryKind::File, "two"));
        let built = assembler.finish(OrphanPolicy::Strict).unwrap();
        assert_eq!(built.stats.duplicates, 1);
        assert_eq!(names(&built.tree, CacheTree::ROOT), vec!["one"]);
    }

    #[test]
    fn test_details_text() {
        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("R", "F", EntryKind::Folder, "Docs"));
        assembler.insert(entry("F", "f", EntryKind::File, "a.txt"));
        let built = assembler.finish(OrphanPolicy::Strict).unwrap();

        assert_eq!(
            built.tree.find("F").unwrap().details(),
            "Name: Docs\nType: Folder\nFolder_UUID: R\nObject_UUID: F\n\n# Children: 1"
        );
        assert_eq!(
            built.tree.find("f").unwrap().details(),
            "Name: a.txt\nType: File\nFolder_UUID: F\nObject_UUID: f"
        );
    }

    #[test]
    fn test_json_nesting() {
        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("R", "F", EntryKind::Folder, "Docs"));
        assembler.insert(entry("F", "f", EntryKind::File, "a.txt"));
        let built = assembler.finish(OrphanPolicy::Strict).unwrap();

        for pretty in [false, true] {
            let text = built.tree.to_json(pretty).unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["Name"], "Root");
            assert_eq!(value["Object_UUID"], "R");
            assert_eq!(value["Children"][0]["Name"], "Docs");
            assert_eq!(value["Children"][0]["Children"][0]["Type"], "File");
            assert_eq!(value["Children"][0]["Children"][0]["Children"], serde_json::json!([]));
        }
    }

    #[test]
    fn test_json_pretty_layout_and_escaping() {
        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("R", "a", EntryKind::File, "say \"hi\""));
        assembler.insert(entry("R", "b", EntryKind::File, "b"));
        let built = assembler.finish(OrphanPolicy::Strict).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&built.tree.to_json(false).unwrap()).unwrap();
        assert_eq!(value["Children"][0]["Name"], "say \"hi\"");
        assert_eq!(value["Children"][1]["Name"], "b");

        let mut assembler = TreeAssembler::new("R");
        assembler.insert(entry("R", "a", EntryKind::File, "say \"hi\""));
        let built = assembler.finish(OrphanPolicy::Strict).unwrap();
        let expected = r#"{
  "Folder_UUID": "",
  "Object_UUID": "R",
  "Type": "Folder",
  "Name": "Root",
  "Children": [
    {
      "Folder_UUID": "R",
      "Object_UUID": "a",
      "Type": "File",
      "Name": "say \"hi\"",
      "Children": []
    }
  ]
}"#;
        assert_eq!(built.tree.to_json(true).unwrap(), expected);
    }

    #[test]
    fn test_json_of_deep_chain_does_not_recurse() {
        const DEPTH: usize = 100_000;

        let mut assembler = TreeAssembler::new("n0");
        // Deepest first, so every link goes through the pending queue
        for i in (1..=DEPTH).rev() {
            assembler.insert(entry(
                &format!("n{}", i - 1),
                &format!("n{}", i),
                EntryKind::Folder,
                "d",
            ));
        }
        let built = assembler.finish(OrphanPolicy::Strict).unwrap();
        assert_eq!(built.tree.len(), DEPTH + 1);
        assert_eq!(built.tree.walk().last().map(|(depth, _)| depth), Some(DEPTH));

        let text = built.tree.to_json(false).unwrap();
        assert!(text.starts_with(r#"{"Folder_UUID":"","Object_UUID":"n0","Type":"Folder","Name":"Root","Children":[{"#));
        assert!(text.ends_with(&"]}".repeat(DEPTH + 1)));
        assert_eq!(text.matches("\"Object_UUID\"").count(), DEPTH + 1);
    }

    #[test]
    fn test_root_confirmation() {
        let built = TreeAssembler::new("R").finish(OrphanPolicy::Strict).unwrap();
        assert!(built.tree.root_confirmed_by(["x", "R"]));
        assert!(!built.tree.root_confirmed_by(["x", "y"]));
        assert!(!built.tree.root_confirmed_by(std::iter::empty::<&str>()));
    }
}
