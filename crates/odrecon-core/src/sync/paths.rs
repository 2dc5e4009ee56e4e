//! Ancestor path materialisation from parent-id chains

use std::collections::{HashMap, HashSet};

use crate::ReconError;

/// Backslash-joined ancestor paths over `id -> name` and `id -> parent` maps
#[derive(Debug, Default, Clone)]
pub struct PathResolver {
    names: HashMap<String, String>,
    parents: HashMap<String, String>,
    max_depth: usize,
}

impl PathResolver {
    pub fn new(
        names: HashMap<String, String>,
        parents: HashMap<String, String>,
        max_depth: usize,
    ) -> Self {
        Self {
            names,
            parents,
            max_depth,
        }
    }

    /// Path of `id`, ancestors first
    ///
    /// - no id: `""`
    /// - an id with neither a parent nor a name: `"<id>\"`, marking an
    ///   ancestor that could not be resolved
    /// - otherwise the parent's path, a backslash, and the id's name (or the
    ///   id itself when it has no name)
    ///
    /// Cycles and chains longer than the depth bound fail with
    /// `UnresolvedAncestor`.
    pub fn resolve(&self, id: Option<&str>) -> Result<String, ReconError> {
        let Some(start) = id else {
            return Ok(String::new());
        };

        let mut segments: Vec<&str> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = start;

        let prefix = loop {
            if !visited.insert(current) || segments.len() >= self.max_depth {
                return Err(ReconError::UnresolvedAncestor {
                    id: start.to_string(),
                });
            }

            let parent = self.parents.get(current).map(String::as_str);
            let name = self.names.get(current).map(String::as_str);

            if parent.is_none() && name.is_none() {
                break format!("{}\\", current);
            }

            segments.push(name.unwrap_or(current));

            match parent {
                Some(parent) => current = parent,
                None => break String::new(),
            }
        };

        let mut path = prefix;
        for segment in segments.iter().rev() {
            path.push('\\');
            path.push_str(segment);
        }
        Ok(path)
    }
}
