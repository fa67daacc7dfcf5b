//! The test data hierarchy: a tree of groups with shared case leaves.
//!
//! Built once from the full test case paths found in a problem's data
//! directory (e.g. `secret/group1/foo`), then read-only. Groups are
//! identified by slash-delimited paths from the root `.`; cases by a short
//! name unique across the whole hierarchy. The same case may be listed
//! under several groups, so case membership is many-to-many and the overall
//! structure is a DAG with the group tree as its spine.
//!
//! Children of a group are kept lexicographically sorted (sub-group paths
//! and case short names mixed in one sequence). The order is load-bearing:
//! it decides which child is "first" for `on_reject: break` and
//! `first_error` semantics.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::error::ConfigError;

/// Path of the hierarchy root.
pub const ROOT: &str = ".";

/// Identity of one node: an internal group (by path) or a case (by name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
    Group(String),
    Case(String),
}

impl NodeId {
    pub fn as_str(&self) -> &str {
        match self {
            NodeId::Group(path) => path,
            NodeId::Case(name) => name,
        }
    }

    pub fn is_case(&self) -> bool {
        matches!(self, NodeId::Case(_))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TestHierarchy {
    /// Group path -> sorted direct children.
    children: BTreeMap<String, Vec<NodeId>>,
    /// Case short name -> all immediate parent group paths.
    case_parents: BTreeMap<String, BTreeSet<String>>,
}

impl TestHierarchy {
    /// Build the hierarchy from an iterable of full case paths.
    pub fn from_paths<I, S>(paths: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut children: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
        let mut case_parents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        children.insert(ROOT.to_string(), Vec::new());

        for path in paths {
            let path = path.as_ref();
            if path.is_empty() {
                return Err(ConfigError::EmptyCasePath);
            }
            let components: Vec<&str> = path.split('/').collect();
            if components.iter().any(|c| c.is_empty() || *c == ROOT) {
                return Err(ConfigError::InvalidCasePath {
                    path: path.to_string(),
                });
            }

            // register every group prefix and link it to its parent
            let mut parent = ROOT.to_string();
            let mut prefix = String::with_capacity(path.len());
            for component in &components[..components.len() - 1] {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(component);
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(NodeId::Group(prefix.clone()));
                children.entry(prefix.clone()).or_default();
                parent = prefix.clone();
            }

            let name = components[components.len() - 1];
            children
                .entry(parent.clone())
                .or_default()
                .push(NodeId::Case(name.to_string()));
            case_parents
                .entry(name.to_string())
                .or_default()
                .insert(parent);
        }

        // a string naming both a case and a group makes identity ambiguous
        for name in case_parents.keys() {
            if children.contains_key(name) {
                return Err(ConfigError::CaseGroupCollision { name: name.clone() });
            }
        }

        for list in children.values_mut() {
            list.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            list.dedup();
        }

        Ok(TestHierarchy {
            children,
            case_parents,
        })
    }

    /// Sorted direct children of a group; empty for unknown paths.
    pub fn children(&self, group: &str) -> &[NodeId] {
        self.children.get(group).map_or(&[], Vec::as_slice)
    }

    pub fn is_group(&self, path: &str) -> bool {
        self.children.contains_key(path)
    }

    pub fn is_case(&self, name: &str) -> bool {
        self.case_parents.contains_key(name)
    }

    /// All immediate parent groups of a case.
    pub fn case_parents(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.case_parents.get(name)
    }

    pub fn cases(&self) -> impl Iterator<Item = &str> {
        self.case_parents.keys().map(String::as_str)
    }

    pub fn group_paths(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Parent path of a group path; top-level groups belong to the root.
    pub fn parent_of(path: &str) -> &str {
        match path.rfind('/') {
            Some(i) => &path[..i],
            None => ROOT,
        }
    }

    /// Resolve a node reference: a group path, a case short name, or a full
    /// case path whose last component names a case listed under that prefix.
    pub fn node_at(&self, node: &str) -> Option<NodeId> {
        let node = if node.is_empty() { ROOT } else { node };
        if self.children.contains_key(node) {
            return Some(NodeId::Group(node.to_string()));
        }
        if self.case_parents.contains_key(node) {
            return Some(NodeId::Case(node.to_string()));
        }
        let (parent, name) = match node.rfind('/') {
            Some(i) => (&node[..i], &node[i + 1..]),
            None => return None,
        };
        match self.case_parents.get(name) {
            Some(parents) if parents.contains(parent) => Some(NodeId::Case(name.to_string())),
            _ => None,
        }
    }

    /// All nodes in BFS order, root first, children in sorted order.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([NodeId::Group(ROOT.to_string())]);
        while let Some(node) = queue.pop_front() {
            if let NodeId::Group(path) = &node {
                queue.extend(self.children(path).iter().cloned());
            }
            out.push(node);
        }
        out
    }
}
