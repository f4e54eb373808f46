//! Hierarchical name tree.
//!
//! Names are stored as reversed segment paths: `a.b.svc.cluster.local.`
//! becomes `["local", "cluster", "svc", "b", "a"]` and the tree is walked
//! in that order. Records live as leaf entries inside a node, keyed by a
//! stable sub-key, so several records can coexist at one name.
//!
//! Child nodes and entries are insertion-ordered maps: answers come back
//! in the order they were materialized (dual-stack services return their
//! cluster IPs in `clusterIPs[]` order).

use indexmap::IndexMap;
use serde::Serialize;

use crate::record::DnsRecord;

/// One node of the tree. The root represents the cluster domain suffix.
#[derive(Debug, Default, Serialize)]
pub struct TreeCache {
    children: IndexMap<String, TreeCache>,
    entries: IndexMap<String, DnsRecord>,
}

impl TreeCache {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the node has no children and no entries.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.entries.is_empty()
    }

    /// Replace the entire subtree rooted at `path` with `subtree`.
    ///
    /// Intermediate nodes are created as needed. The reconciler builds a
    /// fresh subtree per service and swaps it in under the write lock, so
    /// readers see either the old or the new materialization.
    pub fn set_sub_cache(&mut self, path: &[&str], subtree: TreeCache) {
        debug_assert!(!path.is_empty(), "subtree replacement needs a path");
        let Some((leaf, inner)) = path.split_last() else {
            tracing::error!("ignoring subtree replacement at empty path");
            return;
        };
        let mut node = self;
        for segment in inner {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.children.insert(leaf.to_string(), subtree);
    }

    /// Set a leaf entry at `path`; the same `(path, subkey)` overwrites.
    pub fn set_entry(&mut self, path: &[&str], subkey: &str, record: DnsRecord) {
        let mut node = self;
        for segment in path {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.entries.insert(subkey.to_string(), record);
    }

    /// Exact leaf lookup.
    pub fn get_entry(&self, path: &[&str], subkey: &str) -> Option<&DnsRecord> {
        self.get_node(path).and_then(|node| node.entries.get(subkey))
    }

    /// The leaf entries owned by the node at exactly `path`, in insertion
    /// order. This is the exact lookup for names whose records are keyed
    /// by sub-keys that are not name segments (SRV leaves live in the
    /// `_<port>` node keyed by port name or endpoint label).
    pub fn get_entries(&self, path: &[&str]) -> Vec<DnsRecord> {
        self.get_node(path)
            .map(|node| node.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    fn get_node(&self, path: &[&str]) -> Option<&TreeCache> {
        let mut node = self;
        for segment in path {
            node = node.children.get(*segment)?;
        }
        Some(node)
    }

    /// Collect the records reachable at `path`, where a `*` segment
    /// matches any child.
    ///
    /// The walk is breadth-first over the surviving nodes. The final
    /// segment may also name an entry sub-key directly (headless endpoint
    /// names like `foo.svc1.ns.svc.cluster.local.` resolve this way, since
    /// endpoint records are entries of the service node). Records are the
    /// entries of the surviving nodes only; deeper leaves (e.g. SRV
    /// entries under `_tcp`) are not mixed into a service answer.
    pub fn get_values_for_path_with_wildcards(&self, path: &[&str]) -> Vec<DnsRecord> {
        let mut collected = Vec::new();
        let mut nodes: Vec<&TreeCache> = vec![self];

        for (idx, segment) in path.iter().enumerate() {
            let last = idx == path.len() - 1;
            let mut next: Vec<&TreeCache> = Vec::new();
            for node in &nodes {
                if *segment == "*" {
                    if last {
                        next.push(*node);
                    } else {
                        next.extend(node.children.values());
                    }
                } else if last {
                    if let Some(record) = node.entries.get(*segment) {
                        collected.push(record.clone());
                    } else if let Some(child) = node.children.get(*segment) {
                        next.push(child);
                    }
                } else if let Some(child) = node.children.get(*segment) {
                    next.push(child);
                }
            }
            nodes = next;
        }

        for node in nodes {
            collected.extend(node.entries.values().cloned());
        }
        collected
    }

    /// Remove the subtree (or leaf entry) named by the last segment of
    /// `path`. Empty inner nodes left behind are pruned back toward the
    /// root. Returns whether anything was removed.
    pub fn delete_path(&mut self, path: &[&str]) -> bool {
        let Some((leaf, inner)) = path.split_last() else {
            return false;
        };

        let removed = {
            let Some(parent) = self.get_node_mut(inner) else {
                return false;
            };
            if parent.children.shift_remove(*leaf).is_some() {
                true
            } else {
                parent.entries.shift_remove(*leaf).is_some()
            }
        };

        if removed {
            self.prune(inner);
        }
        removed
    }

    fn get_node_mut(&mut self, path: &[&str]) -> Option<&mut TreeCache> {
        let mut node = self;
        for segment in path {
            node = node.children.get_mut(*segment)?;
        }
        Some(node)
    }

    // Walk back toward the root removing nodes left without children or
    // entries. A missing intermediate node here would mean the delete
    // raced a concurrent mutation, which the outer lock rules out.
    fn prune(&mut self, path: &[&str]) {
        for depth in (1..=path.len()).rev() {
            let (inner, leaf) = (&path[..depth - 1], path[depth - 1]);
            let Some(parent) = self.get_node_mut(inner) else {
                debug_assert!(false, "missing parent node during prune");
                tracing::error!(?path, "missing parent node during prune");
                return;
            };
            match parent.children.get(leaf) {
                Some(node) if node.is_empty() => {
                    parent.children.shift_remove(leaf);
                }
                _ => return,
            }
        }
    }

    /// JSON dump of the subtree, for diagnostics.
    pub fn serialize(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
