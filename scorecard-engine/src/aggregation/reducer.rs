//! Tree reducer
//!
//! Turns a flat list of parent-linked nodes into a forest and computes a
//! bottom-up score for every node: a leaf keeps its starting score, any node
//! with children takes the unweighted mean of its children's scores.
//!
//! Nodes whose parent id does not resolve are treated as roots. Nodes that no
//! root can reach (only possible through a parent cycle) are reported by
//! [`Reducer::reduce`] instead of being silently left unscored.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReduceError {
    /// Nodes not reachable from any root; their parent links form a cycle
    #[error("Structure cycle detected involving nodes {node_ids:?}")]
    Cycle { node_ids: Vec<i64> },
}

/// Input record for one node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeInput {
    pub id: i64,
    pub parent_id: Option<i64>,
    /// Used as the node's score only when it ends up with no children
    pub score: f64,
}

/// A node during one reduction pass
#[derive(Debug, Clone)]
pub struct AggregatedNode {
    id: i64,
    parent_id: Option<i64>,
    score: f64,
    filled: bool,
    children: Vec<usize>,
    is_root: bool,
}

impl AggregatedNode {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }
}

/// Arena-backed forest; node order follows input order
#[derive(Debug, Default)]
pub struct Reducer {
    nodes: Vec<AggregatedNode>,
    index: HashMap<i64, usize>,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index nodes by id and link children to their parents
    ///
    /// Replaces any previously set nodes. A repeated id keeps the last record.
    pub fn set_nodes(&mut self, nodes: impl IntoIterator<Item = NodeInput>) {
        self.nodes.clear();
        self.index.clear();

        for input in nodes {
            let node = AggregatedNode {
                id: input.id,
                parent_id: input.parent_id,
                score: input.score,
                filled: false,
                children: Vec::new(),
                is_root: false,
            };
            match self.index.get(&input.id) {
                Some(&slot) => self.nodes[slot] = node,
                None => {
                    self.index.insert(input.id, self.nodes.len());
                    self.nodes.push(node);
                }
            }
        }

        for slot in 0..self.nodes.len() {
            let parent_slot = self.nodes[slot]
                .parent_id
                .and_then(|parent_id| self.index.get(&parent_id).copied());
            match parent_slot {
                Some(parent) => self.nodes[parent].children.push(slot),
                None => self.nodes[slot].is_root = true,
            }
        }
    }

    /// Fill every node reachable from a root
    ///
    /// Already filled nodes are left untouched, so calling this twice is a
    /// no-op. Fails if some nodes cannot be reached from any root.
    pub fn reduce(&mut self) -> Result<(), ReduceError> {
        for slot in 0..self.nodes.len() {
            if self.nodes[slot].is_root {
                self.fill(slot);
            }
        }

        let unreachable: Vec<i64> = self
            .nodes
            .iter()
            .filter(|node| !node.filled)
            .map(|node| node.id)
            .collect();

        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(ReduceError::Cycle {
                node_ids: unreachable,
            })
        }
    }

    /// Post-order fill of one subtree with an explicit stack
    fn fill(&mut self, root: usize) {
        let mut stack = vec![(root, false)];

        while let Some((slot, children_done)) = stack.pop() {
            if self.nodes[slot].filled {
                continue;
            }

            if self.nodes[slot].children.is_empty() {
                self.nodes[slot].filled = true;
                continue;
            }

            if children_done {
                let node = &self.nodes[slot];
                let total: f64 = node.children.iter().map(|&c| self.nodes[c].score).sum();
                let mean = total / node.children.len() as f64;

                let node = &mut self.nodes[slot];
                node.score = mean;
                node.filled = true;
            } else {
                stack.push((slot, true));
                stack.extend(self.nodes[slot].children.iter().map(|&c| (c, false)));
            }
        }
    }

    /// Top-level nodes: no parent, or a parent id that matches no node
    pub fn roots(&self) -> Vec<&AggregatedNode> {
        self.nodes.iter().filter(|node| node.is_root).collect()
    }

    /// Direct children of `id`; empty for unknown ids
    pub fn children_of(&self, id: i64) -> Vec<&AggregatedNode> {
        match self.index.get(&id) {
            Some(&slot) => self.nodes[slot]
                .children
                .iter()
                .map(|&c| &self.nodes[c])
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn get(&self, id: i64) -> Option<&AggregatedNode> {
        self.index.get(&id).map(|&slot| &self.nodes[slot])
    }

    /// Overwrite a node's current score. Ancestors that are already filled
    /// keep their score; returns false for unknown ids.
    pub fn set_score(&mut self, id: i64, score: f64) -> bool {
        match self.index.get(&id) {
            Some(&slot) => {
                self.nodes[slot].score = score;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
