// SPDX-License-Identifier: GPL-2.0-or-later

//! The scheduler's age index (`mNodeAge` in `spec.md` §4.3): a map from
//! presentation index to the set of eligible, not-currently-running nodes
//! whose oldest queued frame carries that index. Workers always take the
//! smallest key, which is what makes the scheduler age-fair rather than
//! round-robin.

use common::PresentationIndex;
use graph::{GraphError, NodeId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
pub struct SchedulerState {
    age_index: BTreeMap<PresentationIndex, BTreeSet<NodeId>>,
    pub errors: Vec<GraphError>,
}

impl SchedulerState {
    pub fn insert(&mut self, key: PresentationIndex, node: NodeId) {
        self.age_index.entry(key).or_default().insert(node);
    }

    pub fn remove(&mut self, key: PresentationIndex, node: NodeId) {
        if let Some(set) = self.age_index.get_mut(&key) {
            set.remove(&node);
            if set.is_empty() {
                self.age_index.remove(&key);
            }
        }
    }

    /// Pops the node with the smallest age key, if any are eligible.
    pub fn pop_next(&mut self) -> Option<NodeId> {
        let key = *self.age_index.keys().next()?;
        let set = self.age_index.get_mut(&key)?;
        let node = *set.iter().next()?;
        set.remove(&node);
        if set.is_empty() {
            self.age_index.remove(&key);
        }
        Some(node)
    }

    #[must_use]
    #[cfg(test)]
    pub fn contains(&self, key: PresentationIndex, node: NodeId) -> bool {
        self.age_index
            .get(&key)
            .is_some_and(|set| set.contains(&node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph::Graph;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut g = Graph::new();
        (0..n)
            .map(|_| {
                struct Dummy;
                impl graph::NodeBase for Dummy {
                    fn name(&self) -> &str {
                        "dummy"
                    }
                }
                impl graph::Sink for Dummy {
                    fn consume(&mut self, _s: common::Streams) -> Result<(), graph::NodeError> {
                        Ok(())
                    }
                }
                g.add_sink(Box::new(Dummy))
            })
            .collect()
    }

    #[test]
    fn test_pop_next_returns_smallest_key() {
        let mut sched = SchedulerState::default();
        let nodes = ids(2);
        sched.insert(PresentationIndex::new(5), nodes[0]);
        sched.insert(PresentationIndex::new(1), nodes[1]);
        assert_eq!(sched.pop_next(), Some(nodes[1]));
        assert_eq!(sched.pop_next(), Some(nodes[0]));
        assert_eq!(sched.pop_next(), None);
    }

    #[test]
    fn test_remove_empties_key() {
        let mut sched = SchedulerState::default();
        let nodes = ids(1);
        sched.insert(PresentationIndex::new(3), nodes[0]);
        assert!(sched.contains(PresentationIndex::new(3), nodes[0]));
        sched.remove(PresentationIndex::new(3), nodes[0]);
        assert!(!sched.contains(PresentationIndex::new(3), nodes[0]));
        assert_eq!(sched.pop_next(), None);
    }
}
