use super::Graph;
use crate::arena::IdMap;
use crate::node::{Edge, NodeId, NodeInfo};

impl Graph {
    /// Copies `nodes` of `source` into this graph and returns the mapping
    /// from source nodes to their copies.
    ///
    /// Inputs are resolved against the copies first, then `replacements`.
    /// Any other input is a caller error. Successor slots pointing outside
    /// the copied set stay empty.
    pub fn add_duplicates_from(
        &mut self,
        source: &Graph,
        nodes: &[NodeId],
        replacements: &IdMap<NodeId, NodeId>,
    ) -> IdMap<NodeId, NodeId> {
        let snapshot = nodes
            .iter()
            .map(|n| (*n, source.node(*n).clone()))
            .collect();
        self.insert_duplicates(snapshot, replacements, false)
    }

    /// Copies `nodes` within this graph. Inputs outside the copied set that
    /// have no replacement keep pointing at the original node.
    pub fn duplicate_nodes(
        &mut self,
        nodes: &[NodeId],
        replacements: &IdMap<NodeId, NodeId>,
    ) -> IdMap<NodeId, NodeId> {
        let snapshot = nodes.iter().map(|n| (*n, self.node(*n).clone())).collect();
        self.insert_duplicates(snapshot, replacements, true)
    }

    fn insert_duplicates(
        &mut self,
        snapshot: Vec<(NodeId, NodeInfo)>,
        replacements: &IdMap<NodeId, NodeId>,
        same_graph: bool,
    ) -> IdMap<NodeId, NodeId> {
        let mut copies = IdMap::default();
        for (old, info) in &snapshot {
            let new = self.nodes.alloc(NodeInfo::new(info.op.clone(), info.stamp));
            copies.insert(*old, new);
        }

        for (old, info) in &snapshot {
            let new = copies[*old];
            for (edge, target) in info.edges() {
                let mapped = copies
                    .get_copied(target)
                    .or_else(|| replacements.get_copied(target))
                    .or(same_graph.then_some(target))
                    .unwrap_or_else(|| {
                        panic!("input {target} of {old} is neither duplicated nor replaced")
                    });
                match edge {
                    Edge::Input(_) => self.push_input(new, mapped),
                    named => self.set_edge(new, named, Some(mapped)),
                }
            }
            for (index, succ) in info.successors.iter().enumerate() {
                if let Some(copy) = succ.and_then(|s| copies.get_copied(s)) {
                    self.set_successor(new, index, Some(copy));
                }
            }
        }
        copies
    }
}
