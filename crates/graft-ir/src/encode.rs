//! Compact, immutable snapshot of a graph.
//!
//! Nodes are renumbered densely: fixed nodes first, in an order where every
//! forward control edge points to a later node (merges come after all of
//! their forward ends), then the floating nodes. Decoders walk the fixed
//! nodes in this order and materialize floating nodes on demand.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::graph::Graph;
use crate::meta::MethodId;
use crate::node::{Edge, NodeId};
use crate::op::Op;
use crate::stamp::Stamp;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderId(pub u32);

impl OrderId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodedNode {
    pub op: Op,
    pub inputs: SmallVec<[OrderId; 4]>,
    pub memory: Option<OrderId>,
    pub state_before: Option<OrderId>,
    pub state_during: Option<OrderId>,
    pub state_after: Option<OrderId>,
    pub outer: Option<OrderId>,
    pub successors: SmallVec<[Option<OrderId>; 2]>,
    pub stamp: Stamp,
}

impl EncodedNode {
    pub fn next(&self) -> Option<OrderId> {
        self.successors.first().copied().flatten()
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodedGraph {
    name: String,
    method: Option<MethodId>,
    nodes: Vec<EncodedNode>,
    fixed: usize,
    phis: FxHashMap<OrderId, SmallVec<[OrderId; 2]>>,
    proxies: FxHashMap<OrderId, SmallVec<[OrderId; 2]>>,
    end_merges: FxHashMap<OrderId, (OrderId, usize)>,
    parameters: Vec<(u32, OrderId)>,
}

/// Fixed nodes reachable from start, in reverse post-order over forward
/// control edges.
fn fixed_order(graph: &Graph) -> Vec<NodeId> {
    let children = |node: NodeId| -> SmallVec<[NodeId; 2]> {
        if matches!(graph.op(node), Op::End) {
            graph.end_merge(node).into_iter().collect()
        } else if matches!(graph.op(node), Op::LoopEnd) {
            SmallVec::new()
        } else {
            graph.successors(node).iter().flatten().copied().collect()
        }
    };

    let mut post = Vec::new();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    let mut stack: Vec<(NodeId, SmallVec<[NodeId; 2]>, usize)> = Vec::new();
    visited.insert(graph.start());
    stack.push((graph.start(), children(graph.start()), 0));
    while let Some((node, kids, cursor)) = stack.last_mut() {
        if let Some(&kid) = kids.get(*cursor) {
            *cursor += 1;
            if visited.insert(kid) {
                let grandkids = children(kid);
                stack.push((kid, grandkids, 0));
            }
        } else {
            post.push(*node);
            stack.pop();
        }
    }
    post.reverse();
    post
}

impl EncodedGraph {
    pub fn encode(graph: &Graph) -> Self {
        let fixed = fixed_order(graph);
        let fixed_set: FxHashSet<NodeId> = fixed.iter().copied().collect();
        let mut order: Vec<NodeId> = fixed.clone();
        order.extend(graph.node_ids().filter(|n| graph.op(*n).is_floating()));
        let ids: FxHashMap<NodeId, OrderId> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, OrderId(i as u32)))
            .collect();
        let map = |node: NodeId, target: NodeId| -> OrderId {
            *ids.get(&target).unwrap_or_else(|| {
                panic!("{node} refers to {target}, which is not reachable from start")
            })
        };

        let mut nodes = Vec::with_capacity(order.len());
        for &node in &order {
            let info = graph.node(node);
            let mut encoded = EncodedNode {
                op: info.op().clone(),
                inputs: info.inputs().iter().map(|t| map(node, *t)).collect(),
                memory: None,
                state_before: None,
                state_during: None,
                state_after: None,
                outer: None,
                successors: info
                    .successors()
                    .iter()
                    .map(|s| s.filter(|s| fixed_set.contains(s)).map(|s| map(node, s)))
                    .collect(),
                stamp: *info.stamp(),
            };
            for (edge, target) in info.edges() {
                let slot = match edge {
                    Edge::Input(_) => continue,
                    Edge::Memory => &mut encoded.memory,
                    Edge::StateBefore => &mut encoded.state_before,
                    Edge::StateDuring => &mut encoded.state_during,
                    Edge::StateAfter => &mut encoded.state_after,
                    Edge::Outer => &mut encoded.outer,
                };
                *slot = Some(map(node, target));
            }
            nodes.push(encoded);
        }

        let mut phis: FxHashMap<OrderId, SmallVec<[OrderId; 2]>> = FxHashMap::default();
        let mut proxies: FxHashMap<OrderId, SmallVec<[OrderId; 2]>> = FxHashMap::default();
        let mut end_merges = FxHashMap::default();
        let mut parameters = Vec::new();
        for (index, encoded) in nodes.iter().enumerate() {
            let id = OrderId(index as u32);
            match encoded.op {
                Op::Phi => phis.entry(encoded.inputs[0]).or_default().push(id),
                Op::ValueProxy => proxies.entry(encoded.inputs[0]).or_default().push(id),
                Op::Merge | Op::LoopBegin { .. } => {
                    for (position, end) in encoded.inputs.iter().enumerate() {
                        end_merges.insert(*end, (id, position));
                    }
                }
                Op::Parameter(param) => parameters.push((param, id)),
                _ => {}
            }
        }
        parameters.sort();

        Self {
            name: graph.name().to_string(),
            method: graph.method(),
            nodes,
            fixed: fixed.len(),
            phis,
            proxies,
            end_merges,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Option<MethodId> {
        self.method
    }

    pub fn start(&self) -> OrderId {
        OrderId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of fixed nodes; they occupy ids `0..fixed_len()`.
    pub fn fixed_len(&self) -> usize {
        self.fixed
    }

    pub fn node(&self, id: OrderId) -> &EncodedNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (OrderId, &EncodedNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (OrderId(i as u32), n))
    }

    /// Phis of `merge`, in the order they were allocated.
    pub fn phis(&self, merge: OrderId) -> &[OrderId] {
        self.phis.get(&merge).map(|p| &p[..]).unwrap_or_default()
    }

    pub fn proxies(&self, exit: OrderId) -> &[OrderId] {
        self.proxies.get(&exit).map(|p| &p[..]).unwrap_or_default()
    }

    /// The merge `end` flows into and the position of `end` among its inputs.
    pub fn end_merge(&self, end: OrderId) -> (OrderId, usize) {
        *self
            .end_merges
            .get(&end)
            .unwrap_or_else(|| panic!("{end} does not end in a merge"))
    }

    pub fn parameters(&self) -> &[(u32, OrderId)] {
        &self.parameters
    }

    /// Rebuilds a plain graph with the same structure.
    pub fn decode(&self) -> Graph {
        let mut graph = match self.method {
            Some(method) => Graph::for_method(method, self.name.clone()),
            None => Graph::new(self.name.clone()),
        };
        let mut ids: Vec<NodeId> = Vec::with_capacity(self.nodes.len());
        for (index, encoded) in self.nodes.iter().enumerate() {
            let id = if index == 0 {
                graph.start()
            } else {
                graph.add_node().op(encoded.op.clone()).stamp(encoded.stamp).new()
            };
            ids.push(id);
        }
        for (index, encoded) in self.nodes.iter().enumerate() {
            let id = ids[index];
            for input in &encoded.inputs {
                graph.push_input(id, ids[input.index()]);
            }
            let named = [
                (Edge::Memory, encoded.memory),
                (Edge::StateBefore, encoded.state_before),
                (Edge::StateDuring, encoded.state_during),
                (Edge::StateAfter, encoded.state_after),
                (Edge::Outer, encoded.outer),
            ];
            for (edge, target) in named {
                if let Some(target) = target {
                    graph.set_edge(id, edge, Some(ids[target.index()]));
                }
            }
            for (slot, succ) in encoded.successors.iter().enumerate() {
                if let Some(succ) = succ {
                    graph.set_successor(id, slot, Some(ids[succ.index()]));
                }
            }
        }
        graph
    }
}
