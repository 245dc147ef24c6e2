use smallvec::SmallVec;

use crate::identifier;
use crate::op::Op;
use crate::stamp::Stamp;

identifier! {
    /// Handle to a node of a [`Graph`](crate::Graph).
    struct NodeId
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0.raw())
    }
}

/// Names one input edge of a node.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Edge {
    Input(usize),
    Memory,
    StateBefore,
    StateDuring,
    StateAfter,
    /// The caller frame of a frame state.
    Outer,
}

impl Edge {
    pub fn is_state(self) -> bool {
        matches!(
            self,
            Edge::StateBefore | Edge::StateDuring | Edge::StateAfter | Edge::Outer
        )
    }
}

/// Storage for one node of the graph.
///
/// Edges are only mutated through [`Graph`](crate::Graph) so that every input
/// stays mirrored in the usage list of its target.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub(crate) op: Op,
    pub(crate) inputs: SmallVec<[NodeId; 4]>,
    pub(crate) memory: Option<NodeId>,
    pub(crate) state_before: Option<NodeId>,
    pub(crate) state_during: Option<NodeId>,
    pub(crate) state_after: Option<NodeId>,
    pub(crate) outer: Option<NodeId>,
    pub(crate) successors: SmallVec<[Option<NodeId>; 2]>,
    pub(crate) predecessor: Option<NodeId>,
    /// One entry per incoming edge, so a node used twice by the same user is
    /// listed twice.
    pub(crate) usages: SmallVec<[NodeId; 4]>,
    pub(crate) stamp: Stamp,
}

impl NodeInfo {
    pub(crate) fn new(op: Op, stamp: Stamp) -> Self {
        let successors = std::iter::repeat_n(None, op.successor_count()).collect();
        Self {
            op,
            inputs: SmallVec::new(),
            memory: None,
            state_before: None,
            state_during: None,
            state_after: None,
            outer: None,
            successors,
            predecessor: None,
            usages: SmallVec::new(),
            stamp,
        }
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn memory(&self) -> Option<NodeId> {
        self.memory
    }

    pub fn state_before(&self) -> Option<NodeId> {
        self.state_before
    }

    pub fn state_during(&self) -> Option<NodeId> {
        self.state_during
    }

    pub fn state_after(&self) -> Option<NodeId> {
        self.state_after
    }

    pub fn outer(&self) -> Option<NodeId> {
        self.outer
    }

    pub fn successors(&self) -> &[Option<NodeId>] {
        &self.successors
    }

    /// The first successor of a fixed node.
    pub fn next(&self) -> Option<NodeId> {
        self.successors.first().copied().flatten()
    }

    pub fn predecessor(&self) -> Option<NodeId> {
        self.predecessor
    }

    pub fn usages(&self) -> &[NodeId] {
        &self.usages
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn edge(&self, edge: Edge) -> Option<NodeId> {
        match edge {
            Edge::Input(idx) => self.inputs.get(idx).copied(),
            Edge::Memory => self.memory,
            Edge::StateBefore => self.state_before,
            Edge::StateDuring => self.state_during,
            Edge::StateAfter => self.state_after,
            Edge::Outer => self.outer,
        }
    }

    /// All outgoing input edges, positional inputs first.
    pub fn edges(&self) -> impl Iterator<Item = (Edge, NodeId)> + '_ {
        let positional = self
            .inputs
            .iter()
            .enumerate()
            .map(|(idx, n)| (Edge::Input(idx), *n));
        let named = [
            (Edge::Memory, self.memory),
            (Edge::StateBefore, self.state_before),
            (Edge::StateDuring, self.state_during),
            (Edge::StateAfter, self.state_after),
            (Edge::Outer, self.outer),
        ]
        .into_iter()
        .filter_map(|(edge, n)| n.map(|n| (edge, n)));
        positional.chain(named)
    }

    pub(crate) fn edge_slot(&mut self, edge: Edge) -> &mut Option<NodeId> {
        match edge {
            Edge::Memory => &mut self.memory,
            Edge::StateBefore => &mut self.state_before,
            Edge::StateDuring => &mut self.state_during,
            Edge::StateAfter => &mut self.state_after,
            Edge::Outer => &mut self.outer,
            Edge::Input(_) => unreachable!("positional inputs are not optional slots"),
        }
    }
}
