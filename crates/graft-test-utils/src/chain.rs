use graft_ir::{Graph, NodeId, Op};

/// Appends fixed nodes one after another.
pub struct Chain<'g> {
    pub graph: &'g mut Graph,
    tail: NodeId,
    slot: usize,
}

impl<'g> Chain<'g> {
    /// Starts appending after the start node.
    pub fn new(graph: &'g mut Graph) -> Self {
        let tail = graph.start();
        Self {
            graph,
            tail,
            slot: 0,
        }
    }

    pub fn after(graph: &'g mut Graph, tail: NodeId, slot: usize) -> Self {
        Self { graph, tail, slot }
    }

    pub fn tail(&self) -> NodeId {
        self.tail
    }

    /// Links an already created fixed node and makes it the new tail.
    pub fn link(&mut self, node: NodeId) -> NodeId {
        self.graph.set_successor(self.tail, self.slot, Some(node));
        self.tail = node;
        self.slot = 0;
        node
    }

    pub fn append(&mut self, op: Op, inputs: &[NodeId]) -> NodeId {
        let node = self.graph.add(op, inputs);
        self.link(node)
    }
}
