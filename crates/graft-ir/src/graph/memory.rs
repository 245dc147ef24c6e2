use super::Graph;
use crate::location::LocationIdentity;
use crate::node::NodeId;
use crate::op::Op;

impl Graph {
    /// The closest node at or above `from` in the control chain that may have
    /// written `location`.
    ///
    /// Merges and the start node count as writers of every location, since
    /// the state of memory there depends on more than one path.
    pub fn last_writer_before(&self, from: NodeId, location: LocationIdentity) -> NodeId {
        let mut current = Some(from);
        while let Some(node) = current {
            let op = self.op(node);
            if op.is_merge() || matches!(op, Op::Start) {
                return node;
            }
            if op.kills().is_some_and(|kills| kills.contains(&location)) {
                return node;
            }
            current = self.predecessor(node);
        }
        self.start
    }
}
