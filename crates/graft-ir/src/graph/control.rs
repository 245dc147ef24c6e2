use super::Graph;
use crate::node::{Edge, NodeId};
use crate::op::Op;

impl Graph {
    // -- Merges and phis ----------------------------------------------------

    /// The ends of a merge, in phi input order.
    pub fn merge_ends(&self, merge: NodeId) -> &[NodeId] {
        debug_assert!(self.op(merge).is_merge(), "{merge} is not a merge");
        self.inputs(merge)
    }

    /// Forward ends of a loop begin.
    pub fn forward_ends(&self, loop_begin: NodeId) -> Vec<NodeId> {
        self.inputs(loop_begin)
            .iter()
            .copied()
            .filter(|e| matches!(self.op(*e), Op::End))
            .collect()
    }

    /// Back edges of a loop begin.
    pub fn loop_ends(&self, loop_begin: NodeId) -> Vec<NodeId> {
        self.inputs(loop_begin)
            .iter()
            .copied()
            .filter(|e| matches!(self.op(*e), Op::LoopEnd))
            .collect()
    }

    /// The merge an end flows into.
    pub fn end_merge(&self, end: NodeId) -> Option<NodeId> {
        debug_assert!(self.op(end).is_end(), "{end} is not an end");
        self.usages(end)
            .iter()
            .copied()
            .find(|u| self.op(*u).is_merge())
    }

    fn users_where(&self, id: NodeId, pred: impl Fn(NodeId) -> bool) -> Vec<NodeId> {
        let mut users: Vec<NodeId> = self
            .usages(id)
            .iter()
            .copied()
            .filter(|u| pred(*u))
            .collect();
        users.sort();
        users.dedup();
        users
    }

    /// Phis attached to `merge`, in allocation order.
    pub fn phis(&self, merge: NodeId) -> Vec<NodeId> {
        self.users_where(merge, |u| {
            matches!(self.op(u), Op::Phi) && self.inputs(u).first() == Some(&merge)
        })
    }

    /// The value inputs of a phi, one per merge end.
    pub fn phi_values(&self, phi: NodeId) -> &[NodeId] {
        debug_assert!(matches!(self.op(phi), Op::Phi), "{phi} is not a phi");
        &self.inputs(phi)[1..]
    }

    /// Value proxies hanging off a loop exit.
    pub fn proxies(&self, exit: NodeId) -> Vec<NodeId> {
        self.users_where(exit, |u| {
            matches!(self.op(u), Op::ValueProxy) && self.inputs(u).first() == Some(&exit)
        })
    }

    pub fn loop_exits(&self, loop_begin: NodeId) -> Vec<NodeId> {
        self.users_where(loop_begin, |u| matches!(self.op(u), Op::LoopExit))
    }

    /// Appends `end` to `merge` together with one value per phi.
    pub fn add_end(&mut self, merge: NodeId, end: NodeId, phi_values: &[(NodeId, NodeId)]) {
        self.push_input(merge, end);
        for &(phi, value) in phi_values {
            self.push_input(phi, value);
        }
    }

    /// Detaches `end` from `merge`, dropping the matching phi inputs.
    /// Returns the values those phis received through `end`.
    pub fn remove_end(&mut self, merge: NodeId, end: NodeId) -> Vec<NodeId> {
        let index = self
            .inputs(merge)
            .iter()
            .position(|e| *e == end)
            .unwrap_or_else(|| panic!("{end} is not an end of {merge}"));
        let dropped = self
            .phis(merge)
            .into_iter()
            .map(|phi| self.remove_input(phi, index + 1))
            .collect();
        self.remove_input(merge, index);
        dropped
    }

    // -- Fixed nodes --------------------------------------------------------

    /// Inserts `node` between `anchor` and its current next node.
    pub fn add_after_fixed(&mut self, anchor: NodeId, node: NodeId) {
        let next = self.take_next(anchor);
        self.set_next(anchor, Some(node));
        self.set_next(node, next);
    }

    /// Inserts `node` right before `anchor`.
    pub fn add_before_fixed(&mut self, anchor: NodeId, node: NodeId) {
        self.replace_at_predecessor(anchor, Some(node));
        self.set_next(node, Some(anchor));
    }

    /// Takes a fixed-with-next node out of the control chain, linking its
    /// predecessor to its next node. The node itself stays alive.
    pub fn unlink_fixed(&mut self, node: NodeId) {
        let next = self.take_next(node);
        self.replace_at_predecessor(node, next);
    }

    /// Unlinks and deletes a fixed-with-next node whose value is unused.
    pub fn remove_fixed(&mut self, node: NodeId) {
        self.unlink_fixed(node);
        self.safe_delete(node);
    }

    /// Panics if a user reaches `old` through its memory edge while `new`
    /// writes no memory.
    fn check_memory_usages(&self, old: NodeId, new: NodeId) {
        if self.op(new).kills().is_some() {
            return;
        }
        for &user in self.usages(old) {
            assert!(
                self.node(user).memory() != Some(old),
                "{user} uses {old} as memory but {new} writes none"
            );
        }
    }

    /// Replaces fixed node `old` by fixed node `new` in both the value and the
    /// control graph, then deletes `old`.
    pub fn replace_fixed_with_fixed(&mut self, old: NodeId, new: NodeId) {
        assert!(self.op(old).is_fixed() && self.op(new).is_fixed());
        self.check_memory_usages(old, new);
        if self.has_usages(old) {
            self.replace_at_usages(old, new);
        }
        let next = self.take_next(old);
        self.replace_at_predecessor(old, Some(new));
        self.set_next(new, next);
        self.safe_delete(old);
    }

    /// Replaces fixed node `old` by floating node `new` and deletes `old`.
    ///
    /// Panics when `old` is used as memory or frame state.
    pub fn replace_fixed_with_floating(&mut self, old: NodeId, new: NodeId) {
        assert!(self.op(new).is_floating(), "{new} is not floating");
        let non_value = self.usages(old).iter().any(|&user| {
            self.node(user)
                .edges()
                .any(|(edge, target)| target == old && !matches!(edge, Edge::Input(_)))
        });
        assert!(
            !non_value,
            "{old} has memory or state usages and cannot become floating {new}"
        );
        if self.has_usages(old) {
            self.replace_at_usages(old, new);
        }
        self.unlink_fixed(old);
        self.safe_delete(old);
    }
}
