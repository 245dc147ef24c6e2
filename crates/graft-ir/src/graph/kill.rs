use rustc_hash::FxHashSet;

use super::Graph;
use crate::node::NodeId;
use crate::op::Op;

impl Graph {
    /// Whether `merge` has no way left to be entered.
    fn merge_is_dead(&self, merge: NodeId) -> bool {
        match self.op(merge) {
            Op::Merge => self.inputs(merge).is_empty(),
            Op::LoopBegin { .. } => self.forward_ends(merge).is_empty(),
            _ => false,
        }
    }

    /// Deletes the control flow reachable from `node` together with every
    /// floating node that only served it.
    ///
    /// Merges reached through an end lose that end (and the matching phi
    /// inputs); a merge left without entries dies too, and so does a loop
    /// left without forward ends. Floating inputs that end up unused are
    /// removed afterwards, except parameters.
    ///
    /// Returns the merges that lost an end but stay alive.
    pub fn kill_cfg(&mut self, node: NodeId) -> Vec<NodeId> {
        self.replace_at_predecessor(node, None);

        let mut dead_fixed: Vec<NodeId> = Vec::new();
        let mut trimmed: Vec<NodeId> = Vec::new();
        let mut released: Vec<NodeId> = Vec::new();
        let mut dead: FxHashSet<NodeId> = FxHashSet::default();
        let mut worklist = vec![node];
        while let Some(current) = worklist.pop() {
            if !dead.insert(current) {
                continue;
            }
            dead_fixed.push(current);
            if self.op(current).is_end() {
                if let Some(merge) = self.end_merge(current) {
                    if !dead.contains(&merge) {
                        released.extend(self.remove_end(merge, current));
                        if self.merge_is_dead(merge) {
                            worklist.push(merge);
                        } else {
                            trimmed.push(merge);
                        }
                    }
                }
                continue;
            }
            worklist.extend(self.successors(current).iter().rev().flatten().copied());
        }

        let mut dead_floating = Vec::new();
        let mut pending = dead_fixed.clone();
        while let Some(current) = pending.pop() {
            for &user in self.usages(current) {
                if self.op(user).is_floating() && dead.insert(user) {
                    dead_floating.push(user);
                    pending.push(user);
                }
            }
        }

        tracing::trace!(
            root = %node,
            fixed = dead_fixed.len(),
            floating = dead_floating.len(),
            "killing control flow"
        );

        let mut survivors: Vec<NodeId> = released
            .into_iter()
            .filter(|n| !dead.contains(n))
            .collect();
        for &n in dead_fixed.iter().chain(&dead_floating) {
            for input in self.clear_inputs(n) {
                if !dead.contains(&input) {
                    survivors.push(input);
                }
            }
            self.clear_successors(n);
        }
        for &n in dead_fixed.iter().chain(&dead_floating) {
            self.safe_delete(n);
        }
        self.kill_unused_floating(survivors);
        trimmed.retain(|m| self.is_alive(*m));
        trimmed.dedup();
        trimmed
    }

    /// Deletes the given floating nodes if nothing uses them, then their
    /// inputs, transitively. Parameters and fixed nodes are never removed.
    pub fn kill_unused_floating(&mut self, roots: impl IntoIterator<Item = NodeId>) {
        let mut worklist: Vec<NodeId> = roots.into_iter().collect();
        while let Some(node) = worklist.pop() {
            if !self.is_alive(node) || self.has_usages(node) {
                continue;
            }
            let op = self.op(node);
            if !op.is_floating() || matches!(op, Op::Parameter(_)) {
                continue;
            }
            worklist.extend(self.clear_inputs(node));
            self.safe_delete(node);
        }
    }
}
