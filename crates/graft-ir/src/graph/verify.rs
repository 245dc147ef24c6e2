use rustc_hash::FxHashMap;

use super::Graph;
use crate::node::{Edge, NodeId};
use crate::op::Op;

/// A structural invariant the graph no longer satisfies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// An edge points at a deleted node.
    #[error("{node} has {edge:?} edge to deleted node {target}")]
    DeadInput {
        node: NodeId,
        edge: Edge,
        target: NodeId,
    },
    /// Usage lists and input edges disagree on how often `user` uses `node`.
    #[error("{node} lists {user} as a usage {listed} time(s) but {user} has {actual} edge(s) to it")]
    UsageMismatch {
        node: NodeId,
        user: NodeId,
        listed: usize,
        actual: usize,
    },
    /// Successor and predecessor links disagree.
    #[error("control link between {pred} and {succ} is one-sided")]
    BrokenControl { pred: NodeId, succ: NodeId },
    /// A floating node participates in control flow.
    #[error("floating node {node} has control edges")]
    FloatingControl { node: NodeId },
    /// A merge input is not an end.
    #[error("merge {merge} has non-end input {input}")]
    NotAnEnd { merge: NodeId, input: NodeId },
    #[error("phi {phi} has {actual} values but its merge has {expected} ends")]
    PhiArity {
        phi: NodeId,
        expected: usize,
        actual: usize,
    },
}

impl Graph {
    /// Checks the edge and control invariants of every live node.
    pub fn verify(&self) -> Result<(), VerifyError> {
        for (node, info) in self.nodes.iter() {
            let mut per_target: FxHashMap<NodeId, usize> = FxHashMap::default();
            for (edge, target) in info.edges() {
                if !self.is_alive(target) {
                    return Err(VerifyError::DeadInput { node, edge, target });
                }
                *per_target.entry(target).or_default() += 1;
            }
            for (target, actual) in per_target {
                let listed = self.usages(target).iter().filter(|u| **u == node).count();
                if listed != actual {
                    return Err(VerifyError::UsageMismatch {
                        node: target,
                        user: node,
                        listed,
                        actual,
                    });
                }
            }
            for &user in info.usages.iter() {
                let actual = self
                    .get(user)
                    .map(|u| u.edges().filter(|(_, t)| *t == node).count())
                    .unwrap_or(0);
                if actual == 0 {
                    return Err(VerifyError::UsageMismatch {
                        node,
                        user,
                        listed: info.usages.iter().filter(|u| **u == user).count(),
                        actual,
                    });
                }
            }

            if info.op.is_floating() {
                if info.predecessor.is_some() || info.successors.iter().any(Option::is_some) {
                    return Err(VerifyError::FloatingControl { node });
                }
                continue;
            }
            for succ in info.successors.iter().flatten() {
                if self.get(*succ).and_then(|s| s.predecessor) != Some(node) {
                    return Err(VerifyError::BrokenControl {
                        pred: node,
                        succ: *succ,
                    });
                }
            }
            if let Some(pred) = info.predecessor {
                let listed = self
                    .get(pred)
                    .is_some_and(|p| p.successors.contains(&Some(node)));
                if !listed {
                    return Err(VerifyError::BrokenControl { pred, succ: node });
                }
            }
            if info.op.is_merge() {
                if let Some(input) = info.inputs.iter().find(|e| !self.op(**e).is_end()) {
                    return Err(VerifyError::NotAnEnd {
                        merge: node,
                        input: *input,
                    });
                }
                for phi in self.phis(node) {
                    let actual = self.inputs(phi).len() - 1;
                    if actual != info.inputs.len() {
                        return Err(VerifyError::PhiArity {
                            phi,
                            expected: info.inputs.len(),
                            actual,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether `op` matches any live node.
    pub fn contains_op(&self, pred: impl Fn(&Op) -> bool) -> bool {
        self.count(pred) > 0
    }
}
