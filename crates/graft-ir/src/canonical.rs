//! Local simplifications applied until nothing changes.
//!
//! Folds constant arithmetic and comparisons, removes trivial phis, prunes
//! branches with constant conditions, drops redundant begin nodes, collapses
//! merges with a single end, demotes loops without back edges to plain
//! merges and deletes unused floating nodes.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::constant::Constant;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::op::Op;

/// Result of simplifying a value node.
#[derive(Clone, Debug, PartialEq)]
pub enum Simplified {
    Constant(Constant),
    /// An existing node computes the same value.
    Node(NodeId),
}

/// Evaluates a floating op over constant inputs.
pub fn fold(op: &Op, inputs: &[Option<&Constant>]) -> Option<Constant> {
    match op {
        Op::Binary(binary) => {
            let lhs = inputs.first().copied().flatten()?.as_int()?;
            let rhs = inputs.get(1).copied().flatten()?.as_int()?;
            Some(Constant::Int(binary.eval(lhs, rhs)))
        }
        Op::Compare(cond) => {
            let lhs = inputs.first().copied().flatten()?;
            let rhs = inputs.get(1).copied().flatten()?;
            cond.eval(lhs, rhs).map(Constant::Bool)
        }
        Op::IsNull => {
            let value = inputs.first().copied().flatten()?;
            Some(Constant::Bool(value.is_null()))
        }
        _ => None,
    }
}

/// Simplifies a floating value node described by `op` and `inputs` without
/// requiring the node to exist yet.
pub fn simplify_floating(graph: &Graph, op: &Op, inputs: &[NodeId]) -> Option<Simplified> {
    let constants: SmallVec<[Option<&Constant>; 4]> =
        inputs.iter().map(|n| graph.as_constant(*n)).collect();
    if let Some(value) = fold(op, &constants) {
        return Some(Simplified::Constant(value));
    }
    match op {
        Op::Binary(binary) => {
            let rhs = constants.get(1).copied().flatten()?.as_int()?;
            (binary.right_identity() == Some(rhs)).then(|| Simplified::Node(inputs[0]))
        }
        Op::IsNull => {
            let stamp = graph.stamp(inputs[0]);
            if stamp.is_non_null() {
                Some(Simplified::Constant(Constant::Bool(false)))
            } else if stamp.is_always_null() {
                Some(Simplified::Constant(Constant::Bool(true)))
            } else {
                None
            }
        }
        Op::ArrayLength => match graph.op(inputs[0]) {
            Op::VarargsArray { length } => {
                Some(Simplified::Constant(Constant::Int(*length as i64)))
            }
            _ => None,
        },
        Op::LoadIndexed => {
            let Op::VarargsArray { length } = graph.op(inputs[0]) else {
                return None;
            };
            let index = constants.get(1).copied().flatten()?.as_int()?;
            if index < 0 || index >= *length as i64 {
                return None;
            }
            Some(Simplified::Node(graph.inputs(inputs[0])[index as usize]))
        }
        _ => None,
    }
}

/// Runs all simplifications to a fixpoint and returns how many rewrites
/// were applied.
pub fn canonicalize(graph: &mut Graph) -> usize {
    let mut worklist: Vec<NodeId> = graph.node_ids().collect();
    worklist.reverse();
    let mut queued: FxHashSet<NodeId> = worklist.iter().copied().collect();
    let mut changes = 0;
    while let Some(node) = worklist.pop() {
        queued.remove(&node);
        if !graph.is_alive(node) {
            continue;
        }
        let Some(touched) = simplify(graph, node) else {
            continue;
        };
        changes += 1;
        for t in touched {
            if graph.is_alive(t) && queued.insert(t) {
                worklist.push(t);
            }
        }
    }
    tracing::trace!(graph = graph.name(), changes, "canonicalized");
    changes
}

type Touched = Vec<NodeId>;

fn simplify(graph: &mut Graph, node: NodeId) -> Option<Touched> {
    let op = graph.op(node).clone();
    if op.is_floating() && !graph.has_usages(node) && !matches!(op, Op::Parameter(_)) {
        let inputs = graph.clear_inputs(node);
        graph.safe_delete(node);
        return Some(inputs.to_vec());
    }
    match op {
        Op::Binary(_) | Op::Compare(_) | Op::IsNull | Op::ArrayLength | Op::LoadIndexed => {
            let simplified = simplify_floating(graph, &op, graph.inputs(node))?;
            Some(replace_value(graph, node, simplified))
        }
        Op::Phi => simplify_phi(graph, node),
        Op::If => fold_if(graph, node),
        Op::FixedGuard { reason, negated } => fold_guard(graph, node, reason, negated),
        Op::Begin => remove_begin(graph, node),
        Op::Merge => simplify_merge(graph, node),
        Op::LoopBegin { .. } => remove_loop_without_back_edges(graph, node),
        _ => None,
    }
}

fn replace_value(graph: &mut Graph, node: NodeId, simplified: Simplified) -> Touched {
    let replacement = match simplified {
        Simplified::Constant(value) => graph.constant(value),
        Simplified::Node(existing) => existing,
    };
    let mut touched: Touched = graph.usages(node).to_vec();
    graph.replace_at_usages(node, replacement);
    touched.extend(graph.clear_inputs(node));
    graph.safe_delete(node);
    touched.push(replacement);
    touched
}

fn simplify_phi(graph: &mut Graph, phi: NodeId) -> Option<Touched> {
    let mut distinct = graph.phi_values(phi).iter().copied().filter(|v| *v != phi);
    let first = distinct.next()?;
    if distinct.any(|v| v != first) {
        return None;
    }
    Some(replace_value(graph, phi, Simplified::Node(first)))
}

fn fold_if(graph: &mut Graph, node: NodeId) -> Option<Touched> {
    let condition = graph.inputs(node)[0];
    let value = graph.as_constant(condition)?.as_bool()?;
    let (taken_index, dead_index) = if value { (0, 1) } else { (1, 0) };
    let taken = graph.successors(node)[taken_index];
    let dead = graph.successors(node)[dead_index];
    let pred = graph.predecessor(node);

    let mut touched: Touched = Vec::new();
    graph.set_successor(node, taken_index, None);
    if let Some(dead) = dead {
        touched.extend(graph.kill_cfg(dead));
    }
    graph.replace_at_predecessor(node, taken);
    touched.extend(graph.clear_inputs(node));
    graph.safe_delete(node);
    touched.extend(taken);
    touched.extend(pred);
    Some(touched)
}

fn fold_guard(
    graph: &mut Graph,
    node: NodeId,
    reason: crate::op::DeoptReason,
    negated: bool,
) -> Option<Touched> {
    let condition = graph.inputs(node)[0];
    let value = graph.as_constant(condition)?.as_bool()?;
    let mut touched: Touched = vec![condition];
    if value != negated {
        touched.extend(graph.predecessor(node));
        touched.extend(graph.next(node));
        graph.clear_inputs(node);
        graph.remove_fixed(node);
        return Some(touched);
    }
    let state = graph.node(node).state_before();
    let deopt = graph
        .add_node()
        .op(Op::Deoptimize { reason })
        .maybe_state_before(state)
        .new();
    if let Some(next) = graph.take_next(node) {
        touched.extend(graph.kill_cfg(next));
    }
    graph.replace_at_predecessor(node, Some(deopt));
    graph.clear_inputs(node);
    graph.safe_delete(node);
    Some(touched)
}

fn remove_begin(graph: &mut Graph, node: NodeId) -> Option<Touched> {
    let pred = graph.predecessor(node)?;
    if graph.op(pred).is_control_split() || graph.has_usages(node) {
        return None;
    }
    let next = graph.next(node);
    graph.remove_fixed(node);
    let mut touched = vec![pred];
    touched.extend(next);
    Some(touched)
}

fn simplify_merge(graph: &mut Graph, merge: NodeId) -> Option<Touched> {
    let ends = graph.merge_ends(merge).to_vec();
    if ends.is_empty() {
        return Some(graph.kill_cfg(merge));
    }
    let [end] = ends[..] else {
        return None;
    };
    let phis = graph.phis(merge);
    let only_phis = graph
        .usages(merge)
        .iter()
        .all(|u| *u == end || phis.contains(u));
    if !only_phis {
        return None;
    }

    let mut touched: Touched = Vec::new();
    for phi in phis {
        let value = graph.phi_values(phi)[0];
        if graph.has_usages(phi) {
            touched.extend(graph.usages(phi).iter().copied());
            graph.replace_at_usages(phi, value);
        }
        graph.clear_inputs(phi);
        graph.safe_delete(phi);
        touched.push(value);
    }
    let next = graph.take_next(merge);
    touched.extend(graph.clear_inputs(merge));
    let pred = graph.predecessor(end);
    graph.replace_at_predecessor(end, next);
    graph.safe_delete(end);
    graph.safe_delete(merge);
    touched.extend(pred);
    touched.extend(next);
    Some(touched)
}

fn remove_loop_without_back_edges(graph: &mut Graph, begin: NodeId) -> Option<Touched> {
    if !graph.loop_ends(begin).is_empty() {
        return None;
    }
    if graph.forward_ends(begin).is_empty() {
        return Some(graph.kill_cfg(begin));
    }
    let mut touched: Touched = vec![begin];
    for exit in graph.loop_exits(begin) {
        for proxy in graph.proxies(exit) {
            let value = graph.inputs(proxy)[1];
            touched.extend(graph.usages(proxy).iter().copied());
            graph.replace_at_usages(proxy, value);
            graph.clear_inputs(proxy);
            graph.safe_delete(proxy);
        }
        touched.extend(graph.next(exit));
        graph.clear_inputs(exit);
        graph.remove_fixed(exit);
    }
    graph.replace_op(begin, Op::Merge);
    Some(touched)
}
