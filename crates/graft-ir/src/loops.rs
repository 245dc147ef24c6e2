//! Loop peeling and full unrolling.
//!
//! Peeling copies one iteration of a loop in front of it. Repeating that and
//! canonicalizing in between unrolls a loop whose trip count becomes constant
//! once its entry values are known.

use rustc_hash::FxHashSet;

use crate::arena::IdMap;
use crate::canonical::canonicalize;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::op::Op;

/// The nodes that make up one loop.
#[derive(Clone, Debug)]
pub struct LoopInfo {
    pub begin: NodeId,
    /// Fixed nodes of the body, the loop begin excluded.
    pub body: Vec<NodeId>,
    /// Floating nodes computed inside the loop, the loop's own phis excluded.
    pub floating: Vec<NodeId>,
    pub exits: Vec<NodeId>,
    pub proxies: Vec<NodeId>,
}

impl LoopInfo {
    pub fn compute(graph: &Graph, begin: NodeId) -> Self {
        let exits = graph.loop_exits(begin);
        let exit_set: FxHashSet<NodeId> = exits.iter().copied().collect();

        let mut body = Vec::new();
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        seen.insert(begin);
        let mut stack: Vec<NodeId> = graph.next(begin).into_iter().collect();
        while let Some(node) = stack.pop() {
            if exit_set.contains(&node) || !seen.insert(node) {
                continue;
            }
            body.push(node);
            if graph.op(node).is_end() {
                if let Some(merge) = graph.end_merge(node) {
                    if merge != begin {
                        stack.push(merge);
                    }
                }
            } else {
                stack.extend(graph.successors(node).iter().rev().flatten().copied());
            }
        }

        let phis: FxHashSet<NodeId> = graph.phis(begin).into_iter().collect();
        let proxies: Vec<NodeId> = exits.iter().flat_map(|x| graph.proxies(*x)).collect();
        let proxy_set: FxHashSet<NodeId> = proxies.iter().copied().collect();

        let mut floating = Vec::new();
        let mut floating_seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut work: Vec<NodeId> = body.iter().chain(phis.iter()).copied().collect();
        while let Some(node) = work.pop() {
            for &user in graph.usages(node) {
                if graph.op(user).is_floating()
                    && !phis.contains(&user)
                    && !proxy_set.contains(&user)
                    && floating_seen.insert(user)
                {
                    floating.push(user);
                    work.push(user);
                }
            }
        }
        floating.sort();

        Self {
            begin,
            body,
            floating,
            exits,
            proxies,
        }
    }
}

/// Funnels several forward ends of a loop through one merge so the loop has
/// a single entry. Returns that entry end.
fn single_forward_end(graph: &mut Graph, begin: NodeId) -> NodeId {
    let forward = graph.forward_ends(begin);
    match forward[..] {
        [] => panic!("loop {begin} has no forward end"),
        [end] => end,
        _ => {
            let positions: Vec<usize> = forward
                .iter()
                .map(|f| graph.inputs(begin).iter().position(|e| e == f).unwrap_or_default())
                .collect();
            let phis = graph.phis(begin);
            let entry_values: Vec<Vec<NodeId>> = phis
                .iter()
                .map(|phi| positions.iter().map(|p| graph.phi_values(*phi)[*p]).collect())
                .collect();
            for &end in &forward {
                graph.remove_end(begin, end);
            }
            let merge = graph.add(Op::Merge, &forward);
            let entry = graph.add(Op::End, &[]);
            graph.set_next(merge, Some(entry));
            let mut phi_inputs = Vec::with_capacity(phis.len());
            for (phi, values) in phis.iter().zip(entry_values) {
                let mut inputs = vec![merge];
                inputs.extend(values);
                let entry_phi = graph.add(Op::Phi, &inputs);
                graph.set_stamp(entry_phi, *graph.stamp(*phi));
                phi_inputs.push((*phi, entry_phi));
            }
            graph.add_end(begin, entry, &phi_inputs);
            entry
        }
    }
}

/// Copies the first iteration of the loop at `begin` in front of it.
///
/// The copy reads the loop's entry values where the original reads its
/// phis. Its back edges become the new entry of the loop. Each loop exit
/// gets a merge joining the exit of the copy with the exit of the remaining
/// loop, and each value proxy becomes a phi on that merge.
pub fn peel(graph: &mut Graph, begin: NodeId) {
    let forward = single_forward_end(graph, begin);
    let info = LoopInfo::compute(graph, begin);
    let begin_inputs = graph.inputs(begin).to_vec();
    let forward_index = begin_inputs
        .iter()
        .position(|e| *e == forward)
        .unwrap_or_default();
    let phis = graph.phis(begin);

    let mut replacements = IdMap::default();
    for &phi in &phis {
        replacements.insert(phi, graph.phi_values(phi)[forward_index]);
    }
    let mut nodes = info.body.clone();
    nodes.extend(&info.floating);
    nodes.extend(&info.exits);
    nodes.extend(&info.proxies);
    let copies = graph.duplicate_nodes(&nodes, &replacements);

    let first = graph
        .next(begin)
        .unwrap_or_else(|| panic!("loop {begin} has no body"));
    graph.replace_at_predecessor(forward, Some(copies[first]));

    let back_edges: Vec<(usize, NodeId)> = begin_inputs
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, e)| matches!(graph.op(*e), Op::LoopEnd))
        .collect();
    assert!(!back_edges.is_empty(), "loop {begin} has no back edge");
    let peeled_value = |graph: &Graph, phi: NodeId, index: usize| {
        let value = graph.inputs(phi)[index + 1];
        copies
            .get_copied(value)
            .or_else(|| replacements.get_copied(value))
            .unwrap_or(value)
    };

    if let [(index, loop_end)] = back_edges[..] {
        let copy = copies[loop_end];
        graph.replace_at_predecessor(copy, Some(forward));
        graph.safe_delete(copy);
        for &phi in &phis {
            let value = peeled_value(graph, phi, index);
            graph.set_input(phi, forward_index + 1, value);
        }
    } else {
        let merge = graph.add(Op::Merge, &[]);
        for &(_, loop_end) in &back_edges {
            let copy = copies[loop_end];
            let end = graph.add(Op::End, &[]);
            graph.replace_at_predecessor(copy, Some(end));
            graph.safe_delete(copy);
            graph.push_input(merge, end);
        }
        graph.set_next(merge, Some(forward));
        for &phi in &phis {
            let mut inputs = vec![merge];
            inputs.extend(back_edges.iter().map(|(i, _)| peeled_value(graph, phi, *i)));
            let entry_phi = graph.add(Op::Phi, &inputs);
            graph.set_stamp(entry_phi, *graph.stamp(phi));
            graph.set_input(phi, forward_index + 1, entry_phi);
        }
    }

    for &exit in &info.exits {
        let copy = copies[exit];
        let after = graph.take_next(exit);
        let peeled_end = graph.add(Op::End, &[]);
        graph.set_next(copy, Some(peeled_end));
        let loop_end = graph.add(Op::End, &[]);
        graph.set_next(exit, Some(loop_end));
        let merge = graph.add(Op::Merge, &[peeled_end, loop_end]);
        graph.set_next(merge, after);
        for proxy in graph.proxies(exit) {
            let peeled_proxy = copies[proxy];
            let peeled = graph.inputs(peeled_proxy)[1];
            let phi = graph.add(Op::Phi, &[merge, peeled, proxy]);
            graph.set_stamp(phi, *graph.stamp(proxy));
            graph.replace_at_usages_where(proxy, phi, |user, _| user != phi);
            graph.clear_inputs(peeled_proxy);
            graph.safe_delete(peeled_proxy);
        }
        graph.clear_inputs(copy);
        graph.replace_op(copy, Op::Begin);
    }
}

/// Peels the loop at `begin` until canonicalization removes it. Returns the
/// number of iterations peeled.
///
/// Does not terminate for loops whose trip count never becomes constant.
pub fn full_unroll(graph: &mut Graph, begin: NodeId) -> usize {
    let mut peeled = 0;
    while graph.is_alive(begin) && matches!(graph.op(begin), Op::LoopBegin { .. }) {
        peel(graph, begin);
        peeled += 1;
        canonicalize(graph);
        tracing::trace!(%begin, peeled, "peeled loop iteration");
    }
    peeled
}

/// Fully unrolls every loop flagged for explosion. Returns the total number
/// of peeled iterations.
pub fn explode_loops(graph: &mut Graph) -> usize {
    let mut total = 0;
    loop {
        let next = graph
            .node_ids()
            .find(|n| matches!(graph.op(*n), Op::LoopBegin { explode: true }));
        let Some(begin) = next else {
            break;
        };
        total += full_unroll(graph, begin);
    }
    total
}
