//! The mutable node graph.
//!
//! A [`Graph`] owns an arena of [`NodeInfo`] entries. Inputs and usages are
//! kept symmetric: every input edge `user -> target` appears exactly once in
//! `target`'s usage list. Successor slots and the `predecessor` back-link are
//! kept symmetric the same way. Every mutation goes through the methods here.

mod control;
mod duplicate;
mod dump;
mod kill;
mod memory;
mod verify;

use smallvec::SmallVec;

use crate::arena::{Arena, Id};
use crate::constant::Constant;
use crate::lattice::Lattice;
use crate::meta::MethodId;
use crate::node::{Edge, NodeId, NodeInfo};
use crate::op::Op;
use crate::stamp::{ObjectStamp, Stamp};

pub use verify::VerifyError;

/// Position in the node arena. Nodes added after a mark can be rolled back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct GraphMark(usize);

#[derive(Clone, Debug)]
pub struct Graph {
    name: String,
    method: Option<MethodId>,
    nodes: Arena<NodeId, NodeInfo>,
    start: NodeId,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        let mut nodes = Arena::default();
        let start = nodes.alloc(NodeInfo::new(Op::Start, Stamp::Void));
        Self {
            name: name.into(),
            method: None,
            nodes,
            start,
        }
    }

    /// An empty graph for the body of `method`.
    pub fn for_method(method: MethodId, name: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Option<MethodId> {
        self.method
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    // -- Queries ------------------------------------------------------------

    /// Panics if `id` was deleted.
    pub fn node(&self, id: NodeId) -> &NodeInfo {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(id)
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        !self.nodes.is_deleted(id)
    }

    pub fn op(&self, id: NodeId) -> &Op {
        &self.nodes[id].op
    }

    pub fn stamp(&self, id: NodeId) -> &Stamp {
        &self.nodes[id].stamp
    }

    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].inputs
    }

    pub fn usages(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].usages
    }

    pub fn has_usages(&self, id: NodeId) -> bool {
        !self.nodes[id].usages.is_empty()
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].next()
    }

    pub fn predecessor(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].predecessor
    }

    pub fn successors(&self, id: NodeId) -> &[Option<NodeId>] {
        &self.nodes[id].successors
    }

    /// The constant value of `id`, if it is a constant node.
    pub fn as_constant(&self, id: NodeId) -> Option<&Constant> {
        self.nodes[id].op.constant()
    }

    /// Live node ids in allocation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.ids()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Live nodes whose op satisfies `pred`.
    pub fn nodes_where(&self, pred: impl Fn(&Op) -> bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, info)| pred(&info.op))
            .map(|(id, _)| id)
            .collect()
    }

    /// Count of live nodes whose op satisfies `pred`.
    pub fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.nodes.iter().filter(|(_, info)| pred(&info.op)).count()
    }

    /// Parameter nodes ordered by index.
    pub fn parameters(&self) -> Vec<(u32, NodeId)> {
        let mut params: Vec<_> = self
            .nodes
            .iter()
            .filter_map(|(id, info)| match info.op {
                Op::Parameter(idx) => Some((idx, id)),
                _ => None,
            })
            .collect();
        params.sort();
        params
    }

    pub fn parameter(&self, index: u32) -> Option<NodeId> {
        self.nodes.iter().find_map(|(id, info)| match info.op {
            Op::Parameter(idx) if idx == index => Some(id),
            _ => None,
        })
    }

    // -- Marks --------------------------------------------------------------

    pub fn mark(&self) -> GraphMark {
        GraphMark(self.nodes.capacity_used())
    }

    /// Live nodes allocated after `mark`.
    pub fn nodes_since(&self, mark: GraphMark) -> Vec<NodeId> {
        self.node_ids()
            .filter(|id| Id::from(*id).raw() >= mark.0)
            .collect()
    }

    /// Removes every node allocated after `mark`. Older nodes they were
    /// attached to lose those edges; successor slots are left empty.
    pub fn rollback(&mut self, mark: GraphMark) {
        let added = self.nodes_since(mark);
        for &node in &added {
            self.clear_inputs(node);
            self.replace_at_predecessor(node, None);
            self.clear_successors(node);
        }
        for &node in &added {
            self.nodes[node].usages.clear();
            self.nodes.delete(node);
        }
    }

    // -- Node creation ------------------------------------------------------

    /// Adds a node with the stamp inferred from its op and inputs.
    ///
    /// *Non-builder variant.* Use [`Graph::add_node`] to also set memory, state
    /// edges or an explicit stamp.
    pub fn add(&mut self, op: Op, inputs: &[NodeId]) -> NodeId {
        let stamp = self.infer_stamp(&op, inputs);
        let id = self.nodes.alloc(NodeInfo::new(op, stamp));
        for &input in inputs {
            self.push_input(id, input);
        }
        id
    }

    pub fn constant(&mut self, value: Constant) -> NodeId {
        self.add(Op::Constant(value), &[])
    }

    fn infer_stamp(&self, op: &Op, inputs: &[NodeId]) -> Stamp {
        match op {
            Op::Constant(c) => Stamp::for_constant(c),
            Op::Binary(_) => Stamp::int(),
            Op::Compare(_) | Op::IsNull => Stamp::Bool,
            Op::ArrayLength => Stamp::int_range(0, i32::MAX as i64),
            Op::Phi => inputs
                .iter()
                .skip(1)
                .fold(Stamp::Void, |acc, v| acc.join(&self.nodes[*v].stamp)),
            Op::ValueProxy => inputs
                .get(1)
                .map(|v| self.nodes[*v].stamp)
                .unwrap_or_default(),
            Op::VarargsArray { .. } | Op::ExceptionObject => Stamp::Object(ObjectStamp {
                non_null: true,
                ..ObjectStamp::unrestricted()
            }),
            Op::Parameter(_)
            | Op::Placeholder { .. }
            | Op::LoadIndexed
            | Op::Read { .. }
            | Op::Invoke { .. }
            | Op::ForeignCall { .. }
            | Op::Macro { .. } => Stamp::Any,
            _ => Stamp::Void,
        }
    }

    pub fn set_stamp(&mut self, id: NodeId, stamp: Stamp) {
        self.nodes[id].stamp = stamp;
    }

    /// Swaps the op of a node whose successor arity does not change.
    pub(crate) fn replace_op(&mut self, id: NodeId, op: Op) {
        let info = &mut self.nodes[id];
        assert_eq!(
            info.successors.len(),
            op.successor_count(),
            "op change of {id} would alter its successor arity"
        );
        info.op = op;
    }

    // -- Input edges --------------------------------------------------------

    fn add_usage(&mut self, target: NodeId, user: NodeId) {
        self.nodes[target].usages.push(user);
    }

    fn remove_usage(&mut self, target: NodeId, user: NodeId) {
        let usages = &mut self.nodes[target].usages;
        if let Some(pos) = usages.iter().position(|u| *u == user) {
            usages.swap_remove(pos);
        }
    }

    pub fn push_input(&mut self, id: NodeId, input: NodeId) {
        self.nodes[id].inputs.push(input);
        self.add_usage(input, id);
    }

    pub fn set_input(&mut self, id: NodeId, index: usize, input: NodeId) {
        let old = std::mem::replace(&mut self.nodes[id].inputs[index], input);
        if old != input {
            self.remove_usage(old, id);
            self.add_usage(input, id);
        }
    }

    pub fn remove_input(&mut self, id: NodeId, index: usize) -> NodeId {
        let old = self.nodes[id].inputs.remove(index);
        self.remove_usage(old, id);
        old
    }

    /// Sets one of the optional edges (memory, states, outer).
    pub fn set_edge(&mut self, id: NodeId, edge: Edge, target: Option<NodeId>) {
        if let Edge::Input(index) = edge {
            let target = target.unwrap_or_else(|| panic!("input {index} of {id} cannot be unset"));
            self.set_input(id, index, target);
            return;
        }
        let old = std::mem::replace(self.nodes[id].edge_slot(edge), target);
        if old == target {
            return;
        }
        if let Some(old) = old {
            self.remove_usage(old, id);
        }
        if let Some(target) = target {
            self.add_usage(target, id);
        }
    }

    pub fn set_memory(&mut self, id: NodeId, memory: Option<NodeId>) {
        self.set_edge(id, Edge::Memory, memory);
    }

    pub fn set_state_before(&mut self, id: NodeId, state: Option<NodeId>) {
        self.set_edge(id, Edge::StateBefore, state);
    }

    pub fn set_state_during(&mut self, id: NodeId, state: Option<NodeId>) {
        self.set_edge(id, Edge::StateDuring, state);
    }

    pub fn set_state_after(&mut self, id: NodeId, state: Option<NodeId>) {
        self.set_edge(id, Edge::StateAfter, state);
    }

    pub fn set_outer(&mut self, id: NodeId, outer: Option<NodeId>) {
        self.set_edge(id, Edge::Outer, outer);
    }

    /// Drops every input edge of `id` and returns the former targets.
    pub fn clear_inputs(&mut self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        let targets: SmallVec<[NodeId; 8]> = self.nodes[id].edges().map(|(_, n)| n).collect();
        let info = &mut self.nodes[id];
        info.inputs.clear();
        info.memory = None;
        info.state_before = None;
        info.state_during = None;
        info.state_after = None;
        info.outer = None;
        for &target in &targets {
            self.remove_usage(target, id);
        }
        targets
    }

    /// Redirects every edge of `user` that points at `old` to `new`.
    pub fn replace_input_of(&mut self, user: NodeId, old: NodeId, new: NodeId) {
        let edges: SmallVec<[Edge; 4]> = self.nodes[user]
            .edges()
            .filter(|(_, target)| *target == old)
            .map(|(edge, _)| edge)
            .collect();
        for edge in edges {
            self.set_edge(user, edge, Some(new));
        }
    }

    /// Redirects every usage of `old` to `new`.
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) {
        self.replace_at_usages_where(old, new, |_, _| true);
    }

    /// Redirects the usages of `old` for which `filter(user, edge)` holds.
    pub fn replace_at_usages_where(
        &mut self,
        old: NodeId,
        new: NodeId,
        mut filter: impl FnMut(NodeId, Edge) -> bool,
    ) {
        assert_ne!(old, new, "cannot replace {old} with itself");
        let mut users: SmallVec<[NodeId; 8]> = self.nodes[old].usages.clone().into_iter().collect();
        users.sort();
        users.dedup();
        for user in users {
            let edges: SmallVec<[Edge; 4]> = self.nodes[user]
                .edges()
                .filter(|(edge, target)| *target == old && filter(user, *edge))
                .map(|(edge, _)| edge)
                .collect();
            for edge in edges {
                self.set_edge(user, edge, Some(new));
            }
        }
    }

    // -- Successor edges ----------------------------------------------------

    /// Points successor slot `index` of `id` at `succ`, fixing up the
    /// predecessor links on both the old and the new successor.
    pub fn set_successor(&mut self, id: NodeId, index: usize, succ: Option<NodeId>) {
        let old = std::mem::replace(&mut self.nodes[id].successors[index], succ);
        if old == succ {
            return;
        }
        if let Some(old) = old {
            self.nodes[old].predecessor = None;
        }
        if let Some(succ) = succ {
            let pred = &mut self.nodes[succ].predecessor;
            assert!(
                pred.is_none(),
                "{succ} already has predecessor {}",
                pred.map(|p| p.to_string()).unwrap_or_default()
            );
            *pred = Some(id);
        }
    }

    pub fn set_next(&mut self, id: NodeId, next: Option<NodeId>) {
        self.set_successor(id, 0, next);
    }

    /// Detaches and returns the first successor of `id`.
    pub fn take_next(&mut self, id: NodeId) -> Option<NodeId> {
        let next = self.next(id);
        self.set_next(id, None);
        next
    }

    /// Index of the successor slot of `pred` that holds `succ`.
    pub fn successor_index(&self, pred: NodeId, succ: NodeId) -> Option<usize> {
        self.nodes[pred]
            .successors
            .iter()
            .position(|s| *s == Some(succ))
    }

    /// Makes the predecessor of `id` point at `replacement` instead.
    pub fn replace_at_predecessor(&mut self, id: NodeId, replacement: Option<NodeId>) {
        let Some(pred) = self.nodes[id].predecessor else {
            return;
        };
        let index = self
            .successor_index(pred, id)
            .unwrap_or_else(|| panic!("{pred} does not list {id} as a successor"));
        self.set_successor(pred, index, None);
        if let Some(replacement) = replacement {
            if let Some(old_pred) = self.nodes[replacement].predecessor {
                let old_index = self
                    .successor_index(old_pred, replacement)
                    .unwrap_or_else(|| panic!("{old_pred} lost successor {replacement}"));
                self.set_successor(old_pred, old_index, None);
            }
            self.set_successor(pred, index, Some(replacement));
        }
    }

    pub(crate) fn clear_successors(&mut self, id: NodeId) {
        for index in 0..self.nodes[id].successors.len() {
            self.set_successor(id, index, None);
        }
    }

    // -- Deletion -----------------------------------------------------------

    /// Deletes a node nothing refers to anymore.
    ///
    /// Panics when the node still has usages; callers must reroute them first.
    pub fn safe_delete(&mut self, id: NodeId) {
        assert!(
            self.nodes[id].usages.is_empty(),
            "cannot delete {id} ({}): still used by {:?}",
            self.nodes[id].op.mnemonic(),
            self.nodes[id].usages
        );
        self.clear_inputs(id);
        self.replace_at_predecessor(id, None);
        self.clear_successors(id);
        self.nodes.delete(id);
    }
}

#[bon::bon]
impl Graph {
    /// Adds a node, optionally wiring its memory and state edges.
    ///
    /// The stamp is inferred from `op` and `inputs` unless one is given.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let write = graph.add_node()
    ///     .op(Op::Write { location })
    ///     .inputs(&[object, value])
    ///     .state_after(state)
    ///     .new();
    /// ```
    #[builder(finish_fn = new)]
    pub fn add_node(
        &mut self,
        op: Op,
        inputs: Option<&[NodeId]>,
        stamp: Option<Stamp>,
        memory: Option<NodeId>,
        state_before: Option<NodeId>,
        state_during: Option<NodeId>,
        state_after: Option<NodeId>,
    ) -> NodeId {
        let id = self.add(op, inputs.unwrap_or_default());
        if let Some(stamp) = stamp {
            self.set_stamp(id, stamp);
        }
        self.set_memory(id, memory);
        self.set_state_before(id, state_before);
        self.set_state_during(id, state_during);
        self.set_state_after(id, state_after);
        id
    }
}
