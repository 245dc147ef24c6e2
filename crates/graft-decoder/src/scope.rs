//! Bookkeeping for the methods and loop iterations being decoded.
//!
//! Both kinds of scope live in index-addressed stacks owned by the decoding
//! session. A scope only refers to its parent by index, and scopes are
//! popped in the reverse order they were pushed.

use std::collections::BTreeMap;
use std::sync::Arc;

use graft_ir::encode::{EncodedGraph, OrderId};
use graft_ir::{MethodId, NodeId, Stamp};
use smallvec::SmallVec;

use crate::plugins::LoopExplosionKind;

/// A control path arriving at a merge point of the encoded graph, together
/// with the values it carries into that merge's phis.
#[derive(Clone, Debug)]
pub(crate) struct Incoming {
    pub pred: NodeId,
    pub slot: usize,
    pub values: SmallVec<[NodeId; 4]>,
}

/// How an encoded fixed node is reached once it is decoded.
#[derive(Clone, Debug)]
pub(crate) enum Pending {
    /// Through successor `slot` of `pred`.
    Link { pred: NodeId, slot: usize },
    /// Through every path in the list, which must be merged first.
    Ends(Vec<Incoming>),
}

/// The invoke a method scope was inlined for.
#[derive(Clone, Debug)]
pub(crate) struct InvokeData {
    pub invoke: OrderId,
    pub bci: i32,
    pub stamp: Stamp,
    pub state_after: Option<OrderId>,
    pub next: Option<OrderId>,
    pub exception: Option<OrderId>,
}

/// A return or unwind of an inlined method, not yet connected to its caller.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Exit {
    pub pred: NodeId,
    pub slot: usize,
    pub value: Option<NodeId>,
}

/// Work deferred until every node of an inlined method has been decoded.
#[derive(Clone, Copy, Debug)]
pub(crate) enum FinishAction {
    /// Connect the returns and unwinds to the caller.
    Inline,
    NotifyAfterInline(MethodId),
}

pub(crate) struct MethodScope {
    pub caller_loop: Option<usize>,
    pub method: MethodId,
    pub encoded: Arc<EncodedGraph>,
    /// Values of the callee's parameters; empty for the root method.
    pub arguments: SmallVec<[NodeId; 4]>,
    pub depth: usize,
    pub explosion: LoopExplosionKind,
    pub invoke: Option<InvokeData>,
    /// Frame state of the caller in the middle of the call, built on first
    /// use.
    pub outer_state: Option<NodeId>,
    pub exception_state: Option<NodeId>,
    pub returns: Vec<Exit>,
    pub unwinds: Vec<Exit>,
    pub finish: Vec<FinishAction>,
}

impl MethodScope {
    pub fn new(
        method: MethodId,
        encoded: Arc<EncodedGraph>,
        depth: usize,
        explosion: LoopExplosionKind,
    ) -> Self {
        Self {
            caller_loop: None,
            method,
            encoded,
            arguments: SmallVec::new(),
            depth,
            explosion,
            invoke: None,
            outer_state: None,
            exception_state: None,
            returns: Vec::new(),
            unwinds: Vec::new(),
            finish: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }
}

/// One method body, or one iteration of an exploded loop in it.
pub(crate) struct LoopScope {
    pub method: usize,
    pub parent: Option<usize>,
    /// The exploded loop this scope is an iteration of.
    pub loop_begin: Option<OrderId>,
    /// Target node of every encoded node decoded so far.
    pub created: Vec<Option<NodeId>>,
    pub pending: BTreeMap<OrderId, Pending>,
    /// Back edges taken during this iteration.
    pub back_edges: Vec<Incoming>,
}

impl LoopScope {
    pub fn new(method: usize, len: usize) -> Self {
        Self {
            method,
            parent: None,
            loop_begin: None,
            created: vec![None; len],
            pending: BTreeMap::new(),
            back_edges: Vec::new(),
        }
    }

    pub fn created(&self, id: OrderId) -> Option<NodeId> {
        self.created[id.index()]
    }

    pub fn set_created(&mut self, id: OrderId, node: Option<NodeId>) {
        self.created[id.index()] = node;
    }

    pub fn link(&mut self, id: OrderId, pred: NodeId, slot: usize) {
        let previous = self.pending.insert(id, Pending::Link { pred, slot });
        assert!(previous.is_none(), "{id} is reached twice");
    }

    pub fn add_incoming(&mut self, id: OrderId, incoming: Incoming) {
        match self
            .pending
            .entry(id)
            .or_insert_with(|| Pending::Ends(Vec::new()))
        {
            Pending::Ends(ends) => ends.push(incoming),
            Pending::Link { .. } => panic!("{id} is reached both directly and through a merge"),
        }
    }
}
