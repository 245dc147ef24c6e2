use std::sync::Arc;

use graft_ir::canonical::canonicalize;
use graft_ir::encode::{EncodedGraph, EncodedNode, OrderId};
use graft_ir::{Constant, Graph, MetaAccess, MethodId, NodeId, Op, Stamp};
use graft_template::TemplateLowerer;
use smallvec::SmallVec;

use crate::cache::GraphCache;
use crate::error::{BailoutReason, CompileError};
use crate::options::DecoderOptions;
use crate::plugins::{
    InlineInvokePlugin, InvocationPlugins, LoopExplosionKind, LoopExplosionPlugin,
};
use crate::scope::{Exit, Incoming, LoopScope, MethodScope, Pending};
use crate::stats::DecodeStats;

/// The result of a successful decode.
#[derive(Debug)]
pub struct Decoded {
    pub graph: Graph,
    pub stats: DecodeStats,
}

/// Decodes method graphs with partial evaluation.
///
/// # Examples
///
/// ```ignore
/// let decoder = PeDecoder::builder()
///     .meta(&meta)
///     .cache(&cache)
///     .inline_plugins(vec![&always_inline])
///     .build();
/// let Decoded { graph, stats } = decoder.decode(root)?;
/// ```
#[derive(bon::Builder)]
pub struct PeDecoder<'a> {
    meta: &'a dyn MetaAccess,
    cache: &'a GraphCache,
    #[builder(default)]
    options: DecoderOptions,
    #[builder(default)]
    inline_plugins: Vec<&'a dyn InlineInvokePlugin>,
    invocation_plugins: Option<&'a InvocationPlugins>,
    loop_explosion: Option<&'a dyn LoopExplosionPlugin>,
    /// Lowers the macro nodes left in the decoded graph.
    lowerer: Option<&'a TemplateLowerer<'a>>,
}

impl<'a> PeDecoder<'a> {
    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Decodes `method` into a fresh graph.
    ///
    /// Nothing is returned on failure; a bailout means the method keeps
    /// running in the interpreter.
    pub fn decode(&self, method: MethodId) -> Result<Decoded, CompileError> {
        let name = self.meta.method_name(method);
        let _span = tracing::debug_span!("decode", method = %name).entered();
        let encoded = self.cache.get(method).ok_or_else(|| {
            CompileError::bailout(
                BailoutReason::Unsupported,
                format!("no graph available for {name}"),
            )
        })?;

        let mut session = Session::new(self, Graph::for_method(method, name));
        session.decode_root(method, encoded)?;
        let Session {
            mut graph,
            mut stats,
            ..
        } = session;

        if let Some(lowerer) = self.lowerer {
            stats.lowered_macros = lowerer.lower_all(&mut graph)?;
        }
        canonicalize(&mut graph);
        tracing::debug!(
            nodes = graph.len(),
            inlined = stats.inlined_calls,
            invokes = stats.materialized_invokes,
            "decoded graph"
        );
        Ok(Decoded { graph, stats })
    }

    pub(crate) fn meta(&self) -> &'a dyn MetaAccess {
        self.meta
    }

    pub(crate) fn cache(&self) -> &'a GraphCache {
        self.cache
    }

    pub(crate) fn inline_plugins(&self) -> &[&'a dyn InlineInvokePlugin] {
        &self.inline_plugins
    }

    pub(crate) fn invocation_plugins(&self) -> Option<&'a InvocationPlugins> {
        self.invocation_plugins
    }

    pub(crate) fn explosion_kind(&self, method: MethodId) -> LoopExplosionKind {
        self.loop_explosion
            .map_or(LoopExplosionKind::None, |plugin| plugin.explosion_kind(method))
    }
}

/// State of one decode: the graph under construction and the scope stacks.
pub(crate) struct Session<'d, 'a> {
    pub decoder: &'d PeDecoder<'a>,
    pub graph: Graph,
    pub methods: Vec<MethodScope>,
    pub loops: Vec<LoopScope>,
    pub stats: DecodeStats,
}

impl<'d, 'a> Session<'d, 'a> {
    fn new(decoder: &'d PeDecoder<'a>, graph: Graph) -> Self {
        Self {
            decoder,
            graph,
            methods: Vec::new(),
            loops: Vec::new(),
            stats: DecodeStats::default(),
        }
    }
}

impl Session<'_, '_> {
    fn decode_root(
        &mut self,
        method: MethodId,
        encoded: Arc<EncodedGraph>,
    ) -> Result<(), CompileError> {
        let explosion = self.decoder.explosion_kind(method);
        let mut body = LoopScope::new(0, encoded.len());
        let start = self.graph.start();
        body.set_created(encoded.start(), Some(start));
        if let Some(first) = encoded.node(encoded.start()).next() {
            body.link(first, start, 0);
        }
        self.methods
            .push(MethodScope::new(method, encoded, 0, explosion));
        self.loops.push(body);
        self.run_scope(0)
    }

    pub(crate) fn encoded(&self, scope: usize) -> Arc<EncodedGraph> {
        self.methods[self.loops[scope].method].encoded.clone()
    }

    /// Decodes pending fixed nodes of `scope` in encoding order until none
    /// are left.
    pub(crate) fn run_scope(&mut self, scope: usize) -> Result<(), CompileError> {
        while let Some((id, pending)) = self.loops[scope].pending.pop_first() {
            match pending {
                Pending::Link { pred, slot } => self.decode_fixed(scope, id, pred, slot)?,
                Pending::Ends(incoming) => self.decode_merge(scope, id, incoming)?,
            }
        }
        Ok(())
    }

    /// Records `new` as the copy of `id` and queues its successors.
    pub(crate) fn follow(&mut self, scope: usize, id: OrderId, node: &EncodedNode, new: NodeId) {
        self.loops[scope].set_created(id, Some(new));
        for (index, succ) in node.successors.iter().enumerate() {
            if let Some(succ) = succ {
                self.loops[scope].link(*succ, new, index);
            }
        }
    }

    /// Skips a node that has no counterpart in the target graph.
    fn pass_through(
        &mut self,
        scope: usize,
        id: OrderId,
        node: &EncodedNode,
        pred: NodeId,
        slot: usize,
    ) {
        self.loops[scope].set_created(id, Some(pred));
        if let Some(next) = node.next() {
            self.loops[scope].link(next, pred, slot);
        }
    }

    fn decode_fixed(
        &mut self,
        scope: usize,
        id: OrderId,
        pred: NodeId,
        slot: usize,
    ) -> Result<(), CompileError> {
        let encoded = self.encoded(scope);
        let node = encoded.node(id);
        match &node.op {
            Op::Begin if !self.graph.op(pred).is_control_split() => {
                self.pass_through(scope, id, node, pred, slot);
            }
            Op::If => {
                let condition = self.ensure(scope, node.inputs[0]);
                match self.graph.as_constant(condition).and_then(Constant::as_bool) {
                    Some(taken) => {
                        let succ = node.successors[if taken { 0 } else { 1 }];
                        if let Some(succ) = succ {
                            self.loops[scope].link(succ, pred, slot);
                        }
                    }
                    None => {
                        let branch = self.graph.add(Op::If, &[condition]);
                        self.graph.set_successor(pred, slot, Some(branch));
                        self.follow(scope, id, node, branch);
                    }
                }
            }
            Op::FixedGuard { reason, negated } => {
                let condition = self.ensure(scope, node.inputs[0]);
                match self.graph.as_constant(condition).and_then(Constant::as_bool) {
                    Some(value) if value != *negated => {
                        self.pass_through(scope, id, node, pred, slot);
                    }
                    Some(_) => {
                        let state = node.state_before.map(|s| self.ensure(scope, s));
                        let deopt = self
                            .graph
                            .add_node()
                            .op(Op::Deoptimize { reason: *reason })
                            .maybe_state_before(state)
                            .new();
                        self.graph.set_successor(pred, slot, Some(deopt));
                        self.loops[scope].set_created(id, Some(deopt));
                    }
                    None => self.copy_fixed(scope, id, pred, slot),
                }
            }
            Op::End => {
                let (merge, index) = encoded.end_merge(id);
                let values = self.phi_inputs(scope, &encoded, merge, index);
                self.loops[scope].add_incoming(merge, Incoming { pred, slot, values });
            }
            Op::LoopEnd => self.decode_loop_end(scope, &encoded, id, pred, slot),
            Op::LoopExit => self.decode_loop_exit(scope, &encoded, id, pred, slot),
            Op::Return | Op::Unwind if !self.methods[self.loops[scope].method].is_root() => {
                let value = node.inputs.first().map(|v| self.ensure(scope, *v));
                let exit = Exit { pred, slot, value };
                let method = &mut self.methods[self.loops[scope].method];
                if matches!(node.op, Op::Return) {
                    method.returns.push(exit);
                } else {
                    method.unwinds.push(exit);
                }
            }
            Op::Invoke { .. } => return self.decode_invoke(scope, id, (pred, slot)),
            Op::Start | Op::Merge | Op::LoopBegin { .. } => {
                panic!("{id} ({}) is only reachable through ends", node.op.mnemonic())
            }
            _ => self.copy_fixed(scope, id, pred, slot),
        }
        Ok(())
    }

    fn copy_fixed(&mut self, scope: usize, id: OrderId, pred: NodeId, slot: usize) {
        let new = self.copy_node(scope, id);
        self.graph.set_successor(pred, slot, Some(new));
        let encoded = self.encoded(scope);
        self.follow(scope, id, encoded.node(id), new);
    }

    /// Values the path through end number `index` feeds into the phis of
    /// `merge`.
    pub(crate) fn phi_inputs(
        &mut self,
        scope: usize,
        encoded: &EncodedGraph,
        merge: OrderId,
        index: usize,
    ) -> SmallVec<[NodeId; 4]> {
        encoded
            .phis(merge)
            .iter()
            .map(|phi| self.ensure(scope, encoded.node(*phi).inputs[index + 1]))
            .collect()
    }

    /// The scope exploding the loop of `begin`, searching outwards from
    /// `scope`.
    pub(crate) fn exploding(&self, scope: usize, begin: OrderId) -> Option<usize> {
        let mut current = Some(scope);
        while let Some(index) = current {
            if self.loops[index].loop_begin == Some(begin) {
                return Some(index);
            }
            current = self.loops[index].parent;
        }
        None
    }

    fn decode_loop_end(
        &mut self,
        scope: usize,
        encoded: &EncodedGraph,
        id: OrderId,
        pred: NodeId,
        slot: usize,
    ) {
        let (begin, index) = encoded.end_merge(id);
        let values = self.phi_inputs(scope, encoded, begin, index);
        if let Some(exploding) = self.exploding(scope, begin) {
            self.loops[exploding]
                .back_edges
                .push(Incoming { pred, slot, values });
            return;
        }
        let target = self.created_fixed(scope, begin);
        let end = self.graph.add(Op::LoopEnd, &[]);
        self.graph.set_successor(pred, slot, Some(end));
        self.graph.push_input(target, end);
        for (phi, value) in encoded.phis(begin).iter().zip(values) {
            let phi = self.created_fixed(scope, *phi);
            self.graph.push_input(phi, value);
        }
        self.loops[scope].set_created(id, Some(end));
    }

    fn decode_loop_exit(
        &mut self,
        scope: usize,
        encoded: &EncodedGraph,
        id: OrderId,
        pred: NodeId,
        slot: usize,
    ) {
        let begin = encoded.node(id).inputs[0];
        if let Some(exploding) = self.exploding(scope, begin) {
            let values = encoded
                .proxies(id)
                .iter()
                .map(|proxy| self.ensure(scope, encoded.node(*proxy).inputs[1]))
                .collect();
            let parent = self.loops[exploding]
                .parent
                .unwrap_or_else(|| panic!("exploded loop {begin} has no enclosing scope"));
            self.loops[parent].add_incoming(id, Incoming { pred, slot, values });
            return;
        }
        let target = self.created_fixed(scope, begin);
        let exit = self.graph.add(Op::LoopExit, &[target]);
        self.graph.set_successor(pred, slot, Some(exit));
        self.follow(scope, id, encoded.node(id), exit);
    }

    fn created_fixed(&self, scope: usize, id: OrderId) -> NodeId {
        self.loops[scope]
            .created(id)
            .unwrap_or_else(|| panic!("{id} is used before it was decoded"))
    }

    fn decode_merge(
        &mut self,
        scope: usize,
        id: OrderId,
        incoming: Vec<Incoming>,
    ) -> Result<(), CompileError> {
        let encoded = self.encoded(scope);
        let node = encoded.node(id);
        let slots: SmallVec<[OrderId; 4]> = match &node.op {
            Op::LoopBegin { explode } => {
                let method = &self.methods[self.loops[scope].method];
                if *explode || method.explosion != LoopExplosionKind::None {
                    return self.explode_loop(scope, id, incoming);
                }
                self.open_loop(scope, &encoded, id, incoming);
                return Ok(());
            }
            Op::Merge => encoded.phis(id).into(),
            Op::LoopExit => encoded.proxies(id).into(),
            Op::ExceptionObject => SmallVec::from_slice(&[id]),
            op => panic!("{id} ({}) cannot merge control flow", op.mnemonic()),
        };
        let stamps: SmallVec<[Stamp; 4]> = slots.iter().map(|s| encoded.node(*s).stamp).collect();
        let (pred, slot, values) = self.join(incoming, &stamps);
        for (s, value) in slots.iter().zip(values) {
            self.loops[scope].set_created(*s, Some(value));
        }
        if !matches!(node.op, Op::ExceptionObject) {
            self.loops[scope].set_created(id, Some(pred));
        }
        if let Some(next) = node.next() {
            self.loops[scope].link(next, pred, slot);
        }
        Ok(())
    }

    /// Joins control paths, adding a merge and phis when there is more than
    /// one. Returns where control continues and one value per stamp.
    pub(crate) fn join(
        &mut self,
        incoming: Vec<Incoming>,
        stamps: &[Stamp],
    ) -> (NodeId, usize, SmallVec<[NodeId; 4]>) {
        if let [path] = incoming.as_slice() {
            return (path.pred, path.slot, path.values.clone());
        }
        assert!(!incoming.is_empty(), "joining no control paths");
        let merge = self.graph.add(Op::Merge, &[]);
        for path in &incoming {
            let end = self.graph.add(Op::End, &[]);
            self.graph.set_successor(path.pred, path.slot, Some(end));
            self.graph.push_input(merge, end);
        }
        let mut values = SmallVec::new();
        for (index, stamp) in stamps.iter().enumerate() {
            let first = incoming[0].values[index];
            if incoming.iter().all(|path| path.values[index] == first) {
                values.push(first);
                continue;
            }
            let mut inputs: SmallVec<[NodeId; 8]> = SmallVec::from_slice(&[merge]);
            inputs.extend(incoming.iter().map(|path| path.values[index]));
            values.push(self.graph.add_node().op(Op::Phi).inputs(&inputs).stamp(*stamp).new());
        }
        (merge, 0, values)
    }

    /// Opens a loop that is kept as a loop. Its phis receive the back-edge
    /// values as the loop ends are decoded.
    fn open_loop(
        &mut self,
        scope: usize,
        encoded: &EncodedGraph,
        id: OrderId,
        incoming: Vec<Incoming>,
    ) {
        let begin = self.graph.add(Op::LoopBegin { explode: false }, &[]);
        for path in &incoming {
            let end = self.graph.add(Op::End, &[]);
            self.graph.set_successor(path.pred, path.slot, Some(end));
            self.graph.push_input(begin, end);
        }
        self.loops[scope].set_created(id, Some(begin));
        for (index, phi) in encoded.phis(id).iter().enumerate() {
            let mut inputs: SmallVec<[NodeId; 8]> = SmallVec::from_slice(&[begin]);
            inputs.extend(incoming.iter().map(|path| path.values[index]));
            let new = self
                .graph
                .add_node()
                .op(Op::Phi)
                .inputs(&inputs)
                .stamp(encoded.node(*phi).stamp)
                .new();
            self.loops[scope].set_created(*phi, Some(new));
        }
        if let Some(next) = encoded.node(id).next() {
            self.loops[scope].link(next, begin, 0);
        }
    }
}
