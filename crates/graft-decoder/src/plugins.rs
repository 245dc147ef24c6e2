//! Extension points consulted while decoding calls and loops.

use graft_ir::canonical::{Simplified, simplify_floating};
use graft_ir::{Constant, Graph, MethodId, NodeId, Op};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::site::CallSite;

/// Inlining decision for one call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InlineInfo {
    DoNotInline,
    Inline,
    /// Inline the graph of another method in place of the callee.
    InlineWithReplacement(MethodId),
}

/// Decides which calls are inlined.
///
/// Plugins are asked in order; the first one with an opinion decides.
pub trait InlineInvokePlugin: Send + Sync {
    fn should_inline(&self, site: &CallSite) -> Option<InlineInfo>;

    fn notify_before_inline(&self, _method: MethodId) {}

    /// Runs once every node of the inlined method has been decoded.
    fn notify_after_inline(&self, _method: MethodId) {}

    fn notify_not_inlined(&self, _site: &CallSite) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExplosionKind {
    None,
    /// Unroll every loop of the method completely.
    Full,
    /// Like [`LoopExplosionKind::Full`] with a lower iteration bound.
    Bounded(usize),
}

/// Chooses how the loops of a method are decoded.
pub trait LoopExplosionPlugin: Send + Sync {
    fn explosion_kind(&self, method: MethodId) -> LoopExplosionKind;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// The call uses a construct the compiler cannot handle; the whole
    /// compilation bails out.
    #[error("{0}")]
    Unsupported(String),
}

/// Replaces a call by nodes built directly in the target graph.
pub trait InvocationPlugin: Send + Sync {
    /// Returns `Ok(false)` to leave the call alone. Every node added before
    /// that, or before an error, is rolled back.
    fn apply(&self, cx: &mut PluginContext<'_>) -> Result<bool, PluginError>;
}

/// Invocation plugins keyed by the method they expand.
#[derive(Default)]
pub struct InvocationPlugins {
    plugins: FxHashMap<MethodId, Box<dyn InvocationPlugin>>,
}

impl InvocationPlugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        method: MethodId,
        plugin: impl InvocationPlugin + 'static,
    ) -> &mut Self {
        self.plugins.insert(method, Box::new(plugin));
        self
    }

    pub fn get(&self, method: MethodId) -> Option<&dyn InvocationPlugin> {
        self.plugins.get(&method).map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// The view of the target graph an [`InvocationPlugin`] works through.
///
/// Fixed nodes are appended in order where the call used to be; the value
/// pushed with [`PluginContext::push_result`] replaces the call's result.
pub struct PluginContext<'g> {
    graph: &'g mut Graph,
    site: &'g CallSite,
    tail: NodeId,
    slot: usize,
    result: Option<NodeId>,
    appended: SmallVec<[NodeId; 4]>,
}

impl<'g> PluginContext<'g> {
    pub(crate) fn new(
        graph: &'g mut Graph,
        site: &'g CallSite,
        tail: NodeId,
        slot: usize,
    ) -> Self {
        Self {
            graph,
            site,
            tail,
            slot,
            result: None,
            appended: SmallVec::new(),
        }
    }

    pub fn site(&self) -> &CallSite {
        self.site
    }

    pub fn argument(&self, index: usize) -> NodeId {
        *self.site.arguments.get(index).unwrap_or_else(|| {
            panic!(
                "call to {} has {} arguments, asked for {index}",
                self.site.method,
                self.site.arguments.len()
            )
        })
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// Adds a floating node, folding it when its inputs allow.
    pub fn add(&mut self, op: Op, inputs: &[NodeId]) -> NodeId {
        assert!(op.is_floating(), "{op:?} is fixed, use `append`");
        match simplify_floating(self.graph, &op, inputs) {
            Some(Simplified::Constant(value)) => self.graph.constant(value),
            Some(Simplified::Node(node)) => node,
            None => self.graph.add(op, inputs),
        }
    }

    pub fn constant(&mut self, value: Constant) -> NodeId {
        self.graph.constant(value)
    }

    /// Adds a fixed node after the previously appended one.
    pub fn append(&mut self, op: Op, inputs: &[NodeId]) -> NodeId {
        assert!(
            op.successor_count() == 1,
            "{op:?} cannot be appended to a straight-line expansion"
        );
        let node = self.graph.add(op, inputs);
        self.graph.set_successor(self.tail, self.slot, Some(node));
        self.tail = node;
        self.slot = 0;
        self.appended.push(node);
        node
    }

    pub fn push_result(&mut self, value: NodeId) {
        self.result = Some(value);
    }

    pub fn result(&self) -> Option<NodeId> {
        self.result
    }

    pub(crate) fn finish(self) -> Expansion {
        Expansion {
            tail: self.tail,
            slot: self.slot,
            result: self.result,
            appended: self.appended,
        }
    }
}

pub(crate) struct Expansion {
    pub tail: NodeId,
    pub slot: usize,
    pub result: Option<NodeId>,
    pub appended: SmallVec<[NodeId; 4]>,
}
