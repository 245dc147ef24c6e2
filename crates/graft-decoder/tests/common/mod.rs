#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use graft_decoder::*;
use graft_ir::*;
use graft_test_utils::{Chain, MethodGraphs, TestMeta, counted_loop, simple_state};

pub const ROOT: MethodId = MethodId(1);
pub const CALLEE: MethodId = MethodId(2);
pub const OTHER: MethodId = MethodId(3);

pub const FIELD: LocationIdentity = LocationIdentity::Field(FieldId(1));

pub fn int_param(graph: &mut Graph, index: u32) -> NodeId {
    graph.add_node().op(Op::Parameter(index)).stamp(Stamp::int()).new()
}

/// Graphs plus the cache built over them. The provider handle counts
/// builds.
pub fn cache(graphs: impl IntoIterator<Item = Graph>) -> (Arc<MethodGraphs>, GraphCache) {
    let mut provider = MethodGraphs::default();
    for graph in graphs {
        provider.insert(graph);
    }
    let provider = Arc::new(provider);
    let cache = GraphCache::new(provider.clone());
    (provider, cache)
}

pub fn meta() -> TestMeta {
    let mut meta = TestMeta::default();
    meta.method().id(ROOT).name("root").is_static(true).add();
    meta.method().id(CALLEE).name("callee").is_static(true).add();
    meta.method().id(OTHER).name("other").is_static(true).add();
    meta
}

/// Inlines every call it is asked about.
pub struct AlwaysInline;

impl InlineInvokePlugin for AlwaysInline {
    fn should_inline(&self, _site: &CallSite) -> Option<InlineInfo> {
        Some(InlineInfo::Inline)
    }
}

/// Inlines everything except the listed methods, recording notifications.
#[derive(Default)]
pub struct Recording {
    pub skip: Vec<MethodId>,
    pub events: Mutex<Vec<String>>,
}

impl Recording {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl InlineInvokePlugin for Recording {
    fn should_inline(&self, site: &CallSite) -> Option<InlineInfo> {
        if self.skip.contains(&site.method) {
            Some(InlineInfo::DoNotInline)
        } else {
            Some(InlineInfo::Inline)
        }
    }

    fn notify_before_inline(&self, method: MethodId) {
        self.events.lock().unwrap().push(format!("before {method}"));
    }

    fn notify_after_inline(&self, method: MethodId) {
        self.events.lock().unwrap().push(format!("after {method}"));
    }

    fn notify_not_inlined(&self, site: &CallSite) {
        self.events
            .lock()
            .unwrap()
            .push(format!("not inlined {}", site.method));
    }
}

pub struct Explode(pub LoopExplosionKind);

impl LoopExplosionPlugin for Explode {
    fn explosion_kind(&self, _method: MethodId) -> LoopExplosionKind {
        self.0
    }
}

/// `return callee(args)` where the arguments are root parameters.
pub fn calling(method: MethodId, callee: MethodId, kind: InvokeKind, params: u32) -> Graph {
    let mut graph = Graph::for_method(method, "root");
    let args: Vec<NodeId> = (0..params).map(|i| int_param(&mut graph, i)).collect();
    graft_test_utils::call_and_return(&mut graph, callee, kind, &args, 2);
    graph
}

/// `if p0 < 10 { return 1 } else { return p0 }`
pub fn clamp(method: MethodId) -> Graph {
    let mut graph = Graph::for_method(method, "clamp");
    let p = int_param(&mut graph, 0);
    let ten = graph.constant(Constant::Int(10));
    let one = graph.constant(Constant::Int(1));
    let cond = graph.add(Op::Compare(Condition::Lt), &[p, ten]);
    let branch = Chain::new(&mut graph).append(Op::If, &[cond]);
    {
        let mut taken = Chain::after(&mut graph, branch, 0);
        taken.append(Op::Begin, &[]);
        taken.append(Op::Return, &[one]);
    }
    let mut other = Chain::after(&mut graph, branch, 1);
    other.append(Op::Begin, &[]);
    other.append(Op::Return, &[p]);
    graph
}

/// `throw p0`
pub fn throwing(method: MethodId) -> Graph {
    let mut graph = Graph::for_method(method, "throwing");
    let p = int_param(&mut graph, 0);
    Chain::new(&mut graph).append(Op::Unwind, &[p]);
    graph
}

/// Two field writes with their own frame states, then `return p0`.
pub fn writing(method: MethodId) -> Graph {
    let mut graph = Graph::for_method(method, "writing");
    let p = int_param(&mut graph, 0);
    let mut tail = graph.start();
    for bci in 0..2 {
        let state = simple_state(&mut graph, method, bci + 1, &[p], &[]);
        let write = graph
            .add_node()
            .op(Op::Write { location: FIELD })
            .inputs(&[p, p])
            .state_after(state)
            .new();
        graph.set_next(tail, Some(write));
        tail = write;
    }
    Chain::after(&mut graph, tail, 0).append(Op::Return, &[p]);
    graph
}

/// `s = 0; for i in 0..n { s += i }; return s` with `n` a constant or
/// parameter 0.
pub fn looping(method: MethodId, n: Option<i64>, explode: bool) -> Graph {
    let mut graph = Graph::for_method(method, "loop");
    let n = match n {
        Some(n) => graph.constant(Constant::Int(n)),
        None => int_param(&mut graph, 0),
    };
    counted_loop(&mut Chain::new(&mut graph), n, explode);
    graph
}

/// The single return of `graph` and its value.
pub fn returned(graph: &Graph) -> Option<NodeId> {
    let returns = graph.nodes_where(|op| matches!(op, Op::Return));
    assert_eq!(returns.len(), 1, "expected one return in\n{graph}");
    graph.inputs(returns[0]).first().copied()
}

pub fn returned_constant(graph: &Graph) -> Option<Constant> {
    returned(graph).and_then(|value| graph.as_constant(value).copied())
}
