#![allow(dead_code)]

use std::sync::Arc;

use graft_ir::*;
use graft_template::*;
use graft_test_utils::{Chain, m};

pub const ADD: MethodId = MethodId(100);
pub const ADD_CONST: MethodId = MethodId(101);
pub const MIN: MethodId = MethodId(102);
pub const SUM: MethodId = MethodId(103);
pub const STORE: MethodId = MethodId(104);
pub const CHECKED: MethodId = MethodId(105);
pub const UNREACHABLE: MethodId = MethodId(106);
pub const LOG: MethodId = MethodId(107);
pub const LOAD: MethodId = MethodId(108);

/// Target of the foreign call in [`log`].
pub const PRINT: MethodId = MethodId(200);

pub const FIELD: LocationIdentity = LocationIdentity::Field(FieldId(1));

fn int_param(graph: &mut Graph, index: u32) -> NodeId {
    graph.add_node().op(Op::Parameter(index)).stamp(Stamp::int()).new()
}

/// `add(a, b) = a + b`
pub fn add() -> TemplateMethod {
    let mut body = Graph::for_method(ADD, "add");
    let a = int_param(&mut body, 0);
    let b = int_param(&mut body, 1);
    let sum = body.add(Op::Binary(BinaryOp::Add), &[a, b]);
    Chain::new(&mut body).append(Op::Return, &[sum]);
    TemplateMethod::builder()
        .id(ADD)
        .name("add")
        .params(vec![
            TemplateParam::ordinary("a", Stamp::int()),
            TemplateParam::ordinary("b", Stamp::int()),
        ])
        .body(body)
        .build()
}

/// `add_const(x, const k) = x + k`
pub fn add_const() -> TemplateMethod {
    let mut body = Graph::for_method(ADD_CONST, "add_const");
    let x = int_param(&mut body, 0);
    let k = int_param(&mut body, 1);
    let sum = body.add(Op::Binary(BinaryOp::Add), &[x, k]);
    Chain::new(&mut body).append(Op::Return, &[sum]);
    TemplateMethod::builder()
        .id(ADD_CONST)
        .name("add_const")
        .params(vec![
            TemplateParam::ordinary("x", Stamp::int()),
            TemplateParam::constant("k"),
        ])
        .body(body)
        .build()
}

/// `min(a, b) = if a < b { return a } else { return b }`
pub fn min() -> TemplateMethod {
    let mut body = Graph::for_method(MIN, "min");
    let a = int_param(&mut body, 0);
    let b = int_param(&mut body, 1);
    let less = body.add(Op::Compare(Condition::Lt), &[a, b]);
    let branch = Chain::new(&mut body).append(Op::If, &[less]);
    let then = Chain::after(&mut body, branch, 0).append(Op::Begin, &[]);
    Chain::after(&mut body, then, 0).append(Op::Return, &[a]);
    let otherwise = Chain::after(&mut body, branch, 1).append(Op::Begin, &[]);
    Chain::after(&mut body, otherwise, 0).append(Op::Return, &[b]);
    TemplateMethod::builder()
        .id(MIN)
        .name("min")
        .params(vec![
            TemplateParam::ordinary("a", Stamp::int()),
            TemplateParam::ordinary("b", Stamp::int()),
        ])
        .body(body)
        .build()
}

/// `sum(varargs values) = { s = 0; for i in 0..values.len() { s += values[i] }; s }`
/// with the loop marked for explosion.
pub fn sum() -> TemplateMethod {
    let mut body = Graph::for_method(SUM, "sum");
    let values = body.add(Op::Parameter(0), &[]);
    let zero = body.constant(Constant::Int(0));
    let one = body.constant(Constant::Int(1));
    let length = body.add(Op::ArrayLength, &[values]);
    let entry = Chain::new(&mut body).append(Op::End, &[]);

    let begin = body.add(Op::LoopBegin { explode: true }, &[entry]);
    let i = body.add(Op::Phi, &[begin, zero]);
    let s = body.add(Op::Phi, &[begin, zero]);
    let cond = body.add(Op::Compare(Condition::Lt), &[i, length]);
    let branch = body.add(Op::If, &[cond]);
    body.set_next(begin, Some(branch));
    let inside = body.add(Op::Begin, &[]);
    let exit = body.add(Op::LoopExit, &[begin]);
    body.set_successor(branch, 0, Some(inside));
    body.set_successor(branch, 1, Some(exit));

    let element = body.add(Op::LoadIndexed, &[values, i]);
    let next_s = body.add(Op::Binary(BinaryOp::Add), &[s, element]);
    let next_i = body.add(Op::Binary(BinaryOp::Add), &[i, one]);
    let back = body.add(Op::LoopEnd, &[]);
    body.set_next(inside, Some(back));
    body.push_input(begin, back);
    body.push_input(i, next_i);
    body.push_input(s, next_s);

    let result = body.add(Op::ValueProxy, &[exit, s]);
    let ret = body.add(Op::Return, &[result]);
    body.set_next(exit, Some(ret));

    TemplateMethod::builder()
        .id(SUM)
        .name("sum")
        .params(vec![TemplateParam::varargs("values", Stamp::int())])
        .body(body)
        .build()
}

/// `store(object, value) { object.f = value }`
pub fn store() -> TemplateMethod {
    let mut body = Graph::for_method(STORE, "store");
    let object = body.add_node().op(Op::Parameter(0)).stamp(Stamp::object()).new();
    let value = int_param(&mut body, 1);
    let state = body.add_frame_state(FrameStateData::new(STORE, 4, 2, 0), &[object, value], None);
    let start = body.start();
    let write = body
        .add_node()
        .op(Op::Write { location: FIELD })
        .inputs(&[object, value])
        .memory(start)
        .state_after(state)
        .new();
    let mut chain = Chain::new(&mut body);
    chain.link(write);
    chain.append(Op::Return, &[]);
    TemplateMethod::builder()
        .id(STORE)
        .name("store")
        .params(vec![
            TemplateParam::ordinary("object", Stamp::object()),
            TemplateParam::ordinary("value", Stamp::int()),
        ])
        .body(body)
        .build()
}

/// `checked(object) { if object == null { deoptimize }; return object }`
pub fn checked() -> TemplateMethod {
    let mut body = Graph::for_method(CHECKED, "checked");
    let object = body.add_node().op(Op::Parameter(0)).stamp(Stamp::object()).new();
    let state = body.add_frame_state(FrameStateData::new(CHECKED, 0, 1, 0), &[object], None);
    let is_null = body.add(Op::IsNull, &[object]);
    let guard = body
        .add_node()
        .op(Op::FixedGuard {
            reason: DeoptReason::NullCheck,
            negated: true,
        })
        .inputs(&[is_null])
        .state_before(state)
        .new();
    let mut chain = Chain::new(&mut body);
    chain.link(guard);
    chain.append(Op::Return, &[object]);
    TemplateMethod::builder()
        .id(CHECKED)
        .name("checked")
        .params(vec![TemplateParam::ordinary("object", Stamp::object())])
        .body(body)
        .build()
}

/// `unreachable() { deoptimize }`
pub fn unreachable() -> TemplateMethod {
    let mut body = Graph::for_method(UNREACHABLE, "unreachable");
    Chain::new(&mut body).append(
        Op::Deoptimize {
            reason: DeoptReason::Unreached,
        },
        &[],
    );
    TemplateMethod::builder()
        .id(UNREACHABLE)
        .name("unreachable")
        .params(Vec::new())
        .body(body)
        .build()
}

/// `log(value) { print(value) }` where `print` is a side-effecting foreign
/// call that resumes from the state during the call.
pub fn log() -> TemplateMethod {
    let mut body = Graph::for_method(LOG, "log");
    let value = int_param(&mut body, 0);
    let state = body.add_frame_state(FrameStateData::new(LOG, 3, 1, 0), &[value], None);
    let call = body
        .add_node()
        .op(Op::ForeignCall {
            target: PRINT,
            kills: None,
            side_effect: true,
        })
        .inputs(&[value])
        .stamp(Stamp::Void)
        .state_after(state)
        .new();
    let mut chain = Chain::new(&mut body);
    chain.link(call);
    chain.append(Op::Return, &[]);
    TemplateMethod::builder()
        .id(LOG)
        .name("log")
        .params(vec![TemplateParam::ordinary("value", Stamp::int())])
        .body(body)
        .build()
}

/// `load(object) = object.f`, typed by whatever the call site knows.
pub fn load() -> TemplateMethod {
    let mut body = Graph::for_method(LOAD, "load");
    let object = body.add_node().op(Op::Parameter(0)).stamp(Stamp::object()).new();
    let start = body.start();
    let read = body
        .add_node()
        .op(Op::Read { location: FIELD })
        .inputs(&[object])
        .memory(start)
        .stamp(Stamp::Placeholder)
        .new();
    let mut chain = Chain::new(&mut body);
    chain.link(read);
    chain.append(Op::Return, &[read]);
    TemplateMethod::builder()
        .id(LOAD)
        .name("load")
        .params(vec![TemplateParam::ordinary("object", Stamp::object())])
        .body(body)
        .build()
}

pub fn registry() -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();
    for method in [
        add(),
        add_const(),
        min(),
        sum(),
        store(),
        checked(),
        unreachable(),
        log(),
        load(),
    ] {
        registry.register(method);
    }
    registry
}

pub fn engine() -> TemplateEngine {
    TemplateEngine::builder().registry(registry()).build()
}

pub fn args(engine: &TemplateEngine, method: MethodId) -> Arguments {
    engine
        .arguments(method, GuardsStage::FloatingGuards, LoweringStage::High)
        .unwrap()
}

/// A graph `f(x, y) = macro(x, y)` where the macro node stands for
/// `method`. Returns the graph, the parameters and the macro node.
pub fn macro_site(method: MethodId, kills: Option<Kills>) -> (Graph, NodeId, NodeId, NodeId) {
    let mut graph = Graph::for_method(m(1), "site");
    let x = int_param(&mut graph, 0);
    let y = int_param(&mut graph, 1);
    let site = graph
        .add_node()
        .op(Op::Macro {
            target: method,
            kills,
        })
        .inputs(&[x, y])
        .stamp(Stamp::int())
        .new();
    let mut chain = Chain::new(&mut graph);
    chain.link(site);
    chain.append(Op::Return, &[site]);
    (graph, x, y, site)
}

/// `f(x) { log(x) }` with the macro for `log` as the only fixed node.
/// Returns the graph, the parameter and the macro node.
pub fn log_site(state_after: bool) -> (Graph, NodeId, NodeId) {
    let mut graph = Graph::for_method(m(1), "log_site");
    let x = int_param(&mut graph, 0);
    let state = state_after.then(|| {
        let state = FrameStateData::new(m(1), 7, 1, 0);
        graph.add_frame_state(state, &[x], None)
    });
    let site = graph
        .add_node()
        .op(Op::Macro {
            target: LOG,
            kills: None,
        })
        .inputs(&[x])
        .stamp(Stamp::Void)
        .maybe_state_after(state)
        .new();
    let mut chain = Chain::new(&mut graph);
    chain.link(site);
    chain.append(Op::Return, &[]);
    (graph, x, site)
}

pub fn shared(method: TemplateMethod) -> Arc<TemplateMethod> {
    Arc::new(method)
}
