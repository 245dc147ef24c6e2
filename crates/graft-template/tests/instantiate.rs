mod common;

use common::*;
use graft_ir::*;
use graft_template::*;
use graft_test_utils::{Chain, m, simple_state};

#[test]
fn add_at_live_arguments_creates_one_add() {
    let engine = engine();
    let (mut graph, x, y, site) = macro_site(ADD, None);
    let ret = graph.next(site).unwrap();
    let before = graph.len();

    let mut args = args(&engine, ADD);
    args.add("a", x).add("b", y);
    let template = engine.template(&args).unwrap();
    assert_eq!(template.nodes().len(), 1);
    let copies = template.instantiate(&mut graph, site, &args);

    assert_eq!(copies.len(), 1);
    assert_eq!(graph.len(), before + template.nodes().len() - 1);
    assert!(!graph.is_alive(site));
    assert!(graph.node_ids().all(|n| !graph.inputs(n).contains(&site)));
    let value = graph.inputs(ret)[0];
    assert_eq!(graph.op(value), &Op::Binary(BinaryOp::Add));
    assert_eq!(graph.inputs(value), &[x, y]);
    assert_eq!(graph.count(|op| op.is_merge()), 0);
    assert_eq!(graph.next(graph.start()), Some(ret));
    graph.verify().unwrap();
}

#[test]
fn floating_replacee_takes_straight_line_fragment() {
    let engine = engine();
    let mut graph = Graph::new("floating");
    let x = graph.add_node().op(Op::Parameter(0)).stamp(Stamp::int()).new();
    let y = graph.add_node().op(Op::Parameter(1)).stamp(Stamp::int()).new();
    let product = graph.add(Op::Binary(BinaryOp::Mul), &[x, y]);
    let ret = Chain::new(&mut graph).append(Op::Return, &[product]);

    let mut args = args(&engine, ADD);
    args.add("a", x).add("b", y);
    engine.instantiate(&mut graph, product, &args).unwrap();

    let value = graph.inputs(ret)[0];
    assert_eq!(graph.op(value), &Op::Binary(BinaryOp::Add));
    assert!(!graph.is_alive(product));
    graph.verify().unwrap();
}

#[test]
fn multiple_returns_merge_into_one_phi() {
    let engine = engine();
    let (mut graph, x, y, site) = macro_site(MIN, None);
    let ret = graph.next(site).unwrap();

    let mut args = args(&engine, MIN);
    args.add("a", x).add("b", y);
    let template = engine.template(&args).unwrap();
    assert_eq!(template.graph().count(|op| matches!(op, Op::Return)), 1);
    template.instantiate(&mut graph, site, &args);

    let merges = graph.nodes_where(|op| matches!(op, Op::Merge));
    let [merge] = merges[..] else {
        panic!("expected one merge, found {merges:?}");
    };
    assert_eq!(graph.merge_ends(merge).len(), 2);
    let phis = graph.phis(merge);
    assert_eq!(phis.len(), 1);
    assert_eq!(graph.phi_values(phis[0]), &[x, y]);
    assert_eq!(graph.inputs(ret), &[phis[0]]);
    assert_eq!(graph.next(merge), Some(ret));
    graph.verify().unwrap();
}

#[test]
fn constant_parameter_is_folded_into_the_fragment() {
    let engine = engine();
    let (mut graph, x, _, site) = macro_site(ADD_CONST, None);
    let ret = graph.next(site).unwrap();

    let mut args = args(&engine, ADD_CONST);
    args.add("x", x).add_const("k", Constant::Int(5));
    let template = engine.template(&args).unwrap();
    insta::assert_snapshot!(template.graph().to_string(), @r"
    graph add_const {
      n0 = Start -> [n4]
      n1 = Parameter(0) : int
      n3 = Add(n1, n5) : int
      n4 = Return(n3)
      n5 = Constant(5) : int[5]
    }
    ");

    template.instantiate(&mut graph, site, &args);
    let value = graph.inputs(ret)[0];
    assert_eq!(graph.inputs(value)[0], x);
    let k = graph.inputs(value)[1];
    assert_eq!(graph.as_constant(k), Some(&Constant::Int(5)));
}

#[test]
fn identity_constant_returns_the_argument_itself() {
    let engine = engine();
    let (mut graph, x, _, site) = macro_site(ADD_CONST, None);
    let ret = graph.next(site).unwrap();
    let before = graph.len();

    let mut args = args(&engine, ADD_CONST);
    args.add("x", x).add_const("k", Constant::Int(0));
    let template = engine.template(&args).unwrap();
    assert!(template.nodes().is_empty());
    template.instantiate(&mut graph, site, &args);

    assert_eq!(graph.inputs(ret), &[x]);
    assert_eq!(graph.len(), before - 1);
}

#[test]
fn varargs_are_bound_per_element() {
    let engine = engine();
    let mut graph = Graph::for_method(m(1), "varargs");
    let values: Vec<NodeId> = (0..3)
        .map(|i| graph.add_node().op(Op::Parameter(i)).stamp(Stamp::int()).new())
        .collect();
    let site = graph
        .add_node()
        .op(Op::Macro {
            target: SUM,
            kills: None,
        })
        .inputs(&values)
        .stamp(Stamp::int())
        .new();
    let mut chain = Chain::new(&mut graph);
    chain.link(site);
    let ret = chain.append(Op::Return, &[site]);
    let before = graph.len();

    let mut args = args(&engine, SUM);
    args.add_varargs("values", &values);
    let template = engine.template(&args).unwrap();
    assert_eq!(template.graph().count(|op| op.is_fixed()), 2);
    assert_eq!(template.nodes().len(), 4);
    template.instantiate(&mut graph, site, &args);

    assert_eq!(graph.len(), before + 3);
    assert_eq!(graph.count(|op| matches!(op, Op::Binary(BinaryOp::Add))), 3);
    let total = graph.inputs(ret)[0];
    assert_eq!(graph.inputs(total)[1], values[2]);
    graph.verify().unwrap();
}

fn store_site(kills: Kills) -> (Graph, NodeId, NodeId, NodeId, NodeId) {
    let mut graph = Graph::for_method(m(1), "store_site");
    let object = graph.add_node().op(Op::Parameter(0)).stamp(Stamp::object()).new();
    let value = graph.add_node().op(Op::Parameter(1)).stamp(Stamp::int()).new();
    let state = simple_state(&mut graph, m(1), 7, &[object, value], &[]);
    let site = graph
        .add_node()
        .op(Op::Macro {
            target: STORE,
            kills: Some(kills),
        })
        .inputs(&[object, value])
        .state_after(state)
        .new();
    let read = graph
        .add_node()
        .op(Op::Read { location: FIELD })
        .inputs(&[object])
        .memory(site)
        .new();
    let mut chain = Chain::new(&mut graph);
    chain.link(site);
    chain.link(read);
    chain.append(Op::Return, &[read]);
    (graph, object, value, site, read)
}

#[test]
fn side_effects_take_the_replacee_state() {
    let engine = engine();
    let (mut graph, object, value, site, read) = store_site(Kills::Single(FIELD));
    let state = graph.node(site).state_after().unwrap();

    let mut args = args(&engine, STORE);
    args.add("object", object).add("value", value);
    let template = engine.template(&args).unwrap();
    assert_eq!(template.side_effect_nodes().len(), 1);
    template.instantiate(&mut graph, site, &args);

    let writes = graph.nodes_where(|op| matches!(op, Op::Write { .. }));
    let [write] = writes[..] else {
        panic!("expected one write, found {writes:?}");
    };
    assert_eq!(graph.node(write).state_after(), Some(state));
    assert_eq!(graph.node(write).memory(), Some(graph.start()));
    assert_eq!(graph.node(read).memory(), Some(write));
    assert_eq!(graph.next(write), Some(read));
    assert_eq!(
        graph.count(|op| op.frame_state().is_some_and(FrameStateData::is_invalid)),
        0
    );
    graph.verify().unwrap();
}

#[test]
fn instantiation_adds_exactly_the_recorded_nodes() {
    let engine = engine();
    let (mut graph, object, value, site, _) = store_site(Kills::Single(FIELD));
    let before = graph.len();

    let mut args = args(&engine, STORE);
    args.add("object", object).add("value", value);
    let template = engine.template(&args).unwrap();
    let copies = template.instantiate(&mut graph, site, &args);

    assert_eq!(copies.len(), template.nodes().len());
    assert_eq!(graph.len(), before - 1 + template.nodes().len());
}

#[test]
fn side_effecting_foreign_call_gets_both_states() {
    let engine = engine();
    let (mut graph, x, site) = log_site(true);
    let after = graph.node(site).state_after().unwrap();

    let mut args = args(&engine, LOG);
    args.add("value", x);
    let template = engine.template(&args).unwrap();
    assert_eq!(template.side_effect_nodes().len(), 1);
    assert_eq!(template.deopt_nodes().count(), 1);
    template.instantiate(&mut graph, site, &args);

    let call = graph.next(graph.start()).unwrap();
    assert!(matches!(graph.op(call), Op::ForeignCall { target: PRINT, .. }));
    assert_eq!(graph.node(call).state_after(), Some(after));

    let during = graph.node(call).state_during().unwrap();
    assert_ne!(during, after);
    let data = graph.op(during).frame_state().unwrap();
    assert!(data.during_call);
    assert_eq!((data.bci, data.locals, data.stack), (7, 1, 0));
    assert_eq!(graph.inputs(during), &[x]);
    assert_eq!(
        graph.count(|op| op.frame_state().is_some_and(FrameStateData::is_invalid)),
        0
    );
    graph.verify().unwrap();
}

#[test]
fn side_effects_without_a_replacee_state_stay_stateless() {
    let engine = engine();
    let (mut graph, x, site) = log_site(false);
    let before = graph.len();

    let mut args = args(&engine, LOG);
    args.add("value", x);
    let template = engine.template(&args).unwrap();
    template.instantiate(&mut graph, site, &args);

    let call = graph.next(graph.start()).unwrap();
    let info = graph.node(call);
    assert_eq!((info.state_after(), info.state_during()), (None, None));
    assert_eq!(graph.count(|op| op.frame_state().is_some()), 0);
    assert_eq!(graph.len(), before - 1 + template.nodes().len());
    graph.verify().unwrap();
}

#[test]
fn placeholder_stamps_come_from_the_replacee() {
    let engine = engine();
    let mut graph = Graph::for_method(m(1), "load_site");
    let object = graph.add_node().op(Op::Parameter(0)).stamp(Stamp::object()).new();
    let site = graph
        .add_node()
        .op(Op::Macro {
            target: LOAD,
            kills: None,
        })
        .inputs(&[object])
        .stamp(Stamp::int_range(0, 9))
        .new();
    let mut chain = Chain::new(&mut graph);
    chain.link(site);
    let ret = chain.append(Op::Return, &[site]);

    let mut args = args(&engine, LOAD);
    args.add("object", object);
    let template = engine.template(&args).unwrap();
    assert_eq!(template.stamp_nodes().len(), 1);
    template.instantiate(&mut graph, site, &args);

    let read = graph.inputs(ret)[0];
    assert!(matches!(graph.op(read), Op::Read { .. }));
    assert_eq!(graph.stamp(read), &Stamp::int_range(0, 9));
    assert_eq!(graph.node(read).memory(), Some(graph.start()));
    graph.verify().unwrap();
}

#[test]
#[should_panic(expected = "multi-location kills")]
fn multi_location_kill_replacee_panics() {
    let engine = engine();
    let kills: Kills = [FIELD, LocationIdentity::Named(3)].into_iter().collect();
    let (mut graph, object, value, site, _) = store_site(kills);
    let mut args = args(&engine, STORE);
    args.add("object", object).add("value", value);
    engine.instantiate(&mut graph, site, &args).unwrap();
}

#[test]
fn undeclared_kill_only_warns() {
    let engine = engine();
    let (mut graph, object, value, site, read) = store_site(Kills::Single(LocationIdentity::Init));
    let mut args = args(&engine, STORE);
    args.add("object", object).add("value", value);
    engine.instantiate(&mut graph, site, &args).unwrap();
    assert!(!graph.is_alive(site));
    assert!(graph.node(read).memory().is_some());
}

#[test]
#[should_panic(expected = "returns no value")]
fn valueless_fragment_rejects_used_replacee() {
    let engine = engine();
    let (mut graph, x, y, site) = macro_site(STORE, Some(Kills::Single(FIELD)));
    let mut args = args(&engine, STORE);
    args.add("object", x).add("value", y);
    engine.instantiate(&mut graph, site, &args).unwrap();
}

#[test]
fn deopt_resumes_from_the_replacee_state() {
    let engine = engine();
    let mut graph = Graph::for_method(m(1), "checked_site");
    let object = graph.add_node().op(Op::Parameter(0)).stamp(Stamp::object()).new();
    let state = simple_state(&mut graph, m(1), 2, &[object], &[]);
    let site = graph
        .add_node()
        .op(Op::Macro {
            target: CHECKED,
            kills: None,
        })
        .inputs(&[object])
        .state_after(state)
        .new();
    let mut chain = Chain::new(&mut graph);
    chain.link(site);
    let ret = chain.append(Op::Return, &[site]);

    let mut args = args(&engine, CHECKED);
    args.add("object", object);
    let template = engine.template(&args).unwrap();
    assert_eq!(template.deopt_nodes().count(), 1);
    template.instantiate(&mut graph, site, &args);

    let guard = graph.next(graph.start()).unwrap();
    assert!(matches!(graph.op(guard), Op::FixedGuard { .. }));
    assert_eq!(graph.node(guard).state_before(), Some(state));
    assert_eq!(graph.next(guard), Some(ret));
    assert_eq!(graph.inputs(ret), &[object]);
    graph.verify().unwrap();
}

#[test]
fn fragment_without_return_kills_the_continuation() {
    let engine = engine();
    let mut graph = Graph::for_method(m(1), "dead_end");
    let site = graph
        .add_node()
        .op(Op::Macro {
            target: UNREACHABLE,
            kills: None,
        })
        .new();
    let mut chain = Chain::new(&mut graph);
    chain.link(site);
    chain.append(Op::Return, &[]);

    let args = args(&engine, UNREACHABLE);
    engine.instantiate(&mut graph, site, &args).unwrap();

    let next = graph.next(graph.start()).unwrap();
    assert!(matches!(graph.op(next), Op::Deoptimize { .. }));
    assert_eq!(graph.count(|op| matches!(op, Op::Return)), 0);
    graph.verify().unwrap();
}
