mod common;

use common::*;
use graft_ir::*;
use graft_template::*;
use graft_test_utils::{Chain, m};

fn lowerer(engine: &TemplateEngine) -> TemplateLowerer<'_> {
    TemplateLowerer::new(engine, GuardsStage::FloatingGuards, LoweringStage::High)
}

#[test]
fn macro_inputs_bind_positionally() {
    let engine = engine();
    let (mut graph, x, y, site) = macro_site(ADD, None);
    let ret = graph.next(site).unwrap();

    assert_eq!(lowerer(&engine).lower_all(&mut graph).unwrap(), 1);

    let value = graph.inputs(ret)[0];
    assert_eq!(graph.inputs(value), &[x, y]);
    assert_eq!(graph.count(|op| matches!(op, Op::Macro { .. })), 0);
    graph.verify().unwrap();
}

#[test]
fn constant_inputs_feed_constant_parameters() {
    let engine = engine();
    let mut graph = Graph::for_method(m(1), "site");
    let x = graph.add_node().op(Op::Parameter(0)).stamp(Stamp::int()).new();
    let three = graph.constant(Constant::Int(3));
    let site = graph
        .add_node()
        .op(Op::Macro {
            target: ADD_CONST,
            kills: None,
        })
        .inputs(&[x, three])
        .new();
    let mut chain = Chain::new(&mut graph);
    chain.link(site);
    let ret = chain.append(Op::Return, &[site]);

    lowerer(&engine).lower_all(&mut graph).unwrap();

    let value = graph.inputs(ret)[0];
    assert_eq!(graph.inputs(value)[0], x);
    assert_eq!(
        graph.as_constant(graph.inputs(value)[1]),
        Some(&Constant::Int(3))
    );
    assert!(!graph.is_alive(three));
}

struct Keep;

impl NodeLowering for Keep {
    fn arguments(
        &self,
        _: &TemplateEngine,
        _: &mut Graph,
        _: NodeId,
    ) -> Result<Option<Arguments>, TemplateError> {
        Ok(None)
    }
}

#[test]
fn custom_lowering_can_keep_a_node() {
    let engine = engine();
    let (mut graph, _, _, site) = macro_site(ADD, None);

    let lowered = lowerer(&engine)
        .with_lowering(ADD, Keep)
        .lower_all(&mut graph)
        .unwrap();

    assert_eq!(lowered, 0);
    assert!(graph.is_alive(site));
}

#[test]
fn unknown_macro_target_is_an_error() {
    let engine = engine();
    let (mut graph, _, _, _) = macro_site(MethodId(77), None);
    let err = lowerer(&engine).lower_all(&mut graph).unwrap_err();
    assert!(matches!(err, TemplateError::UnknownTemplate(MethodId(77))));
}
