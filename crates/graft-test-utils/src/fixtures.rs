//! Small method bodies shared by several test suites.

use graft_ir::{
    BinaryOp, Condition, Constant, FrameStateData, Graph, InvokeKind, MethodId, NodeId, Op, Stamp,
};

use crate::chain::Chain;

/// `return value`
pub fn return_constant(method: MethodId, name: &str, value: i64) -> Graph {
    let mut graph = Graph::for_method(method, name);
    let c = graph.constant(Constant::Int(value));
    Chain::new(&mut graph).append(Op::Return, &[c]);
    graph
}

/// `return p0 + p1` over two int parameters.
pub fn add_parameters(method: MethodId, name: &str) -> Graph {
    let mut graph = Graph::for_method(method, name);
    let a = graph.add_node().op(Op::Parameter(0)).stamp(Stamp::int()).new();
    let b = graph.add_node().op(Op::Parameter(1)).stamp(Stamp::int()).new();
    let sum = graph.add(Op::Binary(BinaryOp::Add), &[a, b]);
    Chain::new(&mut graph).append(Op::Return, &[sum]);
    graph
}

/// A frame state of `method` at `bci` with the given locals and stack.
pub fn simple_state(
    graph: &mut Graph,
    method: MethodId,
    bci: i32,
    locals: &[NodeId],
    stack: &[NodeId],
) -> NodeId {
    let data = FrameStateData::new(method, bci, locals.len() as u16, stack.len() as u16);
    let values: Vec<NodeId> = locals.iter().chain(stack).copied().collect();
    graph.add_frame_state(data, &values, None)
}

/// Appends `invoke callee(args)` and `return <result>`. The invoke gets a
/// state after holding `args` as locals and the result on the stack.
/// Returns the invoke and the return node.
pub fn call_and_return(
    graph: &mut Graph,
    callee: MethodId,
    kind: InvokeKind,
    args: &[NodeId],
    bci: i32,
) -> (NodeId, NodeId) {
    let method = graph.method().unwrap_or(MethodId(u32::MAX));
    let target = graph.add(
        Op::CallTarget {
            method: callee,
            kind,
        },
        args,
    );
    let invoke = graph.add(
        Op::Invoke {
            bci,
            with_exception: false,
        },
        &[target],
    );
    let state = simple_state(graph, method, bci + 1, args, &[invoke]);
    graph.set_state_after(invoke, Some(state));
    let mut chain = Chain::new(graph);
    chain.link(invoke);
    let ret = chain.append(Op::Return, &[invoke]);
    (invoke, ret)
}

/// Nodes of the loop built by [`counted_loop`].
#[derive(Clone, Copy, Debug)]
pub struct CountedLoop {
    pub begin: NodeId,
    pub exit: NodeId,
    pub result: NodeId,
    pub ret: NodeId,
}

/// Appends `s = 0; i = 0; while i < n { s += i; i += 1 }; return s`.
pub fn counted_loop(chain: &mut Chain<'_>, n: NodeId, explode: bool) -> CountedLoop {
    let zero = chain.graph.constant(Constant::Int(0));
    let one = chain.graph.constant(Constant::Int(1));
    let entry = chain.append(Op::End, &[]);

    let graph = &mut *chain.graph;
    let begin = graph.add(Op::LoopBegin { explode }, &[entry]);
    let i = graph.add(Op::Phi, &[begin, zero]);
    let s = graph.add(Op::Phi, &[begin, zero]);
    graph.set_stamp(i, Stamp::int());
    graph.set_stamp(s, Stamp::int());
    let cond = graph.add(Op::Compare(Condition::Lt), &[i, n]);
    let branch = graph.add(Op::If, &[cond]);
    graph.set_next(begin, Some(branch));

    let body = graph.add(Op::Begin, &[]);
    let exit = graph.add(Op::LoopExit, &[begin]);
    graph.set_successor(branch, 0, Some(body));
    graph.set_successor(branch, 1, Some(exit));

    let next_s = graph.add(Op::Binary(BinaryOp::Add), &[s, i]);
    let next_i = graph.add(Op::Binary(BinaryOp::Add), &[i, one]);
    let back = graph.add(Op::LoopEnd, &[]);
    graph.set_next(body, Some(back));
    graph.push_input(begin, back);
    graph.push_input(i, next_i);
    graph.push_input(s, next_s);

    let result = graph.add(Op::ValueProxy, &[exit, s]);
    let ret = graph.add(Op::Return, &[result]);
    graph.set_next(exit, Some(ret));

    CountedLoop {
        begin,
        exit,
        result,
        ret,
    }
}
