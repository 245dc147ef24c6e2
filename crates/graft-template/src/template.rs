//! Building a specialized fragment from a template method.

use graft_ir::canonical::canonicalize;
use graft_ir::loops::explode_loops;
use graft_ir::{
    DeoptMode, Graph, Kills, LocationIdentity, LocationSet, MethodId, NodeId, Op, Stamp,
};
use smallvec::SmallVec;

use crate::args::{ArgValue, Arguments, CacheKey};
use crate::error::TemplateError;
use crate::lowering::LoweringProvider;
use crate::method::{ParamMode, TemplateMethod};

/// What instantiation binds a parameter of the fragment to.
#[derive(Clone, Debug)]
pub(crate) enum ParamSlot {
    /// An ordinary parameter; `None` when the fragment does not use it.
    Open(Option<NodeId>),
    /// Folded at build time.
    Folded,
    /// One placeholder per element, `None` for elements the fragment
    /// does not use.
    Varargs(SmallVec<[Option<NodeId>; 4]>),
}

/// A specialized, lowered fragment ready to be instantiated.
#[derive(Debug)]
pub struct Template {
    pub(crate) key: CacheKey,
    pub(crate) name: String,
    pub(crate) graph: Graph,
    pub(crate) params: Vec<ParamSlot>,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) return_node: Option<NodeId>,
    pub(crate) invalid_state: Option<NodeId>,
    pub(crate) side_effect_nodes: Vec<NodeId>,
    pub(crate) deopt_nodes: Vec<(NodeId, DeoptMode)>,
    pub(crate) stamp_nodes: Vec<NodeId>,
    pub(crate) kills: Option<Kills>,
    pub(crate) private_locations: LocationSet,
}

impl Template {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn method(&self) -> MethodId {
        self.key.method
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The specialized fragment.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Nodes copied into the target graph on every instantiation. Parameters,
    /// the start, the return and the invalid state sentinel are not copied.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The single return of the fragment, if it returns at all.
    pub fn return_node(&self) -> Option<NodeId> {
        self.return_node
    }

    /// The value the fragment returns.
    pub fn return_value(&self) -> Option<NodeId> {
        self.return_node
            .and_then(|ret| self.graph.inputs(ret).first().copied())
    }

    pub fn side_effect_nodes(&self) -> &[NodeId] {
        &self.side_effect_nodes
    }

    pub fn deopt_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.deopt_nodes.iter().map(|(node, _)| *node)
    }

    /// Nodes whose stamp is taken from the replacee.
    pub fn stamp_nodes(&self) -> &[NodeId] {
        &self.stamp_nodes
    }

    /// Locations written anywhere in the fragment.
    pub fn kills(&self) -> Option<&Kills> {
        self.kills.as_ref()
    }

    /// The last node of the fragment that may have written `location`
    /// before it returns. `None` means memory is untouched since entry.
    pub fn last_writer(&self, location: LocationIdentity) -> Option<NodeId> {
        let ret = self.return_node?;
        let pred = self.graph.predecessor(ret)?;
        let writer = self.graph.last_writer_before(pred, location);
        (writer != self.graph.start()).then_some(writer)
    }

    /// Specializes `method` for `args`, starting from its prepared body.
    pub fn build(
        method: &TemplateMethod,
        prepared: &Graph,
        args: &Arguments,
        lowering: &dyn LoweringProvider,
    ) -> Result<Self, TemplateError> {
        args.assert_complete();
        let key = args.cache_key();
        let mut graph = prepared.clone();

        let mut params = Vec::with_capacity(method.params.len());
        for (index, (param, value)) in method.params.iter().zip(args.values()).enumerate() {
            let node = graph.parameter(index as u32);
            let slot = match (param.mode, value) {
                (ParamMode::Constant, ArgValue::Value(value)) => {
                    if let Some(node) = node {
                        let constant = graph.constant(*value);
                        if graph.has_usages(node) {
                            graph.replace_at_usages(node, constant);
                        }
                        graph.safe_delete(node);
                    }
                    ParamSlot::Folded
                }
                (ParamMode::Varargs, ArgValue::Varargs(values)) => {
                    let placeholders: SmallVec<[NodeId; 4]> = (0..values.len())
                        .map(|slot| {
                            graph
                                .add_node()
                                .op(Op::Placeholder {
                                    param: index as u32,
                                    slot: slot as u32,
                                })
                                .stamp(param.stamp)
                                .new()
                        })
                        .collect();
                    let array = graph.add(
                        Op::VarargsArray {
                            length: values.len() as u32,
                        },
                        &placeholders,
                    );
                    if let Some(node) = node {
                        if graph.has_usages(node) {
                            graph.replace_at_usages(node, array);
                        }
                        graph.safe_delete(node);
                    }
                    ParamSlot::Varargs(placeholders.into_iter().map(Some).collect())
                }
                _ => {
                    if let Some(node) = node {
                        graph.set_stamp(node, param.stamp);
                    }
                    ParamSlot::Open(node)
                }
            };
            params.push(slot);
        }

        canonicalize(&mut graph);
        let exploded = explode_loops(&mut graph);
        lowering.lower(method.id, &mut graph, args.lowering())?;
        canonicalize(&mut graph);

        let (invalid_state, side_effect_nodes, deopt_nodes) = strip_frame_states(&mut graph);
        let return_node = merge_returns(&mut graph);

        for slot in &mut params {
            if let ParamSlot::Varargs(placeholders) = slot {
                for placeholder in placeholders.iter_mut() {
                    *placeholder = placeholder.filter(|p| graph.is_alive(*p));
                }
            }
        }

        let stamp_nodes = graph
            .node_ids()
            .filter(|n| matches!(graph.stamp(*n), Stamp::Placeholder))
            .collect();
        let kills = fragment_kills(&graph);
        let nodes = graph
            .node_ids()
            .filter(|n| {
                *n != graph.start()
                    && Some(*n) != return_node
                    && Some(*n) != invalid_state
                    && !matches!(graph.op(*n), Op::Parameter(_) | Op::Placeholder { .. })
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            template = %method.name,
            nodes = nodes.len(),
            exploded,
            "built template"
        );

        Ok(Self {
            key,
            name: method.name.clone(),
            graph,
            params,
            nodes,
            return_node,
            invalid_state,
            side_effect_nodes,
            deopt_nodes,
            stamp_nodes,
            kills,
            private_locations: method.private_locations.clone(),
        })
    }
}

type StrippedStates = (Option<NodeId>, Vec<NodeId>, Vec<(NodeId, DeoptMode)>);

/// Removes frame states from the fragment. Side-effecting nodes get a shared
/// invalid state to be replaced at instantiation. Deoptimizing nodes are
/// recorded with the state they resume from, whether or not they also have
/// a side effect.
fn strip_frame_states(graph: &mut Graph) -> StrippedStates {
    let mut side_effects = Vec::new();
    let mut deopts = Vec::new();
    let mut dropped = Vec::new();
    let mut invalid = None;
    for node in graph.nodes_where(|op| op.is_fixed()) {
        let info = graph.node(node);
        dropped.extend(info.state_before());
        dropped.extend(info.state_during());
        dropped.extend(info.state_after());
        graph.set_state_before(node, None);
        graph.set_state_during(node, None);
        graph.set_state_after(node, None);

        let op = graph.op(node);
        let (mode, side_effect) = (op.deopt_mode(), op.has_side_effect());
        if let Some(mode) = mode {
            deopts.push((node, mode));
        }
        if side_effect {
            let state = *invalid.get_or_insert_with(|| graph.invalid_frame_state());
            graph.set_state_after(node, Some(state));
            side_effects.push(node);
        }
    }
    graph.kill_unused_floating(dropped);
    (invalid, side_effects, deopts)
}

/// Funnels all returns of the fragment into a single return node.
fn merge_returns(graph: &mut Graph) -> Option<NodeId> {
    let returns = graph.nodes_where(|op| matches!(op, Op::Return));
    match returns[..] {
        [] => None,
        [ret] => Some(ret),
        _ => {
            let has_value = graph.inputs(returns[0]).len() == 1;
            let merge = graph.add(Op::Merge, &[]);
            let mut values = vec![merge];
            for &ret in &returns {
                let end = graph.add(Op::End, &[]);
                graph.replace_at_predecessor(ret, Some(end));
                graph.push_input(merge, end);
                values.extend(graph.clear_inputs(ret));
                graph.safe_delete(ret);
            }
            let inputs = if has_value {
                vec![graph.add(Op::Phi, &values)]
            } else {
                Vec::new()
            };
            let ret = graph.add(Op::Return, &inputs);
            graph.set_next(merge, Some(ret));
            Some(ret)
        }
    }
}

fn fragment_kills(graph: &Graph) -> Option<Kills> {
    let mut locations = LocationSet::default();
    for node in graph.node_ids() {
        if node == graph.start() {
            continue;
        }
        if let Some(kills) = graph.op(node).kills() {
            locations.extend(kills.locations().copied());
        }
    }
    if locations.contains(&LocationIdentity::Any) {
        return Some(Kills::any());
    }
    (!locations.is_empty()).then(|| locations.into_iter().collect())
}
