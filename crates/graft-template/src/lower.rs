//! Lowering of macro nodes through templates.

use std::sync::Arc;

use graft_ir::{Graph, MethodId, NodeId, Op};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::args::{Arguments, GuardsStage, LoweringStage};
use crate::engine::TemplateEngine;
use crate::error::TemplateError;
use crate::method::{ParamMode, TemplateMethod};

/// Custom argument binding for the macro nodes of one target.
pub trait NodeLowering: Send + Sync {
    /// Binds the arguments of the template that replaces `node`, or returns
    /// `None` to leave `node` in the graph.
    fn arguments(
        &self,
        engine: &TemplateEngine,
        graph: &mut Graph,
        node: NodeId,
    ) -> Result<Option<Arguments>, TemplateError>;
}

/// Replaces [`Op::Macro`] nodes by instances of the template registered for
/// their target.
///
/// By default the inputs of a macro node are bound to the template
/// parameters in order: one input per ordinary or constant parameter, the
/// remaining inputs to a trailing varargs parameter.
pub struct TemplateLowerer<'e> {
    engine: &'e TemplateEngine,
    guards: GuardsStage,
    stage: LoweringStage,
    custom: FxHashMap<MethodId, Box<dyn NodeLowering + 'e>>,
}

impl<'e> TemplateLowerer<'e> {
    pub fn new(engine: &'e TemplateEngine, guards: GuardsStage, stage: LoweringStage) -> Self {
        Self {
            engine,
            guards,
            stage,
            custom: FxHashMap::default(),
        }
    }

    pub fn with_lowering(mut self, target: MethodId, lowering: impl NodeLowering + 'e) -> Self {
        self.custom.insert(target, Box::new(lowering));
        self
    }

    fn positional_arguments(
        &self,
        method: &Arc<TemplateMethod>,
        graph: &Graph,
        node: NodeId,
    ) -> Arguments {
        let mut args = Arguments::new(method, self.guards, self.stage);
        let mut inputs = graph.inputs(node).iter().copied();
        for param in &method.params {
            if param.mode == ParamMode::Varargs {
                let rest: Vec<NodeId> = inputs.by_ref().collect();
                args.add_varargs(&param.name, &rest);
                continue;
            }
            let input = inputs.next().unwrap_or_else(|| {
                panic!("{node} has too few inputs for template {}", method.name)
            });
            match param.mode {
                ParamMode::Constant => {
                    let value = graph.as_constant(input).unwrap_or_else(|| {
                        panic!(
                            "argument `{}` of {node} must be a constant, found {input}",
                            param.name
                        )
                    });
                    args.add_const(&param.name, *value);
                }
                _ => {
                    args.add(&param.name, input);
                }
            }
        }
        args
    }

    /// Lowers one macro node. Returns whether it was replaced.
    pub fn lower_node(&self, graph: &mut Graph, node: NodeId) -> Result<bool, TemplateError> {
        let Op::Macro { target, .. } = graph.op(node) else {
            return Ok(false);
        };
        let target = *target;
        let args = match self.custom.get(&target) {
            Some(custom) => custom.arguments(self.engine, graph, node)?,
            None => {
                let method = self.engine.method(target)?;
                Some(self.positional_arguments(method, graph, node))
            }
        };
        let Some(args) = args else {
            return Ok(false);
        };
        self.engine.instantiate(graph, node, &args)?;
        Ok(true)
    }

    /// Lowers macro nodes until none is left, including those introduced by
    /// the templates themselves. Returns the number of nodes lowered.
    pub fn lower_all(&self, graph: &mut Graph) -> Result<usize, TemplateError> {
        let mut lowered = 0;
        let mut kept: FxHashSet<NodeId> = FxHashSet::default();
        loop {
            let pending: Vec<NodeId> = graph
                .nodes_where(|op| matches!(op, Op::Macro { .. }))
                .into_iter()
                .filter(|n| !kept.contains(n))
                .collect();
            if pending.is_empty() {
                return Ok(lowered);
            }
            for node in pending {
                if !graph.is_alive(node) {
                    continue;
                }
                if self.lower_node(graph, node)? {
                    lowered += 1;
                } else {
                    kept.insert(node);
                }
            }
        }
    }
}
