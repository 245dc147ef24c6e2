use std::sync::Arc;

use graft_ir::{Constant, MethodId, NodeId};
use smallvec::SmallVec;

use crate::method::{ParamMode, TemplateMethod};

/// How guards are represented in the graph a template is lowered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GuardsStage {
    FloatingGuards,
    FixedDeopts,
    AfterFrameStateAssignment,
}

/// How far the fragment is lowered before it is cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoweringStage {
    High,
    Mid,
    Low,
}

/// The value bound to one template parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    /// An existing node of the target graph.
    Node(NodeId),
    /// A constant, for constant parameters or for ordinary parameters that
    /// are bound to a boxed value rather than a node.
    Value(Constant),
    Varargs(SmallVec<[NodeId; 4]>),
}

/// Component of a [`CacheKey`] contributed by one specializing parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Const(Constant),
    Length(u32),
}

/// Identifies one specialization of a template method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: MethodId,
    pub guards: GuardsStage,
    pub lowering: LoweringStage,
    pub values: SmallVec<[KeyValue; 4]>,
}

/// Arguments of one instantiation, added in parameter order.
///
/// Adding an argument out of order, under the wrong name or in the wrong
/// mode panics.
///
/// # Examples
///
/// ```ignore
/// let mut args = Arguments::new(&method, GuardsStage::FloatingGuards, LoweringStage::High);
/// args.add("object", object).add_const("offset", Constant::Int(8));
/// let template = engine.template(&args)?;
/// template.instantiate(&mut graph, replacee, &args);
/// ```
#[derive(Clone, Debug)]
pub struct Arguments {
    method: Arc<TemplateMethod>,
    guards: GuardsStage,
    lowering: LoweringStage,
    values: Vec<ArgValue>,
    cacheable: bool,
}

impl Arguments {
    pub fn new(method: &Arc<TemplateMethod>, guards: GuardsStage, lowering: LoweringStage) -> Self {
        Self {
            method: method.clone(),
            guards,
            lowering,
            values: Vec::with_capacity(method.params.len()),
            cacheable: true,
        }
    }

    fn push(&mut self, name: &str, mode: ParamMode, value: ArgValue) -> &mut Self {
        let index = self.values.len();
        let param = self.method.params.get(index).unwrap_or_else(|| {
            panic!(
                "template {} takes {} arguments, got argument `{name}` in excess",
                self.method.name,
                self.method.params.len()
            )
        });
        assert_eq!(
            param.name, name,
            "argument {index} of template {} is `{}`, not `{name}`",
            self.method.name, param.name
        );
        assert_eq!(
            param.mode, mode,
            "parameter `{name}` of template {} is {:?}",
            self.method.name, param.mode
        );
        self.values.push(value);
        self
    }

    /// Binds an ordinary parameter to a node of the target graph.
    pub fn add(&mut self, name: &str, node: NodeId) -> &mut Self {
        self.push(name, ParamMode::Ordinary, ArgValue::Node(node))
    }

    /// Binds an ordinary parameter to a boxed constant. The constant becomes
    /// a new node at instantiation.
    pub fn add_value(&mut self, name: &str, value: Constant) -> &mut Self {
        self.push(name, ParamMode::Ordinary, ArgValue::Value(value))
    }

    pub fn add_const(&mut self, name: &str, value: Constant) -> &mut Self {
        self.push(name, ParamMode::Constant, ArgValue::Value(value))
    }

    pub fn add_varargs(&mut self, name: &str, nodes: &[NodeId]) -> &mut Self {
        self.push(
            name,
            ParamMode::Varargs,
            ArgValue::Varargs(SmallVec::from_slice(nodes)),
        )
    }

    /// Bypasses the template cache for this instantiation.
    pub fn set_cacheable(&mut self, cacheable: bool) -> &mut Self {
        self.cacheable = cacheable;
        self
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn method(&self) -> &Arc<TemplateMethod> {
        &self.method
    }

    pub fn guards(&self) -> GuardsStage {
        self.guards
    }

    pub fn lowering(&self) -> LoweringStage {
        self.lowering
    }

    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    pub fn is_complete(&self) -> bool {
        self.values.len() == self.method.params.len()
    }

    pub(crate) fn assert_complete(&self) {
        assert!(
            self.is_complete(),
            "template {} takes {} arguments, {} were given",
            self.method.name,
            self.method.params.len(),
            self.values.len()
        );
    }

    pub fn cache_key(&self) -> CacheKey {
        self.assert_complete();
        let values = self
            .method
            .params
            .iter()
            .zip(&self.values)
            .filter_map(|(param, value)| match (param.mode, value) {
                (ParamMode::Constant, ArgValue::Value(c)) => Some(KeyValue::Const(*c)),
                (ParamMode::Varargs, ArgValue::Varargs(nodes)) => {
                    Some(KeyValue::Length(nodes.len() as u32))
                }
                _ => None,
            })
            .collect();
        CacheKey {
            method: self.method.id,
            guards: self.guards,
            lowering: self.lowering,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::TemplateParam;
    use graft_ir::{Graph, Stamp};

    fn method() -> Arc<TemplateMethod> {
        let mut body = Graph::new("t");
        body.add(graft_ir::Op::Parameter(0), &[]);
        Arc::new(
            TemplateMethod::builder()
                .id(MethodId(9))
                .name("t")
                .params(vec![
                    TemplateParam::ordinary("x", Stamp::int()),
                    TemplateParam::constant("k"),
                    TemplateParam::varargs("rest", Stamp::int()),
                ])
                .body(body)
                .build(),
        )
    }

    #[test]
    fn key_keeps_only_specializing_values() {
        let m = method();
        let mut graph = Graph::new("target");
        let a = graph.constant(Constant::Int(1));
        let mut args = Arguments::new(&m, GuardsStage::FloatingGuards, LoweringStage::High);
        args.add("x", a)
            .add_const("k", Constant::Bool(true))
            .add_varargs("rest", &[a, a]);

        let key = args.cache_key();
        assert_eq!(
            key.values.as_slice(),
            &[KeyValue::Const(Constant::Bool(true)), KeyValue::Length(2)]
        );

        let mut other = Arguments::new(&m, GuardsStage::FloatingGuards, LoweringStage::High);
        let b = graph.constant(Constant::Int(2));
        other
            .add("x", b)
            .add_const("k", Constant::Bool(true))
            .add_varargs("rest", &[b, b]);
        assert_eq!(other.cache_key(), key);
    }

    #[test]
    #[should_panic(expected = "is `x`, not `k`")]
    fn out_of_order_argument_panics() {
        let m = method();
        let mut args = Arguments::new(&m, GuardsStage::FloatingGuards, LoweringStage::High);
        args.add_const("k", Constant::Int(0));
    }

    #[test]
    #[should_panic(expected = "takes 3 arguments, 1 were given")]
    fn incomplete_arguments_have_no_key() {
        let m = method();
        let mut graph = Graph::new("target");
        let a = graph.constant(Constant::Int(1));
        let mut args = Arguments::new(&m, GuardsStage::FloatingGuards, LoweringStage::High);
        args.add("x", a);
        args.cache_key();
    }
}
