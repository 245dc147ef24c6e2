use std::sync::Arc;

use graft_ir::{Graph, LocationSet, MethodId, Stamp};
use rustc_hash::FxHashMap;

/// How an argument is bound when a template is specialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamMode {
    /// Stays a parameter; bound to a node of the target graph at
    /// instantiation.
    Ordinary,
    /// Folded into the fragment at build time. Part of the cache key.
    Constant,
    /// An array of nodes whose length is fixed at build time. Part of the
    /// cache key.
    Varargs,
}

#[derive(Clone, Debug)]
pub struct TemplateParam {
    pub name: String,
    pub mode: ParamMode,
    /// Stamp of the parameter, or of each element for varargs.
    pub stamp: Stamp,
}

impl TemplateParam {
    pub fn ordinary(name: impl Into<String>, stamp: Stamp) -> Self {
        Self {
            name: name.into(),
            mode: ParamMode::Ordinary,
            stamp,
        }
    }

    pub fn constant(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: ParamMode::Constant,
            stamp: Stamp::Any,
        }
    }

    pub fn varargs(name: impl Into<String>, stamp: Stamp) -> Self {
        Self {
            name: name.into(),
            mode: ParamMode::Varargs,
            stamp,
        }
    }
}

/// A registered fragment: its parameters and its parsed body.
///
/// Parameter `i` of the body graph corresponds to `params[i]`.
#[derive(Debug, bon::Builder)]
pub struct TemplateMethod {
    pub id: MethodId,
    #[builder(into)]
    pub name: String,
    pub params: Vec<TemplateParam>,
    pub body: Graph,
    /// Locations the fragment may write without the replacee declaring them.
    #[builder(default)]
    pub private_locations: LocationSet,
}

impl TemplateMethod {
    pub fn param(&self, index: usize) -> &TemplateParam {
        &self.params[index]
    }
}

/// Template methods by id, populated at start-up.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    methods: FxHashMap<MethodId, Arc<TemplateMethod>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `method`, replacing any earlier registration under its id.
    pub fn register(&mut self, method: TemplateMethod) -> Arc<TemplateMethod> {
        for (index, _) in method.body.parameters() {
            assert!(
                (index as usize) < method.params.len(),
                "template {} has no declared parameter {index}",
                method.name
            );
        }
        let method = Arc::new(method);
        self.methods.insert(method.id, method.clone());
        method
    }

    pub fn get(&self, id: MethodId) -> Option<&Arc<TemplateMethod>> {
        self.methods.get(&id)
    }

    pub fn contains(&self, id: MethodId) -> bool {
        self.methods.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
