use graft_ir::{MetaAccess, MethodId, Signature, Stamp, TypeId};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Clone, Debug)]
struct MethodEntry {
    name: String,
    is_static: bool,
    signature: Signature,
}

/// In-memory metadata for tests.
#[derive(Clone, Debug, Default)]
pub struct TestMeta {
    methods: FxHashMap<MethodId, MethodEntry>,
    leaf_types: FxHashSet<TypeId>,
    overrides: FxHashMap<(MethodId, TypeId), MethodId>,
}

#[bon::bon]
impl TestMeta {
    /// Registers a method.
    ///
    /// ```ignore
    /// meta.method().id(m(1)).name("callee").is_static(true).add();
    /// ```
    #[builder(finish_fn = add)]
    pub fn method(
        &mut self,
        id: MethodId,
        #[builder(into)] name: String,
        #[builder(default)] is_static: bool,
        #[builder(default)] params: Vec<Stamp>,
        #[builder(default = Stamp::Any)] ret: Stamp,
    ) -> &mut Self {
        self.methods.insert(
            id,
            MethodEntry {
                name,
                is_static,
                signature: Signature { params, ret },
            },
        );
        self
    }
}

impl TestMeta {
    pub fn leaf_type(&mut self, ty: TypeId) -> &mut Self {
        self.leaf_types.insert(ty);
        self
    }

    /// Declares that `method` dispatches to `target` for receivers of `ty`.
    pub fn dispatch(&mut self, method: MethodId, ty: TypeId, target: MethodId) -> &mut Self {
        self.overrides.insert((method, ty), target);
        self
    }

    fn entry(&self, method: MethodId) -> &MethodEntry {
        self.methods
            .get(&method)
            .unwrap_or_else(|| panic!("unknown test method {method}"))
    }
}

impl MetaAccess for TestMeta {
    fn method_name(&self, method: MethodId) -> String {
        self.methods
            .get(&method)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| method.to_string())
    }

    fn is_static(&self, method: MethodId) -> bool {
        self.methods.get(&method).is_some_and(|m| m.is_static)
    }

    fn signature(&self, method: MethodId) -> Signature {
        self.entry(method).signature.clone()
    }

    fn is_leaf_type(&self, ty: TypeId) -> bool {
        self.leaf_types.contains(&ty)
    }

    fn resolve_concrete(&self, method: MethodId, receiver: TypeId) -> Option<MethodId> {
        self.overrides.get(&(method, receiver)).copied()
    }
}
