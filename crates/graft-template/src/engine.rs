use std::sync::Arc;

use dashmap::DashMap;
use graft_ir::canonical::canonicalize;
use graft_ir::{Graph, MethodId, NodeId, NodeMap};

use crate::args::{Arguments, CacheKey, GuardsStage, LoweringStage};
use crate::error::TemplateError;
use crate::lowering::{LoweringProvider, NoLowering};
use crate::method::{TemplateMethod, TemplateRegistry};
use crate::template::Template;

#[derive(Clone, Debug, bon::Builder)]
pub struct TemplateOptions {
    /// Share built templates between instantiations with equal keys.
    #[builder(default = true)]
    pub use_template_cache: bool,
    /// Number of specializations of one template method above which a
    /// warning is logged.
    #[builder(default = 50)]
    pub max_templates_per_method: usize,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builds, caches and instantiates templates.
///
/// The engine can be shared between threads compiling different graphs.
/// Concurrent requests for a missing template may build it twice; the first
/// one stored is the one every caller gets.
pub struct TemplateEngine {
    registry: TemplateRegistry,
    lowering: Arc<dyn LoweringProvider>,
    options: TemplateOptions,
    prepared: DashMap<MethodId, Arc<Graph>>,
    templates: DashMap<CacheKey, Arc<Template>>,
    built: DashMap<MethodId, usize>,
}

#[bon::bon]
impl TemplateEngine {
    #[builder]
    pub fn new(
        registry: TemplateRegistry,
        #[builder(default = Arc::new(NoLowering))] lowering: Arc<dyn LoweringProvider>,
        #[builder(default)] options: TemplateOptions,
    ) -> Self {
        Self {
            registry,
            lowering,
            options,
            prepared: DashMap::new(),
            templates: DashMap::new(),
            built: DashMap::new(),
        }
    }
}

impl TemplateEngine {
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn options(&self) -> &TemplateOptions {
        &self.options
    }

    pub fn method(&self, id: MethodId) -> Result<&Arc<TemplateMethod>, TemplateError> {
        self.registry.get(id).ok_or(TemplateError::UnknownTemplate(id))
    }

    /// Empty arguments for template method `id`.
    pub fn arguments(
        &self,
        id: MethodId,
        guards: GuardsStage,
        lowering: LoweringStage,
    ) -> Result<Arguments, TemplateError> {
        Ok(Arguments::new(self.method(id)?, guards, lowering))
    }

    /// The body of `method`, canonicalized once and shared by all of its
    /// specializations.
    fn prepared_graph(&self, method: &TemplateMethod) -> Arc<Graph> {
        if let Some(graph) = self.prepared.get(&method.id) {
            return graph.value().clone();
        }
        let mut graph = method.body.clone();
        canonicalize(&mut graph);
        self.prepared
            .entry(method.id)
            .or_insert_with(|| Arc::new(graph))
            .value()
            .clone()
    }

    /// The template for `args`, built on first use.
    pub fn template(&self, args: &Arguments) -> Result<Arc<Template>, TemplateError> {
        let key = args.cache_key();
        let caching = self.options.use_template_cache && args.is_cacheable();
        if caching {
            if let Some(template) = self.templates.get(&key) {
                tracing::trace!(template = %args.method().name, "template cache hit");
                return Ok(template.value().clone());
            }
        }

        let method = args.method();
        let prepared = self.prepared_graph(method);
        let template = Arc::new(Template::build(
            method,
            &prepared,
            args,
            self.lowering.as_ref(),
        )?);
        self.count_build(method);
        if !caching {
            return Ok(template);
        }
        Ok(self.templates.entry(key).or_insert(template).value().clone())
    }

    fn count_build(&self, method: &TemplateMethod) {
        let mut count = self.built.entry(method.id).or_insert(0);
        *count += 1;
        if *count > self.options.max_templates_per_method {
            tracing::warn!(
                template = %method.name,
                count = *count,
                limit = self.options.max_templates_per_method,
                "too many templates for one template method"
            );
        }
    }

    /// Looks up or builds the template for `args` and splices it in place
    /// of `replacee`.
    pub fn instantiate(
        &self,
        graph: &mut Graph,
        replacee: NodeId,
        args: &Arguments,
    ) -> Result<NodeMap, TemplateError> {
        let template = self.template(args)?;
        Ok(template.instantiate(graph, replacee, args))
    }

    /// Number of templates held by the cache.
    pub fn cached_templates(&self) -> usize {
        self.templates.len()
    }

    /// Number of specializations of `method` built so far.
    pub fn builds(&self, method: MethodId) -> usize {
        self.built.get(&method).map(|c| *c.value()).unwrap_or_default()
    }
}
