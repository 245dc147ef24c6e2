mod common;

use std::sync::{Arc, Mutex};

use common::*;
use graft_ir::*;
use graft_template::*;

fn const_args(engine: &TemplateEngine, x: NodeId, k: i64) -> Arguments {
    let mut args = args(engine, ADD_CONST);
    args.add("x", x).add_const("k", Constant::Int(k));
    args
}

#[test]
fn equal_keys_share_one_template() {
    let engine = engine();
    let (_, x, y, _) = macro_site(ADD_CONST, None);

    let first = engine.template(&const_args(&engine, x, 1)).unwrap();
    let second = engine.template(&const_args(&engine, y, 1)).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.builds(ADD_CONST), 1);
    assert_eq!(engine.cached_templates(), 1);
}

#[test]
fn constants_split_the_cache() {
    let engine = engine();
    let (_, x, _, _) = macro_site(ADD_CONST, None);

    let one = engine.template(&const_args(&engine, x, 1)).unwrap();
    let two = engine.template(&const_args(&engine, x, 2)).unwrap();

    assert!(!Arc::ptr_eq(&one, &two));
    assert_ne!(one.key(), two.key());
    assert_eq!(engine.builds(ADD_CONST), 2);
}

#[test]
fn stages_split_the_cache() {
    let engine = engine();
    let (_, x, y, _) = macro_site(ADD, None);
    let mut high = args(&engine, ADD);
    high.add("a", x).add("b", y);
    let mut low = engine
        .arguments(ADD, GuardsStage::FloatingGuards, LoweringStage::Low)
        .unwrap();
    low.add("a", x).add("b", y);

    let a = engine.template(&high).unwrap();
    let b = engine.template(&low).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn uncacheable_arguments_build_every_time() {
    let engine = engine();
    let (_, x, _, _) = macro_site(ADD_CONST, None);
    let mut args = const_args(&engine, x, 3);
    args.set_cacheable(false);

    let first = engine.template(&args).unwrap();
    let second = engine.template(&args).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(engine.cached_templates(), 0);
    assert_eq!(engine.builds(ADD_CONST), 2);
}

#[test]
fn disabled_cache_builds_every_time() {
    let engine = TemplateEngine::builder()
        .registry(registry())
        .options(TemplateOptions::builder().use_template_cache(false).build())
        .build();
    let (_, x, _, _) = macro_site(ADD_CONST, None);

    let first = engine.template(&const_args(&engine, x, 3)).unwrap();
    let second = engine.template(&const_args(&engine, x, 3)).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(engine.cached_templates(), 0);
}

#[test]
fn exceeding_the_per_method_cap_only_warns() {
    let engine = TemplateEngine::builder()
        .registry(registry())
        .options(TemplateOptions::builder().max_templates_per_method(1).build())
        .build();
    let (_, x, _, _) = macro_site(ADD_CONST, None);

    for k in 1..=3 {
        engine.template(&const_args(&engine, x, k)).unwrap();
    }
    assert_eq!(engine.builds(ADD_CONST), 3);
    assert_eq!(engine.cached_templates(), 3);
}

#[test]
fn unknown_template_is_an_error() {
    let engine = engine();
    let err = engine
        .arguments(MethodId(999), GuardsStage::FloatingGuards, LoweringStage::High)
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"no template registered for m999");
}

/// Records lowering requests and rejects the `min` template.
#[derive(Default)]
struct Recording(Mutex<Vec<(MethodId, LoweringStage)>>);

impl LoweringProvider for Recording {
    fn lower(
        &self,
        method: MethodId,
        _: &mut Graph,
        stage: LoweringStage,
    ) -> Result<(), TemplateError> {
        self.0.lock().unwrap().push((method, stage));
        if method == MIN {
            return Err(TemplateError::lowering(method, "branches are not supported"));
        }
        Ok(())
    }
}

#[test]
fn lowering_runs_per_build_and_failures_are_not_cached() {
    let recording = Arc::new(Recording::default());
    let engine = TemplateEngine::builder()
        .registry(registry())
        .lowering(recording.clone())
        .build();
    let (_, x, y, _) = macro_site(ADD, None);

    let mut add = args(&engine, ADD);
    add.add("a", x).add("b", y);
    engine.template(&add).unwrap();
    engine.template(&add).unwrap();

    let mut min = args(&engine, MIN);
    min.add("a", x).add("b", y);
    let err = engine.template(&min).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"lowering of template m102 failed: branches are not supported");

    assert_eq!(
        recording.0.lock().unwrap().as_slice(),
        &[(ADD, LoweringStage::High), (MIN, LoweringStage::High)]
    );
    assert_eq!(engine.cached_templates(), 1);
}

#[test]
fn concurrent_requests_agree_on_one_template() {
    let engine = engine();
    let (_, x, y, _) = macro_site(ADD, None);
    let mut args = args(&engine, ADD);
    args.add("a", x).add("b", y);

    let templates: Vec<Arc<Template>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.template(&args).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let cached = engine.template(&args).unwrap();
    assert!(templates.iter().all(|t| Arc::ptr_eq(t, &cached)));
}
