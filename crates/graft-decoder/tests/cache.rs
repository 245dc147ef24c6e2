mod common;

use common::*;
use graft_decoder::*;
use graft_ir::*;
use graft_test_utils::return_constant;

fn decoder<'a>(meta: &'a graft_test_utils::TestMeta, cache: &'a GraphCache) -> PeDecoder<'a> {
    PeDecoder::builder()
        .meta(meta)
        .cache(cache)
        .inline_plugins(vec![&AlwaysInline as &dyn InlineInvokePlugin])
        .build()
}

#[test]
fn repeated_decodes_build_each_graph_once() {
    let (provider, cache) = cache([
        calling(ROOT, CALLEE, InvokeKind::Static, 0),
        return_constant(CALLEE, "callee", 5),
    ]);
    let meta = meta();
    let first = decoder(&meta, &cache).decode(ROOT).unwrap();
    let second = decoder(&meta, &cache).decode(ROOT).unwrap();

    assert_eq!(first.graph.to_string(), second.graph.to_string());
    assert_eq!(provider.builds(), 2);
    assert_eq!(cache.len(), 2);
}

#[test]
fn missing_root_graph_bails_out() {
    let (_, cache) = cache([]);
    let meta = meta();
    let err = decoder(&meta, &cache).decode(MethodId(99)).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"bailout (unsupported): no graph available for m99");
}

#[test]
fn callee_without_a_graph_stays_a_call() {
    let (provider, cache) = cache([calling(ROOT, CALLEE, InvokeKind::Static, 0)]);
    let meta = meta();
    let Decoded { graph, stats } = decoder(&meta, &cache).decode(ROOT).unwrap();

    assert_eq!(graph.count(|op| matches!(op, Op::Invoke { .. })), 1);
    assert_eq!(stats.materialized_invokes, 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(provider.builds(), 2);
}

#[test]
fn concurrent_decodes_share_the_cache() {
    let (_, cache) = cache([
        calling(ROOT, CALLEE, InvokeKind::Static, 1),
        clamp(CALLEE),
    ]);
    let meta = meta();
    let (meta, cache) = (&meta, &cache);
    let dumps: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(move || decoder(meta, cache).decode(ROOT).unwrap().graph.to_string())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(dumps.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(cache.len(), 2);
}
