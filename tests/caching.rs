//! Artifact caching behavior
//!
//! With caching enabled a template is compiled once and reused; with caching
//! disabled every request recompiles. Invalidation is explicit: there is no
//! file watching, so a changed file is only picked up after `invalidate` or
//! `clear_cache`.

use std::path::PathBuf;
use std::rc::Rc;
use weft::cache::CachePolicy;
use weft::engine::{Engine, EngineOptions, ErrorMode, TemplateInput};
use weft::scope::Bindings;

fn engine(cache: CachePolicy) -> Engine {
    Engine::new(EngineOptions {
        cache,
        errors: ErrorMode::Production,
        ..EngineOptions::default()
    })
    .expect("valid options")
}

fn temp_template(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("weft-caching-{}-{}.weft", tag, std::process::id()))
}

#[tokio::test]
async fn enabled_cache_reuses_the_artifact() {
    let engine = engine(CachePolicy::Enabled);
    let input = TemplateInput::inline("cached.weft", "n = <?= 1 + 1 ?>");
    let first = engine.compile(&input).await.unwrap();
    let second = engine.compile(&input).await.unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn disabled_cache_recompiles_every_time() {
    let engine = engine(CachePolicy::Disabled);
    let input = TemplateInput::inline("uncached.weft", "n = <?= 1 + 1 ?>");
    let first = engine.compile(&input).await.unwrap();
    let second = engine.compile(&input).await.unwrap();
    assert!(!Rc::ptr_eq(&first, &second));
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn cached_artifact_renders_identically() {
    let engine = engine(CachePolicy::Enabled);
    let input = TemplateInput::inline("cached.weft", "<? for i = 1, 2 do ?>x<? end ?>");
    let first = engine
        .render_to_string(&input, Bindings::new())
        .await
        .unwrap();
    let second = engine
        .render_to_string(&input, Bindings::new())
        .await
        .unwrap();
    assert_eq!(first, "xx");
    assert_eq!(first, second);
}

#[tokio::test]
async fn stale_file_is_served_until_invalidated() {
    let path = temp_template("stale");
    tokio::fs::write(&path, "v1").await.unwrap();
    let engine = engine(CachePolicy::Enabled);
    let input = TemplateInput::file(&path);

    let out = engine
        .render_to_string(&input, Bindings::new())
        .await
        .unwrap();
    assert_eq!(out, "v1");

    // The file changes on disk but the cached artifact keeps serving.
    tokio::fs::write(&path, "v2").await.unwrap();
    let out = engine
        .render_to_string(&input, Bindings::new())
        .await
        .unwrap();
    assert_eq!(out, "v1");

    engine.invalidate(&input);
    let out = engine
        .render_to_string(&input, Bindings::new())
        .await
        .unwrap();
    assert_eq!(out, "v2");

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn disabled_cache_always_sees_fresh_files() {
    let path = temp_template("fresh");
    tokio::fs::write(&path, "old").await.unwrap();
    let engine = engine(CachePolicy::Disabled);
    let input = TemplateInput::file(&path);

    let out = engine
        .render_to_string(&input, Bindings::new())
        .await
        .unwrap();
    assert_eq!(out, "old");

    tokio::fs::write(&path, "new").await.unwrap();
    let out = engine
        .render_to_string(&input, Bindings::new())
        .await
        .unwrap();
    assert_eq!(out, "new");

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn clear_cache_drops_everything() {
    let engine = engine(CachePolicy::Enabled);
    engine
        .compile(&TemplateInput::inline("a.weft", "a"))
        .await
        .unwrap();
    engine
        .compile(&TemplateInput::inline("b.weft", "b"))
        .await
        .unwrap();
    assert_eq!(engine.cache().len(), 2);
    engine.clear_cache();
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn failed_compiles_are_never_cached() {
    let engine = engine(CachePolicy::Enabled);
    let input = TemplateInput::inline("bad.weft", "<? local x = 1\n");
    assert!(engine.compile(&input).await.is_err());
    assert!(engine.cache().is_empty());
    // The same key still compiles once the text is fixed (different text,
    // different key, so use a fresh failing compile to prove retry works).
    assert!(engine.compile(&input).await.is_err());
}

#[tokio::test]
async fn concurrent_compiles_share_one_artifact() {
    let engine = engine(CachePolicy::Enabled);
    let input = TemplateInput::inline("shared.weft", "<?= 40 + 2 ?>");
    let (a, b) = tokio::join!(engine.compile(&input), engine.compile(&input));
    assert!(Rc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(engine.cache().len(), 1);
}
