//! Artifact cache
//!
//! A side-table from compilation key to compiled artifact. The cache performs
//! no compilation itself; [`ArtifactCache::get_or_compile`] only coordinates
//! it: each key owns a one-shot cell, so concurrent first-time requests for
//! the same key await a single compilation instead of racing (single-flight).
//! A failed compilation leaves the cell empty and nothing is cached, so the
//! next request retries from scratch.
//!
//! Policy is fixed at construction. With [`CachePolicy::Disabled`] every
//! request recompiles and `set` is a no-op, which is what iterative template
//! editing wants. There is no eviction beyond explicit `remove`/`reset`;
//! bounding growth is the caller's responsibility.

use crate::artifact::CompiledArtifact;
use crate::error::TemplateError;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use tokio::sync::OnceCell;

/// Whether compiled artifacts are kept between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    Enabled,
    Disabled,
}

type Entry = Rc<OnceCell<Rc<CompiledArtifact>>>;

#[derive(Debug)]
pub struct ArtifactCache {
    policy: CachePolicy,
    entries: RefCell<HashMap<String, Entry>>,
}

impl ArtifactCache {
    pub fn new(policy: CachePolicy) -> Self {
        ArtifactCache {
            policy,
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Look up a previously compiled artifact.
    pub fn get(&self, key: &str) -> Option<Rc<CompiledArtifact>> {
        self.entries
            .borrow()
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Store an artifact, atomically replacing any previous one under the
    /// same key. A no-op when caching is disabled.
    pub fn set(&self, key: impl Into<String>, artifact: Rc<CompiledArtifact>) {
        if self.policy == CachePolicy::Disabled {
            return;
        }
        self.entries
            .borrow_mut()
            .insert(key.into(), Rc::new(OnceCell::new_with(Some(artifact))));
    }

    pub fn remove(&self, key: &str) -> Option<Rc<CompiledArtifact>> {
        self.entries
            .borrow_mut()
            .remove(key)
            .and_then(|cell| cell.get().cloned())
    }

    pub fn reset(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Number of keys with a finished artifact.
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the artifact for `key`, running `compile` if it is absent.
    ///
    /// With caching enabled this is single-flight per key: concurrent callers
    /// share one compilation and receive the same artifact. With caching
    /// disabled it simply runs `compile`.
    pub async fn get_or_compile<F, Fut>(
        &self,
        key: &str,
        compile: F,
    ) -> Result<Rc<CompiledArtifact>, TemplateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Rc<CompiledArtifact>, TemplateError>>,
    {
        if self.policy == CachePolicy::Disabled {
            return compile().await;
        }
        let cell = {
            let mut entries = self.entries.borrow_mut();
            Rc::clone(entries.entry(key.to_string()).or_default())
        };
        if cell.get().is_some() {
            tracing::trace!(key, "artifact cache hit");
        }
        let artifact = cell.get_or_try_init(compile).await?;
        Ok(Rc::clone(artifact))
    }
}
