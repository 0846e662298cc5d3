//! Process-wide cache for loaded models.
//!
//! Loading an NLI checkpoint means reading hundreds of megabytes of weights.
//! The cache hands out `Arc` handles so every classifier built for the same
//! model source and device shares one read-only copy of the weights.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::error::Result;

/// Implemented by anything that can describe a model variant as a stable key.
pub trait ModelOptions {
    fn cache_key(&self) -> String;
}

type CacheStorage = HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>;

/// A thread-safe map from `(model type, key)` to a shared model instance.
pub struct ModelCache {
    cache: Mutex<CacheStorage>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached model for `key`, or run `loader` and cache its result.
    ///
    /// The lock is not held while `loader` runs, so two threads racing on the
    /// same cold key may both load; the first one stored wins.
    pub fn get_or_create<M, F>(&self, key: &str, loader: F) -> Result<Arc<M>>
    where
        M: Send + Sync + 'static,
        F: FnOnce() -> Result<M>,
    {
        let cache_key = (TypeId::of::<M>(), key.to_string());

        if let Some(model) = self.lookup::<M>(&cache_key) {
            tracing::info!(key, "reusing cached model");
            return Ok(model);
        }

        let model = Arc::new(loader()?);

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = cache
            .entry(cache_key)
            .or_insert_with(|| model.clone() as Arc<dyn Any + Send + Sync>)
            .clone();
        drop(cache);

        Ok(entry.downcast::<M>().unwrap_or(model))
    }

    fn lookup<M: Send + Sync + 'static>(&self, cache_key: &(TypeId, String)) -> Option<Arc<M>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(cache_key)
            .cloned()
            .and_then(|cached| cached.downcast::<M>().ok())
    }

    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_MODEL_CACHE: once_cell::sync::Lazy<ModelCache> =
    once_cell::sync::Lazy::new(ModelCache::new);

/// The cache used by [`ZeroShotClassifierBuilder`](crate::pipelines::zero_shot::ZeroShotClassifierBuilder).
pub fn global_cache() -> &'static ModelCache {
    &GLOBAL_MODEL_CACHE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClassifierError;

    struct TestModel {
        id: String,
    }

    #[test]
    fn cache_returns_same_instance() {
        let cache = ModelCache::new();

        let first = cache
            .get_or_create("nli-base-cpu", || {
                Ok(TestModel {
                    id: "original".to_string(),
                })
            })
            .unwrap();

        let second = cache
            .get_or_create::<TestModel, _>("nli-base-cpu", || {
                panic!("loader must not run for a cached key")
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.id, "original");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn same_key_different_types_do_not_collide() {
        let cache = ModelCache::new();

        cache
            .get_or_create("shared-key", || Ok(TestModel { id: "a".into() }))
            .unwrap();
        let other = cache
            .get_or_create("shared-key", || Ok(42_u32))
            .unwrap();

        assert_eq!(*other, 42);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = ModelCache::new();

        let err = cache
            .get_or_create::<TestModel, _>("broken", || {
                Err(ClassifierError::Load("missing weights".into()))
            })
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::Load(_)));
        assert!(cache.is_empty());

        let model = cache
            .get_or_create("broken", || Ok(TestModel { id: "retry".into() }))
            .unwrap();
        assert_eq!(model.id, "retry");

        cache.clear();
        assert!(cache.is_empty());
    }
}
