//! Named singleton resources resolved at actor construction time.
//!
//! A concurrent `DashMap<String, Entry>` for name -> instance resolution,
//! plus a separately tracked registration order so `destroy_all` can walk
//! it in reverse without depending on map iteration order.

use std::any::Any;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use slog::error;

use crate::error::ResourceError;
use crate::logging::LogHandle;

/// A resource instance with an optional async teardown hook.
///
/// Most resources (a database pool, an HTTP client) can just implement
/// `destroy` as a no-op via the default; it exists at all because the
/// spec requires `destroyAll` to invoke it, mirroring the way actor
/// behaviors get a `destroy` hook.
#[async_trait]
pub trait Resource: Any + Send + Sync {
    async fn destroy(&self) {}

    fn as_any(&self) -> &dyn Any;
}

struct Entry {
    instance: Arc<dyn Resource>,
}

/// Resolves named dependencies declared by behaviors, and owns every
/// resource's lifetime for the duration of the `ActorSystem`.
#[derive(Clone)]
pub struct ResourceRegistry {
    entries: Arc<DashMap<String, Entry>>,
    order: Arc<Mutex<Vec<String>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        ResourceRegistry {
            entries: Arc::new(DashMap::new()),
            order: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a resource instance under `name`. Re-registering under a
    /// name that already exists is rejected, whether or not the instance is
    /// the same one.
    pub fn register(&self, name: &str, instance: Arc<dyn Resource>) -> Result<(), ResourceError> {
        if self.entries.contains_key(name) {
            return Err(ResourceError::DuplicateResource(name.to_string()));
        }
        self.entries.insert(name.to_string(), Entry { instance });
        self.order.lock().unwrap().push(name.to_string());
        Ok(())
    }

    /// Resolve a name to its registered instance.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Resource>, ResourceError> {
        self.entries
            .get(name)
            .map(|e| e.instance.clone())
            .ok_or_else(|| ResourceError::UnknownResource(name.to_string()))
    }

    /// Destroy every registered resource in reverse registration order,
    /// logging and swallowing failures (there are none to catch here since
    /// `Resource::destroy` cannot fail by signature, but a panicking
    /// destructor is still caught so one broken resource can't prevent the
    /// rest from tearing down).
    pub async fn destroy_all(&self, log: &LogHandle) {
        let names: Vec<String> = { self.order.lock().unwrap().drain(..).rev().collect() };
        for name in names {
            if let Some((_, entry)) = self.entries.remove(&name) {
                entry.instance.destroy().await;
            } else {
                error!(log.inner(), "resource disappeared before destroy"; "name" => name);
            }
        }
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
