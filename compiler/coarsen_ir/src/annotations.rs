//! Kernel annotation lookup.
//!
//! A function is a kernel when the module's annotation list carries a
//! `kernel` entry equal to 1 for it, or (when no annotation mentions it at
//! all) when it uses the `ptx_kernel` calling convention.
//!
//! Scanning the annotation list is linear in the module size, and the
//! coarsening driver asks about every function, so lookups go through an
//! [`AnnotationCache`]. The cache is an explicit object owned by whoever
//! drives the passes; entries for a module are dropped with
//! [`AnnotationCache::evict`] once that module is discarded or its
//! annotation list changes.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::function::Function;
use crate::module::{CallingConv, Module, ModuleId};

/// Annotation key marking a function as a kernel entry point.
pub const KERNEL_KEY: &str = "kernel";

type PropertyList = Vec<(String, i64)>;

/// Memoized `(module, symbol) → [(key, value)]` annotation properties.
#[derive(Default)]
pub struct AnnotationCache {
    entries: Mutex<FxHashMap<(ModuleId, String), PropertyList>>,
}

impl AnnotationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All annotation properties recorded for `symbol`, in list order.
    ///
    /// Populates the cache entry on first query.
    pub fn properties(&self, module: &Module, symbol: &str) -> PropertyList {
        let key = (module.id(), symbol.to_owned());
        let mut entries = self.entries.lock();
        if let Some(props) = entries.get(&key) {
            return props.clone();
        }
        let props: PropertyList = module
            .annotations
            .iter()
            .filter(|ann| ann.symbol == symbol)
            .map(|ann| (ann.key.clone(), ann.value))
            .collect();
        tracing::trace!(symbol, count = props.len(), "cached annotations");
        entries.insert(key, props.clone());
        props
    }

    /// Values recorded for `key` on `symbol`.
    pub fn values(&self, module: &Module, symbol: &str, key: &str) -> Vec<i64> {
        self.properties(module, symbol)
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Is `func` a kernel entry point of `module`?
    pub fn is_kernel(&self, module: &Module, func: &Function) -> bool {
        if func.is_declaration() {
            return false;
        }
        let props = self.properties(module, &func.name);
        if props.is_empty() {
            return func.calling_conv == CallingConv::PtxKernel;
        }
        props.iter().any(|(key, value)| key == KERNEL_KEY && *value == 1)
    }

    /// Drop every entry cached for `module`.
    pub fn evict(&self, module: ModuleId) {
        self.entries.lock().retain(|(id, _), _| *id != module);
    }

    /// Number of cached `(module, symbol)` entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
