#![forbid(unsafe_code)]

//! String interning for vertex/edge types and property keys.
//!
//! Types and property keys live in separate dictionaries so the same string
//! may name both without clashing. Type id 0 is reserved for the default type
//! carried by untyped vertices and edges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::types::{FlowError, PropId, Result, TypeId};

/// Display name of [`TypeId::DEFAULT`].
pub const DEFAULT_TYPE_NAME: &str = "_default";

/// Lookup counters of one catalog.
#[derive(Default)]
pub struct DictMetrics {
    intern_calls: AtomicU64,
    intern_hits: AtomicU64,
    intern_misses: AtomicU64,
    lookup_calls: AtomicU64,
    lookup_misses: AtomicU64,
}

/// Point-in-time copy of [`DictMetrics`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DictMetricsSnapshot {
    /// Interning calls.
    pub intern_calls: u64,
    /// Interning calls that found the name.
    pub intern_hits: u64,
    /// Interning calls that added the name.
    pub intern_misses: u64,
    /// Lookups by name.
    pub lookup_calls: u64,
    /// Lookups of unknown names.
    pub lookup_misses: u64,
}

impl DictMetricsSnapshot {
    /// Share of interning calls that found an existing name.
    pub fn intern_hit_rate(&self) -> f64 {
        if self.intern_calls == 0 {
            return 0.0;
        }
        self.intern_hits as f64 / self.intern_calls as f64
    }
}

impl DictMetrics {
    /// Reads every counter.
    pub fn snapshot(&self) -> DictMetricsSnapshot {
        DictMetricsSnapshot {
            intern_calls: self.intern_calls.load(Ordering::Relaxed),
            intern_hits: self.intern_hits.load(Ordering::Relaxed),
            intern_misses: self.intern_misses.load(Ordering::Relaxed),
            lookup_calls: self.lookup_calls.load(Ordering::Relaxed),
            lookup_misses: self.lookup_misses.load(Ordering::Relaxed),
        }
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct Dictionary {
    by_name: FxHashMap<String, u32>,
    names: Vec<String>,
}

impl Dictionary {
    fn with_reserved(name: &str) -> Self {
        let mut dict = Self::default();
        dict.insert(name);
        dict
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    fn insert(&mut self, name: &str) -> u32 {
        let id = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.by_name.insert(name.to_owned(), id);
        id
    }
}

/// Type and property-key dictionaries shared by planners, executors and the
/// engine. Cheap to share behind an [`Arc`].
pub struct TypeStore {
    types: RwLock<Dictionary>,
    props: RwLock<Dictionary>,
    metrics: Arc<DictMetrics>,
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeStore {
    /// Creates a store holding only the default type.
    pub fn new() -> Self {
        Self {
            types: RwLock::new(Dictionary::with_reserved(DEFAULT_TYPE_NAME)),
            props: RwLock::new(Dictionary::default()),
            metrics: Arc::new(DictMetrics::default()),
        }
    }

    /// Counters of the type dictionary.
    pub fn metrics_snapshot(&self) -> DictMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolves a type name without inserting it. `None` is the wildcard and
    /// resolves to `Ok(None)`; an unknown name is an error.
    pub fn type_id(&self, name: Option<&str>) -> Result<Option<TypeId>> {
        let Some(name) = name else {
            return Ok(None);
        };
        DictMetrics::inc(&self.metrics.lookup_calls);
        match self.types.read().lookup(name) {
            Some(id) => Ok(Some(TypeId(id))),
            None => {
                DictMetrics::inc(&self.metrics.lookup_misses);
                trace!(name, "types.lookup.miss");
                Err(FlowError::UnknownType(name.to_owned()))
            }
        }
    }

    /// Resolves a type name, inserting it when unseen. `None` stays the
    /// wildcard.
    pub fn type_id_or_insert(&self, name: Option<&str>) -> Option<TypeId> {
        let name = name?;
        Some(TypeId(Self::intern(&self.types, &self.metrics, name)))
    }

    /// Type to store on a new vertex or edge: the named type, or the default
    /// type when none is given.
    pub fn element_type(&self, name: Option<&str>) -> TypeId {
        self.type_id_or_insert(name).unwrap_or(TypeId::DEFAULT)
    }

    /// Type of an existing edge addressed by name; unknown names are errors.
    pub fn existing_element_type(&self, name: Option<&str>) -> Result<TypeId> {
        Ok(self.type_id(name)?.unwrap_or(TypeId::DEFAULT))
    }

    /// Name interned as `id`.
    pub fn type_name(&self, id: TypeId) -> Option<String> {
        self.types.read().names.get(id.0 as usize).cloned()
    }

    /// Number of known types, the default type included.
    pub fn type_count(&self) -> usize {
        self.types.read().names.len()
    }

    /// Resolves a property key without inserting it.
    pub fn prop_id(&self, key: &str) -> Result<PropId> {
        DictMetrics::inc(&self.metrics.lookup_calls);
        match self.props.read().lookup(key) {
            Some(id) => Ok(PropId(id)),
            None => {
                DictMetrics::inc(&self.metrics.lookup_misses);
                trace!(key, "props.lookup.miss");
                Err(FlowError::UnknownProperty(key.to_owned()))
            }
        }
    }

    /// Id of property `key`, interning it on first use.
    pub fn prop_id_or_insert(&self, key: &str) -> PropId {
        PropId(Self::intern(&self.props, &self.metrics, key))
    }

    /// Name interned as `id`.
    pub fn prop_name(&self, id: PropId) -> Option<String> {
        self.props.read().names.get(id.0 as usize).cloned()
    }

    fn intern(dict: &RwLock<Dictionary>, metrics: &DictMetrics, name: &str) -> u32 {
        DictMetrics::inc(&metrics.intern_calls);
        if let Some(existing) = dict.read().lookup(name) {
            DictMetrics::inc(&metrics.intern_hits);
            trace!(name, id = existing, "dict.intern.hit");
            return existing;
        }
        let mut guard = dict.write();
        // Another writer may have inserted between the two locks.
        if let Some(existing) = guard.lookup(name) {
            DictMetrics::inc(&metrics.intern_hits);
            return existing;
        }
        DictMetrics::inc(&metrics.intern_misses);
        let id = guard.insert(name);
        trace!(name, id, "dict.intern.insert");
        id
    }
}
