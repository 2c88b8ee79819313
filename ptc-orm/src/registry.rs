//! Type Registry (C1): primitive↔column mappings and user-supplied custom
//! type codecs. Structured the way `drivers::registry` keeps its process-wide
//! driver table — a `Lazy<RwLock<HashMap<...>>>` behind a handful of free
//! functions — except keyed by `TypeId` instead of a string driver id.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::Error;
use crate::metadata::CollectionKind;
use crate::value::{ColumnKind, Value};

/// A codec for a non-collection field whose static type matches `target`.
pub struct SingleValueCodec {
    pub target: TypeId,
    pub kind: ColumnKind,
    pub sql_type: String,
    pub sqlite_type: String,
    pub length: Option<u32>,
    pub serialize: Box<dyn Fn(&dyn Any) -> Value + Send + Sync>,
    pub deserialize: Box<dyn Fn(&Value) -> Result<Box<dyn Any>, Error> + Send + Sync>,
}

/// A codec for a `(collection_kind, element_type)` pair that flattens the
/// whole collection into a single column instead of a child table (§4.9,
/// Glossary "Collection custom type").
pub struct CollectionCodec {
    pub collection_kind: CollectionKind,
    pub element: TypeId,
    pub kind: ColumnKind,
    pub sql_type: String,
    pub sqlite_type: String,
    pub serialize: Box<dyn Fn(&dyn Any) -> Value + Send + Sync>,
    pub deserialize: Box<dyn Fn(&Value) -> Result<Box<dyn Any>, Error> + Send + Sync>,
}

/// An enum implementing `index()`/`from_index()` so its variants persist as
/// the declared integer instead of requiring a custom codec registration
/// (§4.1 "Indexed-enum handling is built in").
pub trait IndexedEnum: Sized + 'static {
    fn index(&self) -> i64;
    fn from_index(index: i64) -> Option<Self>;
}

#[derive(Default)]
struct Registry {
    single: HashMap<TypeId, Arc<SingleValueCodec>>,
    collection: HashMap<(CollectionKind, TypeId), Arc<CollectionCodec>>,
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::default()));

/// Registers a single-value codec. Called once at process startup per custom
/// type; re-registering the same `TypeId` overwrites the previous codec.
pub fn register_single(codec: SingleValueCodec) {
    log::info!("registering single-value type codec for {:?}", codec.target);
    let mut reg = REGISTRY.write().expect("type registry poisoned");
    reg.single.insert(codec.target, Arc::new(codec));
}

/// Registers a collection-flattening codec for `(collection_kind, element)`.
pub fn register_collection(codec: CollectionCodec) {
    log::info!(
        "registering collection type codec for ({:?}, {:?})",
        codec.collection_kind,
        codec.element
    );
    let mut reg = REGISTRY.write().expect("type registry poisoned");
    reg.collection
        .insert((codec.collection_kind, codec.element), Arc::new(codec));
}

pub fn lookup_single(target: TypeId) -> Option<Arc<SingleValueCodec>> {
    REGISTRY.read().expect("type registry poisoned").single.get(&target).cloned()
}

pub fn lookup_collection(kind: CollectionKind, element: TypeId) -> Option<Arc<CollectionCodec>> {
    REGISTRY
        .read()
        .expect("type registry poisoned")
        .collection
        .get(&(kind, element))
        .cloned()
}

/// Built-in defaults (§6): bool -> 0/1, String -> VARCHAR(64)/TEXT. These are
/// consulted by the derive macro at compile time (it knows the field's
/// static Rust type), not through this runtime table — they're documented
/// here because §4.1 specifies them as part of the registry's behavior.
pub const DEFAULT_STRING_LENGTH: u32 = 64;

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[test]
    fn register_and_lookup_single_codec() {
        register_single(SingleValueCodec {
            target: TypeId::of::<chrono::NaiveDate>(),
            kind: ColumnKind::Str,
            sql_type: "DATE".into(),
            sqlite_type: "TEXT".into(),
            length: None,
            serialize: Box::new(|v: &dyn Any| {
                let d = v.downcast_ref::<chrono::NaiveDate>().unwrap();
                Value::Str(d.format("%Y-%m-%d").to_string())
            }),
            deserialize: Box::new(|v: &Value| {
                let s = v.as_str().ok_or_else(|| {
                    Error::Codec("date".into(), "expected string".into())
                })?;
                let d = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|e| Error::Codec("date".into(), e.to_string()))?;
                Ok(Box::new(d))
            }),
        });

        let codec = lookup_single(TypeId::of::<chrono::NaiveDate>()).expect("codec registered");
        assert_eq!(codec.sql_type, "DATE");
    }
}
